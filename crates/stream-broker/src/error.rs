use std::error::Error as StdError;

use courier_stream::{ErrorKind, FormatError, HandleError, StreamError};
use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur in a broker-backed stream.
#[derive(Debug, Error)]
pub enum Error {
    /// Cancelled while waiting for a gate slot or the broker.
    #[error("operation cancelled")]
    Cancelled,

    /// Broker commit failed.
    #[error("failed to commit message: {0}")]
    Commit(#[source] BoxError),

    /// Broker client close failed.
    #[error("failed to close broker client: {0}")]
    Close(#[source] BoxError),

    /// The codec could not encode the message.
    #[error(transparent)]
    Encode(BoxError),

    /// The inflight gate was closed while or before waiting for a slot.
    #[error("inflight gate closed")]
    GateClosed,

    /// Broker fetch failed.
    #[error("failed to fetch message: {0}")]
    Fetch(#[source] BoxError),

    /// The fetched payload is malformed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The message carries no usable transport handle.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// Opening a broker reader or writer failed.
    #[error("failed to open broker client: {0}")]
    Open(#[source] BoxError),

    /// Committing a skipped malformed message failed.
    #[error("failed to commit skipped message: {0}")]
    Skip(#[source] BoxError),

    /// Broker write failed.
    #[error("failed to write message: {0}")]
    Write(#[source] BoxError),
}

impl StreamError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Encode(_) => ErrorKind::Encode,
            Self::Format(_) => ErrorKind::Format,
            Self::Handle(_) => ErrorKind::Handle,
            Self::Commit(_)
            | Self::Close(_)
            | Self::Fetch(_)
            | Self::GateClosed
            | Self::Open(_)
            | Self::Skip(_)
            | Self::Write(_) => ErrorKind::Transport,
        }
    }
}
