use courier_stream::{ErrorKind, StreamError};
use thiserror::Error;

/// Errors that can occur in the in-memory stream.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Cancelled while waiting for a publish.
    #[error("operation cancelled")]
    Cancelled,

    /// Every message in the log has been read by this consumer.
    #[error("no more messages")]
    Exhausted,
}

impl StreamError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Exhausted => ErrorKind::Exhausted,
        }
    }
}
