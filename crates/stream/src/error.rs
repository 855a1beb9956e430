use std::error::Error;
use std::fmt::Debug;

use thiserror::Error;

/// Broad classification shared by every stream implementation's errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A payload could not be decoded into a message.
    Format,

    /// The broker failed to fetch, commit or write.
    Transport,

    /// A cancellation signal fired while waiting.
    Cancelled,

    /// `ack`/`nack` was called with an unusable transport handle.
    Handle,

    /// The codec failed to encode an outgoing message.
    Encode,

    /// A finite stream has no more messages.
    Exhausted,
}

/// Marker trait for stream errors, able to report their kind.
pub trait StreamError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;

    /// Whether the error was caused by cancellation. Cancelled operations are
    /// always safe to retry.
    fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

/// A payload did not match the expected message format.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The codec could not decode the payload.
    #[error("message is formatted incorrectly: {0}")]
    Decode(#[source] Box<dyn Error + Send + Sync>),

    /// Header fields could not be extracted from a raw payload.
    #[error("message is formatted incorrectly: {}", join(.0))]
    Fields(Vec<FieldError>),

    /// The decoded message lacks one of id, type, source or time.
    #[error("message is formatted incorrectly: not all message headers set")]
    MissingHeaders,
}

impl FormatError {
    /// Returns every field failure when this is a `Fields` error.
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::Fields(fields) => fields,
            _ => &[],
        }
    }
}

/// A single header extraction failure in raw mode.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// The id field is missing or not a string.
    #[error("failed to get ID from field `{0}`")]
    Id(String),

    /// The time field is missing or not a string.
    #[error("failed to get Time from field `{0}`")]
    Time(String),

    /// The time field is not an RFC 3339 timestamp.
    #[error("failed to parse Time from field `{field}`: {source}")]
    TimeFormat {
        /// The configured time field.
        field: String,

        /// The parse failure.
        #[source]
        source: chrono::ParseError,
    },
}

/// A message handed to `ack`/`nack` carries no usable transport handle.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    /// The message has no transport handle attached.
    #[error("transport handle invalid: message carries no handle")]
    Missing,

    /// The handle was issued by a different consumer.
    #[error("transport handle invalid: message was read by another consumer")]
    Foreign,
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
