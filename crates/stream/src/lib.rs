//! Abstract interface for reading, acknowledging and publishing messages
//! without depending on a specific broker's client API.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Pluggable serialization strategies used by the wire codec.
pub mod codec;

/// Construction-time configuration for broker-backed streams.
pub mod config;

/// Consumers read and acknowledge messages.
pub mod consumer;

mod error;

/// The canonical message envelope.
pub mod message;

/// Producers publish messages.
pub mod producer;

/// Conversion between wire payloads and the message envelope.
pub mod wire;

pub use codec::{CborCodec, Codec, JsonCodec};
pub use config::Config;
pub use consumer::Consumer;
pub use error::{ErrorKind, FieldError, FormatError, HandleError, StreamError};
pub use message::Message;
pub use producer::Producer;
pub use wire::{RawHeaders, WireConfig, WireMode};

use async_trait::async_trait;

/// A trait representing a message stream that hands out consumers and
/// producers bound to a consumer group.
///
/// # Associated Types
/// - `Error`: The error type for opening consumers and producers.
/// - `Consumer`: The consumer type handed out by this stream.
/// - `Producer`: The producer type handed out by this stream.
///
/// # Required Methods
/// - `async fn consumer(&self, group) -> Result<Self::Consumer, Self::Error>`: Opens a consumer for the group.
/// - `async fn producer(&self, group) -> Result<Self::Producer, Self::Error>`: Opens a producer for the group.
#[async_trait]
pub trait Stream: Clone + Send + Sync + 'static {
    /// The error type for the stream.
    type Error: StreamError;

    /// The consumer type for the stream.
    type Consumer: Consumer;

    /// The producer type for the stream.
    type Producer: Producer;

    /// Opens a consumer reading the stream on behalf of `group`.
    async fn consumer<G>(&self, group: G) -> Result<Self::Consumer, Self::Error>
    where
        G: Into<String> + Send;

    /// Opens a producer publishing to the stream on behalf of `group`.
    async fn producer<G>(&self, group: G) -> Result<Self::Producer, Self::Error>
    where
        G: Into<String> + Send;
}
