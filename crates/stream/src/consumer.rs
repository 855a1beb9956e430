use crate::error::StreamError;
use crate::message::Message;

use std::fmt::Debug;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A trait representing read access to a message stream.
///
/// Every message returned by `read` must be handed back exactly once, to
/// either `ack` or `nack`. Both take the message by value, so it cannot be
/// used again afterwards.
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    /// The error type for the consumer.
    type Error: StreamError;

    /// Transport handle attached to every message this consumer reads.
    type Handle: Debug + Send + Sync + 'static;

    /// Reads the next message, waiting until one is available or `cancel`
    /// fires. Any error means no message was delivered.
    async fn read(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Message<Self::Handle>, Self::Error>;

    /// Acknowledges a message, marking it processed at the broker.
    async fn ack(
        &self,
        cancel: &CancellationToken,
        message: Message<Self::Handle>,
    ) -> Result<(), Self::Error>;

    /// Negatively acknowledges a message. Redelivery depends on the broker.
    async fn nack(
        &self,
        cancel: &CancellationToken,
        message: Message<Self::Handle>,
    ) -> Result<(), Self::Error>;

    /// Closes the underlying broker handle.
    async fn close(&self) -> Result<(), Self::Error>;
}
