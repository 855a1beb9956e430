use crate::error::StreamError;
use crate::message::Message;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A trait representing publish access to a message stream.
#[async_trait]
pub trait Producer: Send + Sync + 'static {
    /// The error type for the producer.
    type Error: StreamError;

    /// Publishes the given message with no expectation of a response.
    ///
    /// Any transport handle carried by `message` is ignored, so messages read
    /// from a consumer can be forwarded as they are.
    async fn publish<H>(
        &self,
        cancel: &CancellationToken,
        message: &Message<H>,
    ) -> Result<(), Self::Error>
    where
        H: Send + Sync;

    /// Closes the underlying broker handle.
    async fn close(&self) -> Result<(), Self::Error>;
}
