use crate::{Error, MemoryStream};

use async_trait::async_trait;
use courier_stream::{Message, Producer};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A producer appending to a `MemoryStream`'s log.
#[derive(Clone, Debug)]
pub struct MemoryProducer {
    stream: MemoryStream,
}

impl MemoryProducer {
    pub(crate) const fn new(stream: MemoryStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Producer for MemoryProducer {
    type Error = Error;

    async fn publish<H>(&self, _cancel: &CancellationToken, message: &Message<H>) -> Result<(), Error>
    where
        H: Send + Sync,
    {
        let index = self.stream.append(message.detached());
        debug!("[{}] publish - appended at {}", message.id, index);

        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
