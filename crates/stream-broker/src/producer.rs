use crate::broker::BrokerWriter;
use crate::{Error, until_cancelled};

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use courier_stream::{Codec, Message, Producer, WireConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A producer writing to a broker through the wire codec.
pub struct BrokerProducer<W, C> {
    wire: Arc<WireConfig<C>>,
    writer: Arc<W>,
}

impl<W, C> Clone for BrokerProducer<W, C> {
    fn clone(&self) -> Self {
        Self {
            wire: Arc::clone(&self.wire),
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W, C> Debug for BrokerProducer<W, C>
where
    C: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerProducer")
            .field("wire", &self.wire)
            .finish_non_exhaustive()
    }
}

impl<W, C> BrokerProducer<W, C>
where
    W: BrokerWriter,
    C: Codec,
{
    pub(crate) fn new(writer: W, wire: Arc<WireConfig<C>>) -> Self {
        Self {
            wire,
            writer: Arc::new(writer),
        }
    }
}

#[async_trait]
impl<W, C> Producer for BrokerProducer<W, C>
where
    W: BrokerWriter,
    C: Codec,
{
    type Error = Error;

    async fn publish<H>(&self, cancel: &CancellationToken, message: &Message<H>) -> Result<(), Error>
    where
        H: Send + Sync,
    {
        let payload = self.wire.encode(message).map_err(|e| {
            warn!("[{}] publish - failed to encode message: {}", message.id, e);
            Error::Encode(Box::new(e))
        })?;

        debug!("[{}] publish - {} bytes", message.id, payload.len());

        until_cancelled(cancel, self.writer.write(payload))
            .await?
            .map_err(|e| {
                warn!("[{}] publish - failed: {}", message.id, e);
                Error::Write(Box::new(e))
            })?;

        debug!("[{}] publish - success", message.id);

        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.writer
            .close()
            .await
            .map_err(|e| Error::Close(Box::new(e)))
    }
}
