use crate::broker::{BrokerReader, BrokerRecord};
use crate::gate::{Gate, Slot};
use crate::{Error, until_cancelled};

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use courier_stream::{Codec, Consumer, HandleError, Message, WireConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Transport handle attached to messages read from a broker.
///
/// Holds the raw broker record needed to commit, plus the gate slot the
/// message occupies. Dropping the handle returns the slot.
#[derive(Debug)]
pub struct BrokerHandle<R> {
    consumer: Uuid,
    record: R,
    slot: Slot,
}

impl<R> BrokerHandle<R> {
    /// The consumer that read the message.
    pub const fn consumer(&self) -> Uuid {
        self.consumer
    }

    /// The raw broker record.
    pub const fn record(&self) -> &R {
        &self.record
    }
}

/// A consumer reading from a broker through the wire codec.
pub struct BrokerConsumer<R, C> {
    forward_unmarshal_errors: bool,
    gate: Gate,
    id: Uuid,
    reader: Arc<R>,
    wire: Arc<WireConfig<C>>,
}

impl<R, C> Clone for BrokerConsumer<R, C> {
    fn clone(&self) -> Self {
        Self {
            forward_unmarshal_errors: self.forward_unmarshal_errors,
            gate: self.gate.clone(),
            id: self.id,
            reader: Arc::clone(&self.reader),
            wire: Arc::clone(&self.wire),
        }
    }
}

impl<R, C> Debug for BrokerConsumer<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConsumer")
            .field("id", &self.id)
            .field("forward_unmarshal_errors", &self.forward_unmarshal_errors)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl<R, C> BrokerConsumer<R, C>
where
    R: BrokerReader,
    C: Codec,
{
    pub(crate) fn new(
        reader: R,
        gate: Gate,
        wire: Arc<WireConfig<C>>,
        forward_unmarshal_errors: bool,
    ) -> Self {
        Self {
            forward_unmarshal_errors,
            gate,
            id: Uuid::new_v4(),
            reader: Arc::new(reader),
            wire,
        }
    }

    /// Unique id of this consumer, stamped on every handle it issues.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The gate shared with every consumer of the same stream.
    pub const fn gate(&self) -> &Gate {
        &self.gate
    }

    fn take_handle(
        &self,
        message: &mut Message<BrokerHandle<R::Record>>,
    ) -> Result<BrokerHandle<R::Record>, Error> {
        let Some(handle) = message.take_handle() else {
            warn!("[{}] message {} carries no transport handle", self.id, message.id);
            return Err(HandleError::Missing.into());
        };

        if handle.consumer != self.id {
            warn!(
                "[{}] message {} was read by consumer {}",
                self.id, message.id, handle.consumer
            );
            // Dropping the foreign handle returns its slot to the gate it came from.
            return Err(HandleError::Foreign.into());
        }

        Ok(handle)
    }
}

#[async_trait]
impl<R, C> Consumer for BrokerConsumer<R, C>
where
    R: BrokerReader,
    C: Codec,
{
    type Error = Error;

    type Handle = BrokerHandle<R::Record>;

    async fn read(&self, cancel: &CancellationToken) -> Result<Message<Self::Handle>, Error> {
        debug!("[{}] read - acquire slot", self.id);
        let slot = self.gate.acquire(cancel).await?;
        debug!(
            "[{}] read - slot acquired ({}/{} outstanding)",
            self.id,
            self.gate.outstanding(),
            self.gate.capacity()
        );

        // Every early return below drops `slot`, handing it back to the gate.
        loop {
            let record = until_cancelled(cancel, self.reader.fetch())
                .await?
                .map_err(|e| {
                    warn!("[{}] read - fetch failed: {}", self.id, e);
                    Error::Fetch(Box::new(e))
                })?;

            match self.wire.decode(record.payload()) {
                Ok(message) => {
                    debug!("[{}] read - forward message {}", self.id, message.id);

                    return Ok(message.with_handle(BrokerHandle {
                        consumer: self.id,
                        record,
                        slot,
                    }));
                }
                Err(e) if self.forward_unmarshal_errors => {
                    warn!("[{}] read - malformed message: {}", self.id, e);
                    return Err(Error::Format(e));
                }
                Err(e) => {
                    warn!("[{}] read - skipping malformed message: {}", self.id, e);

                    until_cancelled(cancel, self.reader.commit(&record))
                        .await?
                        .map_err(|e| {
                            error!("[{}] read - skipping failed: {}", self.id, e);
                            Error::Skip(Box::new(e))
                        })?;
                }
            }
        }
    }

    async fn ack(
        &self,
        cancel: &CancellationToken,
        mut message: Message<Self::Handle>,
    ) -> Result<(), Error> {
        let BrokerHandle { record, slot, .. } = self.take_handle(&mut message)?;

        let result = match until_cancelled(cancel, self.reader.commit(&record)).await {
            Ok(committed) => committed.map_err(|e| Error::Commit(Box::new(e))),
            Err(cancelled) => Err(cancelled),
        };

        // The message's lifecycle ends here whatever the commit outcome.
        self.gate.release(slot);

        match &result {
            Ok(()) => debug!("[{}] ack - message {} committed", self.id, message.id),
            Err(e) => warn!("[{}] ack - message {} failed: {}", self.id, message.id, e),
        }

        result
    }

    async fn nack(
        &self,
        _cancel: &CancellationToken,
        mut message: Message<Self::Handle>,
    ) -> Result<(), Error> {
        let BrokerHandle { slot, .. } = self.take_handle(&mut message)?;
        self.gate.release(slot);

        debug!("[{}] nack - message {} released", self.id, message.id);

        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        debug!("[{}] close", self.id);

        self.reader
            .close()
            .await
            .map_err(|e| Error::Close(Box::new(e)))
    }
}
