use crate::{Error, MemoryStream};

use std::sync::Arc;

use async_trait::async_trait;
use courier_stream::{Consumer, Message};
use futures::Stream as FuturesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Transport handle attached to messages read from a `MemoryStream`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryHandle {
    pub(crate) stream: Uuid,
    pub(crate) index: usize,
}

impl MemoryHandle {
    /// The stream the message was read from.
    pub const fn stream(&self) -> Uuid {
        self.stream
    }

    /// Position of the message in the stream's log.
    pub const fn index(&self) -> usize {
        self.index
    }
}

/// A consumer reading a `MemoryStream` with its own cursor.
///
/// Clones share the cursor. `close` drops it, so reading after `close`
/// starts over from the beginning of the log.
#[derive(Clone, Debug)]
pub struct MemoryConsumer {
    id: Uuid,
    stream: MemoryStream,
}

impl MemoryConsumer {
    pub(crate) fn new(stream: MemoryStream) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
        }
    }

    /// Unique id of this consumer.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The remaining messages as a lazy sequence.
    ///
    /// The sequence ends at the first error from `read`: exhaustion, or
    /// cancellation when blocking. It shares this consumer's cursor, so it
    /// cannot be restarted.
    pub fn messages(
        &self,
        cancel: CancellationToken,
    ) -> impl FuturesStream<Item = Message<MemoryHandle>> + Send + 'static {
        futures::stream::unfold(
            (self.clone(), cancel),
            |(consumer, cancel)| async move {
                match consumer.read(&cancel).await {
                    Ok(message) => Some((message, (consumer, cancel))),
                    Err(e) => {
                        debug!("[{}] messages - end: {}", consumer.id, e);
                        None
                    }
                }
            },
        )
    }

    fn record(&self, message: Message<MemoryHandle>, acked: bool) {
        let (message, handle) = message.into_parts();

        match handle {
            Some(handle) if handle.stream != self.stream.id() => warn!(
                "[{}] message {} belongs to stream {}",
                self.id, message.id, handle.stream
            ),
            None => warn!("[{}] message {} carries no handle", self.id, message.id),
            Some(_) => {}
        }

        self.stream.record(message, acked);
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    type Error = Error;

    type Handle = MemoryHandle;

    async fn read(&self, cancel: &CancellationToken) -> Result<Message<MemoryHandle>, Error> {
        loop {
            let notify = Arc::clone(self.stream.notify());
            let published = notify.notified();

            if let Some(message) = self.stream.next_for(self.id) {
                debug!("[{}] read - message {}", self.id, message.id);
                return Ok(message);
            }

            if !self.stream.options().block_when_exhausted {
                return Err(Error::Exhausted);
            }

            debug!("[{}] read - waiting for publish", self.id);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = published => {}
            }
        }
    }

    async fn ack(
        &self,
        _cancel: &CancellationToken,
        message: Message<MemoryHandle>,
    ) -> Result<(), Error> {
        debug!("[{}] ack - message {}", self.id, message.id);
        self.record(message, true);

        Ok(())
    }

    async fn nack(
        &self,
        _cancel: &CancellationToken,
        message: Message<MemoryHandle>,
    ) -> Result<(), Error> {
        debug!("[{}] nack - message {}", self.id, message.id);
        self.record(message, false);

        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        debug!("[{}] close", self.id);
        self.stream.forget(self.id);

        Ok(())
    }
}
