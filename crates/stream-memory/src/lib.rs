//! In-memory implementation of the stream contract, for tests and local
//! development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod consumer;
mod error;
mod producer;

pub use consumer::{MemoryConsumer, MemoryHandle};
pub use error::Error;
pub use producer::MemoryProducer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_stream::{Message, Stream};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

/// Options for the in-memory stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryStreamOptions {
    /// Wait for a publish instead of returning `Error::Exhausted` once a
    /// consumer has read every message.
    pub block_when_exhausted: bool,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) acks: Vec<Message>,
    pub(crate) cursors: HashMap<Uuid, usize>,
    pub(crate) messages: Vec<Message>,
    pub(crate) nacks: Vec<Message>,
}

/// An in-memory stream over an ordered message log.
///
/// Every consumer reads the whole log from the start with its own cursor,
/// kept until the consumer is closed.
/// Acknowledged and rejected messages are recorded for inspection.
#[derive(Clone, Debug)]
pub struct MemoryStream {
    id: Uuid,
    notify: Arc<Notify>,
    options: MemoryStreamOptions,
    state: Arc<Mutex<State>>,
}

impl MemoryStream {
    /// Creates an empty stream.
    #[must_use]
    pub fn new(options: MemoryStreamOptions) -> Self {
        Self::with_messages(Vec::new(), options)
    }

    /// Creates a stream seeded with `messages`.
    #[must_use]
    pub fn with_messages(messages: Vec<Message>, options: MemoryStreamOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            notify: Arc::new(Notify::new()),
            options,
            state: Arc::new(Mutex::new(State {
                messages,
                ..State::default()
            })),
        }
    }

    /// Unique id of this stream, stamped on every handle it issues.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the message log.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    /// Snapshot of the acknowledged messages, in ack order.
    #[must_use]
    pub fn acks(&self) -> Vec<Message> {
        self.state.lock().acks.clone()
    }

    /// Snapshot of the rejected messages, in nack order.
    #[must_use]
    pub fn nacks(&self) -> Vec<Message> {
        self.state.lock().nacks.clone()
    }

    pub(crate) fn next_for(&self, consumer: Uuid) -> Option<Message<MemoryHandle>> {
        let mut state = self.state.lock();
        let State {
            cursors, messages, ..
        } = &mut *state;

        let cursor = cursors.entry(consumer).or_default();
        let message = messages.get(*cursor)?;
        let index = *cursor;
        *cursor += 1;

        Some(message.clone().with_trace(index).with_handle(MemoryHandle {
            stream: self.id,
            index,
        }))
    }

    pub(crate) fn forget(&self, consumer: Uuid) {
        self.state.lock().cursors.remove(&consumer);
    }

    pub(crate) fn append(&self, message: Message) -> usize {
        let mut state = self.state.lock();
        state.messages.push(message);
        let index = state.messages.len() - 1;
        drop(state);

        self.notify.notify_waiters();
        index
    }

    pub(crate) const fn notify(&self) -> &Arc<Notify> {
        &self.notify
    }

    pub(crate) const fn options(&self) -> MemoryStreamOptions {
        self.options
    }

    pub(crate) fn record(&self, message: Message, acked: bool) {
        let mut state = self.state.lock();
        if acked {
            state.acks.push(message);
        } else {
            state.nacks.push(message);
        }
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new(MemoryStreamOptions::default())
    }
}

#[async_trait]
impl Stream for MemoryStream {
    type Error = Error;

    type Consumer = MemoryConsumer;

    type Producer = MemoryProducer;

    async fn consumer<G>(&self, group: G) -> Result<MemoryConsumer, Error>
    where
        G: Into<String> + Send,
    {
        let consumer = MemoryConsumer::new(self.clone());
        debug!("opened consumer {} for group {}", consumer.id(), group.into());

        Ok(consumer)
    }

    async fn producer<G>(&self, group: G) -> Result<MemoryProducer, Error>
    where
        G: Into<String> + Send,
    {
        debug!("opened producer for group {}", group.into());

        Ok(MemoryProducer::new(self.clone()))
    }
}
