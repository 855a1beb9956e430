use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// A raw message fetched from a broker.
pub trait BrokerRecord: Debug + Send + Sync + 'static {
    /// The raw wire payload.
    fn payload(&self) -> &[u8];
}

/// Read side of a broker client, bound to one topic and consumer group.
///
/// `fetch` may be dropped mid-flight when the caller is cancelled, so it
/// must not lose a message when its future is dropped before completion.
#[async_trait]
pub trait BrokerReader: Send + Sync + 'static {
    /// The error type for the reader.
    type Error: Error + Send + Sync + 'static;

    /// The raw message type.
    type Record: BrokerRecord;

    /// Fetches the next message, waiting until one is available.
    async fn fetch(&self) -> Result<Self::Record, Self::Error>;

    /// Marks the message processed so it is not delivered to the group again.
    async fn commit(&self, record: &Self::Record) -> Result<(), Self::Error>;

    /// Closes the reader.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// Write side of a broker client, bound to one topic.
#[async_trait]
pub trait BrokerWriter: Send + Sync + 'static {
    /// The error type for the writer.
    type Error: Error + Send + Sync + 'static;

    /// Writes a payload to the topic.
    async fn write(&self, payload: Bytes) -> Result<(), Self::Error>;

    /// Closes the writer.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// A broker client able to open readers and writers.
///
/// # Associated Types
/// - `Error`: The error type for opening readers and writers.
/// - `Reader`: The read side, one per topic and group.
/// - `Writer`: The write side, one per topic.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// The error type for the broker.
    type Error: Error + Send + Sync + 'static;

    /// The reader type.
    type Reader: BrokerReader;

    /// The writer type.
    type Writer: BrokerWriter;

    /// Opens a reader on `topic` for the consumer group `group`.
    async fn reader(&self, topic: &str, group: &str) -> Result<Self::Reader, Self::Error>;

    /// Opens a writer on `topic`.
    async fn writer(&self, topic: &str) -> Result<Self::Writer, Self::Error>;
}
