use thiserror::Error;

/// Errors that can occur talking to NATS JetStream.
#[derive(Debug, Error)]
pub enum Error {
    /// Acknowledgment failed.
    #[error("failed to acknowledge message: {0}")]
    Ack(#[source] async_nats::Error),

    /// The reader was closed.
    #[error("reader closed")]
    Closed,

    /// Connecting to the servers failed.
    #[error("failed to connect: {0}")]
    Connect(async_nats::ConnectErrorKind),

    /// Consumer create error.
    #[error("failed to create consumer: {0}")]
    ConsumerCreate(async_nats::jetstream::stream::ConsumerErrorKind),

    /// Flushing the client failed.
    #[error("failed to flush: {0}")]
    Flush(async_nats::client::FlushErrorKind),

    /// Consumer messages error.
    #[error("failed to get consumer messages: {0}")]
    Messages(async_nats::jetstream::consumer::pull::MessagesErrorKind),

    /// No servers were configured.
    #[error("no endpoints configured")]
    NoEndpoints,

    /// Publish error.
    #[error("failed to publish: {0}")]
    Publish(async_nats::jetstream::context::PublishErrorKind),

    /// Consumer stream error.
    #[error("consumer stream error: {0}")]
    Stream(async_nats::jetstream::consumer::StreamErrorKind),

    /// Stream create error.
    #[error("failed to create stream: {0}")]
    StreamCreate(async_nats::jetstream::context::CreateStreamErrorKind),
}
