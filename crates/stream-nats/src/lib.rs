//! NATS JetStream broker client for the broker-backed stream.
//!
//! Each topic maps to a subject of the same name, stored in a JetStream
//! stream created on first use. Each consumer group maps to a durable pull
//! consumer with explicit acknowledgment.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::fmt::{self, Debug};

use async_nats::Client;
use async_nats::jetstream::consumer::pull::{Config as PullConfig, Stream as PullStream};
use async_nats::jetstream::consumer::AckPolicy;
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use bytes::Bytes;
use courier_stream::{Codec, Config};
use courier_stream_broker::{Broker, BrokerReader, BrokerRecord, BrokerStream, BrokerWriter};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A broker-backed stream over NATS JetStream.
pub type NatsStream<C> = BrokerStream<NatsBroker, C>;

/// Connects to the configured endpoints and wraps the connection in a stream.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect_stream<C>(config: Config, codec: C) -> Result<NatsStream<C>, Error>
where
    C: Codec,
{
    let broker = NatsBroker::connect(&config.endpoints).await?;

    Ok(BrokerStream::new(broker, config, codec))
}

/// A JetStream connection able to open readers and writers.
#[derive(Clone, Debug)]
pub struct NatsBroker {
    client: Client,
    jetstream: Context,
}

impl NatsBroker {
    /// Connects to the given servers.
    ///
    /// # Errors
    ///
    /// Returns an error if `endpoints` is empty or the connection fails.
    pub async fn connect(endpoints: &[String]) -> Result<Self, Error> {
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }

        let servers = endpoints.join(",");
        let client = async_nats::connect(servers.as_str())
            .await
            .map_err(|e| Error::Connect(e.kind()))?;

        info!("connected to {}", servers);

        Ok(Self::new(client))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        let jetstream = jetstream::new(client.clone());

        Self { client, jetstream }
    }

    async fn ensure_stream(&self, topic: &str) -> Result<jetstream::stream::Stream, Error> {
        let name = stream_name(topic);

        let stream = self
            .jetstream
            .get_or_create_stream(StreamConfig {
                name: name.clone(),
                subjects: vec![topic.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| Error::StreamCreate(e.kind()))?;

        debug!("using stream {} for {}", name, topic);

        Ok(stream)
    }
}

#[async_trait]
impl Broker for NatsBroker {
    type Error = Error;

    type Reader = NatsReader;

    type Writer = NatsWriter;

    async fn reader(&self, topic: &str, group: &str) -> Result<NatsReader, Error> {
        let stream = self.ensure_stream(topic).await?;
        let durable_name = stream_name(group);

        let consumer = stream
            .get_or_create_consumer(
                &durable_name,
                PullConfig {
                    durable_name: Some(durable_name.clone()),
                    ack_policy: AckPolicy::Explicit,
                    filter_subject: topic.to_string(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::ConsumerCreate(e.kind()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Stream(e.kind()))?;

        info!("pulling {} as {}", topic, durable_name);

        Ok(NatsReader {
            messages: Mutex::new(Some(messages)),
        })
    }

    async fn writer(&self, topic: &str) -> Result<NatsWriter, Error> {
        self.ensure_stream(topic).await?;

        Ok(NatsWriter {
            client: self.client.clone(),
            jetstream: self.jetstream.clone(),
            subject: topic.to_string(),
        })
    }
}

/// A message pulled from JetStream.
#[derive(Debug)]
pub struct NatsRecord(jetstream::Message);

impl NatsRecord {
    /// The underlying JetStream message.
    pub const fn inner(&self) -> &jetstream::Message {
        &self.0
    }
}

impl BrokerRecord for NatsRecord {
    fn payload(&self) -> &[u8] {
        &self.0.payload
    }
}

/// Reads one durable pull consumer.
pub struct NatsReader {
    messages: Mutex<Option<PullStream>>,
}

impl Debug for NatsReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsReader").finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerReader for NatsReader {
    type Error = Error;

    type Record = NatsRecord;

    async fn fetch(&self) -> Result<NatsRecord, Error> {
        let mut messages = self.messages.lock().await;
        let messages = messages.as_mut().ok_or(Error::Closed)?;

        match messages.next().await {
            Some(Ok(message)) => Ok(NatsRecord(message)),
            Some(Err(e)) => Err(Error::Messages(e.kind())),
            None => Err(Error::Closed),
        }
    }

    async fn commit(&self, record: &NatsRecord) -> Result<(), Error> {
        record.0.ack().await.map_err(Error::Ack)
    }

    async fn close(&self) -> Result<(), Error> {
        self.messages.lock().await.take();

        Ok(())
    }
}

/// Publishes to one subject, waiting for JetStream to store each message.
#[derive(Clone, Debug)]
pub struct NatsWriter {
    client: Client,
    jetstream: Context,
    subject: String,
}

#[async_trait]
impl BrokerWriter for NatsWriter {
    type Error = Error;

    async fn write(&self, payload: Bytes) -> Result<(), Error> {
        let ack = self
            .jetstream
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| Error::Publish(e.kind()))?
            .await
            .map_err(|e| Error::Publish(e.kind()))?;

        debug!("stored in {} at {}", ack.stream, ack.sequence);

        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.client
            .flush()
            .await
            .map_err(|e| Error::Flush(e.kind()))
    }
}

/// Maps a topic or group to a valid JetStream stream or consumer name.
fn stream_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_name() {
        assert_eq!(stream_name("orders"), "orders");
        assert_eq!(stream_name("orders.created"), "orders_created");
        assert_eq!(stream_name("a b/c*d>e"), "a_b_c_d_e");
        assert_eq!(stream_name("billing-v2_eu"), "billing-v2_eu");
    }

    #[tokio::test]
    async fn test_connect_requires_endpoints() {
        let result = NatsBroker::connect(&[]).await;

        assert!(matches!(result, Err(Error::NoEndpoints)));
    }
}
