use crate::Error;
use crate::broker::Broker;
use crate::consumer::BrokerConsumer;
use crate::gate::Gate;
use crate::producer::BrokerProducer;

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use courier_stream::{Codec, Config, Stream, WireConfig};
use tracing::info;

/// A stream backed by a real broker.
///
/// All consumers opened from one stream share a single gate, so
/// `max_inflight_messages` bounds the unacknowledged messages across all of
/// them. `Config::endpoints` is not read here; it is for whoever connects
/// the broker client.
pub struct BrokerStream<B, C> {
    broker: Arc<B>,
    forward_unmarshal_errors: bool,
    gate: Gate,
    topic: String,
    wire: Arc<WireConfig<C>>,
}

impl<B, C> Clone for BrokerStream<B, C> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            forward_unmarshal_errors: self.forward_unmarshal_errors,
            gate: self.gate.clone(),
            topic: self.topic.clone(),
            wire: Arc::clone(&self.wire),
        }
    }
}

impl<B, C> Debug for BrokerStream<B, C>
where
    C: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerStream")
            .field("topic", &self.topic)
            .field("forward_unmarshal_errors", &self.forward_unmarshal_errors)
            .field("gate", &self.gate)
            .field("wire", &self.wire)
            .finish_non_exhaustive()
    }
}

impl<B, C> BrokerStream<B, C>
where
    B: Broker,
    C: Codec,
{
    /// Creates a new stream over `broker`, encoding with `codec`.
    pub fn new(broker: B, config: Config, codec: C) -> Self {
        Self {
            broker: Arc::new(broker),
            forward_unmarshal_errors: config.forward_unmarshal_errors,
            gate: Gate::new(config.max_inflight_messages),
            topic: config.topic,
            wire: Arc::new(WireConfig::new(codec, config.wire)),
        }
    }

    /// The gate shared by every consumer of this stream.
    pub const fn gate(&self) -> &Gate {
        &self.gate
    }

    /// The topic this stream reads and writes.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl<B, C> Stream for BrokerStream<B, C>
where
    B: Broker,
    C: Codec,
{
    type Error = Error;

    type Consumer = BrokerConsumer<B::Reader, C>;

    type Producer = BrokerProducer<B::Writer, C>;

    async fn consumer<G>(&self, group: G) -> Result<Self::Consumer, Error>
    where
        G: Into<String> + Send,
    {
        let group = group.into();

        let reader = self
            .broker
            .reader(&self.topic, &group)
            .await
            .map_err(|e| Error::Open(Box::new(e)))?;

        let consumer = BrokerConsumer::new(
            reader,
            self.gate.clone(),
            Arc::clone(&self.wire),
            self.forward_unmarshal_errors,
        );

        info!(
            "opened consumer {} on {} for group {}",
            consumer.id(),
            self.topic,
            group
        );

        Ok(consumer)
    }

    async fn producer<G>(&self, group: G) -> Result<Self::Producer, Error>
    where
        G: Into<String> + Send,
    {
        let group = group.into();

        let writer = self
            .broker
            .writer(&self.topic)
            .await
            .map_err(|e| Error::Open(Box::new(e)))?;

        info!("opened producer on {} for group {}", self.topic, group);

        Ok(BrokerProducer::new(writer, Arc::clone(&self.wire)))
    }
}
