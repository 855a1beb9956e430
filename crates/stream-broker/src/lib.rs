//! Broker-backed implementation of the stream contract.
//!
//! The adapter wraps an injected broker client and adds:
//! - Decoding and encoding through the configured wire codec
//! - A gate bounding how many read messages may be unacknowledged at once
//! - Commit-on-ack semantics
//! - Skipping or surfacing malformed messages
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Broker client seam: the black box the adapter drives.
pub mod broker;

mod consumer;
mod error;

/// Inflight concurrency gate.
pub mod gate;

mod producer;
mod stream;

pub use broker::{Broker, BrokerReader, BrokerRecord, BrokerWriter};
pub use consumer::{BrokerConsumer, BrokerHandle};
pub use error::Error;
pub use gate::{Gate, Slot};
pub use producer::BrokerProducer;
pub use stream::BrokerStream;

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Runs `future` unless `cancel` fires first.
async fn until_cancelled<F>(cancel: &CancellationToken, future: F) -> Result<F::Output, Error>
where
    F: Future + Send,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        output = future => Ok(output),
    }
}
