//! Integration tests for the broker adapter against a scripted broker.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use courier_stream::{
    Codec, Config, Consumer, ErrorKind, HandleError, JsonCodec, Message, Producer, Stream,
    StreamError, WireMode,
};
use courier_stream_broker::{
    Broker, BrokerReader, BrokerRecord, BrokerStream, BrokerWriter, Error,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("broker unavailable")]
struct BrokerDown;

#[derive(Clone, Debug)]
struct Record {
    offset: usize,
    payload: Vec<u8>,
}

impl BrokerRecord for Record {
    fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Default)]
struct BrokerState {
    closed_readers: usize,
    committed: Vec<usize>,
    fail_commits: bool,
    hold_commits: bool,
    next_offset: usize,
    queue: VecDeque<Option<Record>>,
    written: Vec<Bytes>,
}

/// Serves queued payloads in order; `None` entries fail the fetch.
#[derive(Clone, Default)]
struct ScriptedBroker {
    notify: Arc<Notify>,
    state: Arc<Mutex<BrokerState>>,
}

impl ScriptedBroker {
    fn push(&self, payload: Vec<u8>) {
        let mut state = self.state.lock();
        let offset = state.next_offset;
        state.next_offset += 1;
        state.queue.push_back(Some(Record { offset, payload }));
        drop(state);

        self.notify.notify_waiters();
    }

    fn push_fetch_failure(&self) {
        self.state.lock().queue.push_back(None);
        self.notify.notify_waiters();
    }

    fn committed(&self) -> Vec<usize> {
        self.state.lock().committed.clone()
    }

    fn written(&self) -> Vec<Bytes> {
        self.state.lock().written.clone()
    }
}

struct ScriptedReader(ScriptedBroker);

#[async_trait]
impl BrokerReader for ScriptedReader {
    type Error = BrokerDown;

    type Record = Record;

    async fn fetch(&self) -> Result<Record, BrokerDown> {
        loop {
            let notified = self.0.notify.notified();

            if let Some(entry) = self.0.state.lock().queue.pop_front() {
                return entry.ok_or(BrokerDown);
            }

            notified.await;
        }
    }

    async fn commit(&self, record: &Record) -> Result<(), BrokerDown> {
        let hold = self.0.state.lock().hold_commits;
        if hold {
            std::future::pending::<()>().await;
        }

        let mut state = self.0.state.lock();
        if state.fail_commits {
            return Err(BrokerDown);
        }

        state.committed.push(record.offset);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerDown> {
        self.0.state.lock().closed_readers += 1;
        Ok(())
    }
}

struct ScriptedWriter(ScriptedBroker);

#[async_trait]
impl BrokerWriter for ScriptedWriter {
    type Error = BrokerDown;

    async fn write(&self, payload: Bytes) -> Result<(), BrokerDown> {
        self.0.state.lock().written.push(payload);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerDown> {
        Ok(())
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    type Error = BrokerDown;

    type Reader = ScriptedReader;

    type Writer = ScriptedWriter;

    async fn reader(&self, _topic: &str, _group: &str) -> Result<ScriptedReader, BrokerDown> {
        Ok(ScriptedReader(self.clone()))
    }

    async fn writer(&self, _topic: &str) -> Result<ScriptedWriter, BrokerDown> {
        Ok(ScriptedWriter(self.clone()))
    }
}

/// JSON decoding, but every encode fails.
#[derive(Clone, Debug)]
struct BrokenEncoder;

impl Codec for BrokenEncoder {
    type Error = serde_json::Error;

    fn decode<T>(&self, payload: &[u8]) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(payload)
    }

    fn encode<T>(&self, _value: &T) -> Result<Bytes, Self::Error>
    where
        T: serde::Serialize + ?Sized,
    {
        serde_json::from_str::<Value>("{").map(|_| Bytes::new())
    }
}

fn config(max_inflight_messages: usize, forward_unmarshal_errors: bool) -> Config {
    Config {
        endpoints: vec!["127.0.0.1:4222".to_string()],
        topic: "orders".to_string(),
        max_inflight_messages: NonZeroUsize::new(max_inflight_messages).unwrap(),
        wire: WireMode::Enveloped {
            content_type: "application/json".to_string(),
        },
        forward_unmarshal_errors,
    }
}

fn envelope(id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": id,
        "type": "order.created",
        "time": "2020-01-01T00:00:00Z",
        "source": "shop",
        "data": {"total": 42},
    }))
    .unwrap()
}

fn malformed() -> Vec<u8> {
    br#"{"id":"broken"}"#.to_vec()
}

fn stream(
    broker: &ScriptedBroker,
    max_inflight_messages: usize,
    forward_unmarshal_errors: bool,
) -> BrokerStream<ScriptedBroker, JsonCodec> {
    let _ = tracing_subscriber::fmt::try_init();

    BrokerStream::new(
        broker.clone(),
        config(max_inflight_messages, forward_unmarshal_errors),
        JsonCodec,
    )
}

#[tokio::test]
async fn test_read_then_ack_commits() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(envelope("a"));

    let message = consumer.read(&cancel).await.unwrap();
    assert_eq!(message.id, "a");
    assert_eq!(message.kind, "order.created");
    assert_eq!(message.data, json!({"total": 42}));
    assert_eq!(message.handle().unwrap().record().offset, 0);
    assert_eq!(stream.gate().outstanding(), 1);

    consumer.ack(&cancel, message).await.unwrap();
    assert_eq!(broker.committed(), vec![0]);
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_inflight_limit_blocks_until_ack() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 2, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    for id in ["a", "b", "c"] {
        broker.push(envelope(id));
    }

    let reads: Vec<_> = (0..3)
        .map(|_| {
            let consumer = consumer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.read(&cancel).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let (done, blocked): (Vec<_>, Vec<_>) = reads.into_iter().partition(|read| read.is_finished());
    assert_eq!(done.len(), 2);
    assert_eq!(blocked.len(), 1);
    assert_eq!(stream.gate().outstanding(), 2);

    let mut delivered = Vec::new();
    for read in done {
        delivered.push(read.await.unwrap().unwrap());
    }

    let mut ids: Vec<String> = delivered.iter().map(|message| message.id.clone()).collect();
    consumer.ack(&cancel, delivered.remove(0)).await.unwrap();

    let third = timeout(Duration::from_secs(1), blocked.into_iter().next().unwrap())
        .await
        .expect("third read should unblock after ack")
        .unwrap()
        .unwrap();
    ids.push(third.id.clone());
    ids.sort();

    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(stream.gate().outstanding(), 2);
}

#[tokio::test]
async fn test_nack_releases_without_commit() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(envelope("a"));

    let message = consumer.read(&cancel).await.unwrap();
    consumer.nack(&cancel, message).await.unwrap();

    assert!(broker.committed().is_empty());
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_cancel_while_waiting_on_gate() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();

    broker.push(envelope("a"));
    broker.push(envelope("b"));

    let held = consumer.read(&CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    let blocked = {
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.read(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = blocked.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(stream.gate().outstanding(), 1);

    consumer.ack(&CancellationToken::new(), held).await.unwrap();
    assert_eq!(stream.gate().outstanding(), 0);

    // The cancelled read never fetched, so "b" is still next.
    let next = consumer.read(&CancellationToken::new()).await.unwrap();
    assert_eq!(next.id, "b");
}

#[tokio::test]
async fn test_cancel_while_waiting_on_fetch() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();

    let cancel = CancellationToken::new();
    let blocked = {
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.read(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(stream.gate().outstanding(), 1);
    cancel.cancel();

    let error = blocked.await.unwrap().unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_fetch_failure_releases_slot() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push_fetch_failure();
    broker.push(envelope("a"));

    let error = consumer.read(&cancel).await.unwrap_err();
    assert!(matches!(error, Error::Fetch(_)));
    assert_eq!(error.kind(), ErrorKind::Transport);
    assert_eq!(stream.gate().outstanding(), 0);

    let message = consumer.read(&cancel).await.unwrap();
    assert_eq!(message.id, "a");
}

#[tokio::test]
async fn test_skips_malformed_messages() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(malformed());
    broker.push(b"not json".to_vec());
    broker.push(envelope("a"));

    let message = consumer.read(&cancel).await.unwrap();
    assert_eq!(message.id, "a");
    assert_eq!(broker.committed(), vec![0, 1]);
    assert_eq!(stream.gate().outstanding(), 1);
}

#[tokio::test]
async fn test_skip_commit_failure_releases_slot() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();

    broker.push(malformed());
    broker.state.lock().fail_commits = true;

    let error = consumer.read(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, Error::Skip(_)));
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_forwards_malformed_messages() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, true);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(malformed());
    broker.push(envelope("a"));

    let error = consumer.read(&cancel).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Format);
    assert!(error.to_string().contains("not all message headers set"));
    assert!(broker.committed().is_empty());
    assert_eq!(stream.gate().outstanding(), 0);

    let message = consumer.read(&cancel).await.unwrap();
    assert_eq!(message.id, "a");
}

#[tokio::test]
async fn test_ack_from_another_consumer() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 2, false);
    let reader = stream.consumer("billing").await.unwrap();
    let other = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(envelope("a"));

    let message = reader.read(&cancel).await.unwrap();
    let result = other.ack(&cancel, message).await;

    assert!(matches!(result, Err(Error::Handle(HandleError::Foreign))));
    assert!(broker.committed().is_empty());
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_ack_without_handle() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(envelope("a"));

    let mut message = consumer.read(&cancel).await.unwrap();
    drop(message.take_handle());

    let result = consumer.ack(&cancel, message).await;
    assert!(matches!(result, Err(Error::Handle(HandleError::Missing))));
    assert!(broker.committed().is_empty());
    assert_eq!(stream.gate().outstanding(), 0);

    broker.push(envelope("b"));

    let mut message = consumer.read(&cancel).await.unwrap();
    drop(message.take_handle());

    let result = consumer.nack(&cancel, message).await;
    assert!(matches!(result, Err(Error::Handle(HandleError::Missing))));
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_ack_releases_slot_when_commit_fails() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(envelope("a"));
    let message = consumer.read(&cancel).await.unwrap();

    broker.state.lock().fail_commits = true;

    let error = consumer.ack(&cancel, message).await.unwrap_err();
    assert!(matches!(error, Error::Commit(_)));
    assert_eq!(error.kind(), ErrorKind::Transport);
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_publish_writes_envelope() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let producer = stream.producer("billing").await.unwrap();

    let message = Message::new(
        "a",
        "order.created",
        "shop",
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        json!({"total": 42}),
    );
    producer
        .publish(&CancellationToken::new(), &message)
        .await
        .unwrap();

    let written = broker.written();
    assert_eq!(written.len(), 1);

    let value: Value = serde_json::from_slice(&written[0]).unwrap();
    assert_eq!(value["id"], "a");
    assert_eq!(value["contenttype"], "application/json");
    assert_eq!(value["data"], json!({"total": 42}));
}

#[tokio::test]
async fn test_publish_forwards_read_messages() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();
    let producer = stream.producer("billing").await.unwrap();
    let cancel = CancellationToken::new();

    broker.push(envelope("a"));

    let message = consumer.read(&cancel).await.unwrap();
    producer.publish(&cancel, &message).await.unwrap();
    consumer.ack(&cancel, message).await.unwrap();

    assert_eq!(broker.written().len(), 1);
}

#[tokio::test]
async fn test_publish_encode_failure_skips_write() {
    let broker = ScriptedBroker::default();
    let stream = BrokerStream::new(broker.clone(), config(1, false), BrokenEncoder);
    let producer = stream.producer("billing").await.unwrap();

    let message = Message::new(
        "a",
        "order.created",
        "shop",
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        Value::Null,
    );
    let error = producer
        .publish(&CancellationToken::new(), &message)
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Encode);
    assert!(broker.written().is_empty());
}

#[tokio::test]
async fn test_close_closes_reader() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();

    consumer.close().await.unwrap();
    assert_eq!(broker.state.lock().closed_readers, 1);
}

#[tokio::test]
async fn test_cancelled_ack_releases_slot() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();

    broker.push(envelope("a"));
    let message = consumer.read(&CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = consumer.ack(&cancel, message).await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(broker.committed().is_empty());
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_cancelled_skip_releases_slot() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let consumer = stream.consumer("billing").await.unwrap();

    broker.push(malformed());
    broker.state.lock().hold_commits = true;

    let cancel = CancellationToken::new();
    let reader = {
        let consumer = consumer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.read(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!reader.is_finished());
    assert_eq!(stream.gate().outstanding(), 1);
    cancel.cancel();

    let result = reader.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(broker.committed().is_empty());
    assert_eq!(stream.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_cancelled_publish_skips_write() {
    let broker = ScriptedBroker::default();
    let stream = stream(&broker, 1, false);
    let producer = stream.producer("billing").await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let message = Message::new(
        "a",
        "order.created",
        "shop",
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        Value::Null,
    );
    let error = producer.publish(&cancel, &message).await.unwrap_err();

    assert!(error.is_cancelled());
    assert!(broker.written().is_empty());
}
