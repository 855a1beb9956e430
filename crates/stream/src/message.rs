use chrono::{DateTime, Utc};
use serde_json::Value;

/// Seconds from the Unix epoch back to `0001-01-01T00:00:00Z`, the zero time
/// written by producers that never set one.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// Canonical message envelope.
///
/// `H` is the transport handle attached by the consumer that read the
/// message. Messages built by application code carry no handle.
#[derive(Clone, Debug, PartialEq)]
pub struct Message<H = ()> {
    /// Unique id of the logical event.
    pub id: String,

    /// Event kind (`type` on the wire).
    pub kind: String,

    /// When the event occurred.
    pub time: DateTime<Utc>,

    /// Identity of the producer.
    pub source: String,

    /// Arbitrary structured payload.
    pub data: Value,

    /// Content type, stamped on encode in enveloped mode.
    pub content_type: String,

    /// Observational trace index. Not interpreted by the stream contract.
    pub trace: Option<usize>,

    handle: Option<H>,
}

impl Message {
    /// Creates a message without a transport handle.
    pub fn new<I, K, S>(id: I, kind: K, source: S, time: DateTime<Utc>, data: Value) -> Self
    where
        I: Into<String>,
        K: Into<String>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            kind: kind.into(),
            time,
            source: source.into(),
            data,
            content_type: String::new(),
            trace: None,
            handle: None,
        }
    }
}

impl<H> Message<H> {
    /// Returns the transport handle, if any.
    pub const fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    /// Removes and returns the transport handle.
    pub fn take_handle(&mut self) -> Option<H> {
        self.handle.take()
    }

    /// Replaces the transport handle, changing the handle type.
    pub fn with_handle<T>(self, handle: T) -> Message<T> {
        self.rehandle(Some(handle))
    }

    /// Sets the trace index.
    #[must_use]
    pub fn with_trace(mut self, trace: usize) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Splits the message into its handle-free envelope and its handle.
    pub fn into_parts(mut self) -> (Message, Option<H>) {
        let handle = self.handle.take();
        (self.rehandle(None), handle)
    }

    /// Returns a copy of the envelope without the transport handle.
    #[must_use]
    pub fn detached(&self) -> Message {
        Message {
            id: self.id.clone(),
            kind: self.kind.clone(),
            time: self.time,
            source: self.source.clone(),
            data: self.data.clone(),
            content_type: self.content_type.clone(),
            trace: self.trace,
            handle: None,
        }
    }

    /// Whether id, kind, source and time are all set.
    pub fn headers_set(&self) -> bool {
        !self.id.is_empty()
            && !self.kind.is_empty()
            && !self.source.is_empty()
            && !is_zero_time(&self.time)
    }

    fn rehandle<T>(self, handle: Option<T>) -> Message<T> {
        Message {
            id: self.id,
            kind: self.kind,
            time: self.time,
            source: self.source,
            data: self.data,
            content_type: self.content_type,
            trace: self.trace,
            handle,
        }
    }
}

pub(crate) fn is_zero_time(time: &DateTime<Utc>) -> bool {
    time.timestamp() == ZERO_TIME_SECS && time.timestamp_subsec_nanos() == 0
}
