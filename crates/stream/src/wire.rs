use crate::codec::Codec;
use crate::error::{FieldError, FormatError};
use crate::message::Message;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How messages are laid out on the wire.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WireMode {
    /// Payloads are complete envelopes and round-trip unchanged.
    Enveloped {
        /// Content type stamped on every encoded message.
        #[serde(default)]
        content_type: String,
    },

    /// Payloads are domain data only; headers are extracted from payload
    /// fields or taken from static defaults.
    Raw(RawHeaders),
}

impl Default for WireMode {
    fn default() -> Self {
        Self::Enveloped {
            content_type: "application/json".to_string(),
        }
    }
}

/// Header mapping for raw payloads.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawHeaders {
    /// Payload key holding the message id.
    pub id_field: String,

    /// Payload key holding the RFC 3339 event time.
    pub time_field: String,

    /// Static message type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Static message source.
    pub source: String,
}

/// Codec configuration: a serialization strategy plus a wire layout.
///
/// Immutable once built; share it behind an `Arc` across tasks.
#[derive(Clone, Debug)]
pub struct WireConfig<C> {
    /// Serialization strategy.
    pub codec: C,

    /// Wire layout.
    pub mode: WireMode,
}

/// Borrowed envelope used when encoding.
#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    time: &'a DateTime<Utc>,
    source: &'a str,
    data: &'a Value,
    #[serde(rename = "contenttype")]
    content_type: &'a str,
}

/// Owned envelope used when decoding. Missing fields decode as empty so the
/// header check can report them.
#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(default)]
    id: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    data: Value,
    #[serde(default, rename = "contenttype")]
    content_type: String,
}

impl<C> WireConfig<C>
where
    C: Codec,
{
    /// Creates a new wire config.
    pub const fn new(codec: C, mode: WireMode) -> Self {
        Self { codec, mode }
    }

    /// Converts a wire payload into a message.
    ///
    /// # Errors
    ///
    /// Returns a `FormatError` when the payload cannot be decoded, when raw
    /// header fields are missing or malformed (all failures are reported
    /// together), or when the result lacks id, type, source or time.
    pub fn decode(&self, payload: &[u8]) -> Result<Message, FormatError> {
        let message = match &self.mode {
            WireMode::Enveloped { .. } => {
                let envelope: IncomingEnvelope = self
                    .codec
                    .decode(payload)
                    .map_err(|e| FormatError::Decode(Box::new(e)))?;

                let Some(time) = envelope.time else {
                    return Err(FormatError::MissingHeaders);
                };

                let mut message = Message::new(
                    envelope.id,
                    envelope.kind,
                    envelope.source,
                    time,
                    envelope.data,
                );
                message.content_type = envelope.content_type;
                message
            }
            WireMode::Raw(headers) => {
                let data: Map<String, Value> = self
                    .codec
                    .decode(payload)
                    .map_err(|e| FormatError::Decode(Box::new(e)))?;

                let (id, time) = extract_headers(&data, headers)?;

                Message::new(
                    id,
                    headers.kind.clone(),
                    headers.source.clone(),
                    time,
                    Value::Object(data),
                )
            }
        };

        if !message.headers_set() {
            return Err(FormatError::MissingHeaders);
        }

        Ok(message)
    }

    /// Converts a message into a wire payload. Raw mode encodes `data`
    /// only; enveloped mode encodes the whole envelope with the configured
    /// content type.
    ///
    /// # Errors
    ///
    /// Returns the codec's error unchanged.
    pub fn encode<H>(&self, message: &Message<H>) -> Result<Bytes, C::Error> {
        match &self.mode {
            WireMode::Raw(_) => self.codec.encode(&message.data),
            WireMode::Enveloped { content_type } => self.codec.encode(&OutgoingEnvelope {
                id: &message.id,
                kind: &message.kind,
                time: &message.time,
                source: &message.source,
                data: &message.data,
                content_type,
            }),
        }
    }
}

fn extract_headers(
    data: &Map<String, Value>,
    headers: &RawHeaders,
) -> Result<(String, DateTime<Utc>), FormatError> {
    let mut failures = Vec::new();

    let id = match data.get(&headers.id_field) {
        Some(Value::String(id)) => Some(id.clone()),
        _ => {
            failures.push(FieldError::Id(headers.id_field.clone()));
            None
        }
    };

    let time = match data.get(&headers.time_field) {
        Some(Value::String(time)) => match DateTime::parse_from_rfc3339(time) {
            Ok(time) => Some(time.with_timezone(&Utc)),
            Err(source) => {
                failures.push(FieldError::TimeFormat {
                    field: headers.time_field.clone(),
                    source,
                });
                None
            }
        },
        _ => {
            failures.push(FieldError::Time(headers.time_field.clone()));
            None
        }
    };

    match (id, time) {
        (Some(id), Some(time)) => Ok((id, time)),
        _ => Err(FormatError::Fields(failures)),
    }
}
