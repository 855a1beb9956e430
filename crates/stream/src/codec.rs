use std::error::Error;
use std::fmt::Debug;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A serialization strategy for wire payloads.
///
/// # Associated Types
/// - `Error`: The error type returned by both directions, passed to callers unwrapped on encode.
///
/// # Required Methods
/// - `fn decode<T>(&self, payload: &[u8]) -> Result<T, Self::Error>`: Decodes a payload into any deserializable value.
/// - `fn encode<T>(&self, value: &T) -> Result<Bytes, Self::Error>`: Encodes any serializable value into a payload.
pub trait Codec: Clone + Debug + Send + Sync + 'static {
    /// The error type for the codec.
    type Error: Error + Send + Sync + 'static;

    /// Decodes `payload` into a `T`.
    fn decode<T>(&self, payload: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned;

    /// Encodes `value` into a payload.
    fn encode<T>(&self, value: &T) -> Result<Bytes, Self::Error>
    where
        T: Serialize + ?Sized;
}

/// JSON wire payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Error = serde_json::Error;

    fn decode<T>(&self, payload: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(payload)
    }

    fn encode<T>(&self, value: &T) -> Result<Bytes, Self::Error>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value).map(Bytes::from)
    }
}

/// CBOR wire payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct CborCodec;

/// Errors that can occur in the CBOR codec.
#[derive(Debug, Error)]
pub enum CborError {
    /// Deserialization error.
    #[error(transparent)]
    Deserialize(#[from] ciborium::de::Error<std::io::Error>),

    /// Serialization error.
    #[error(transparent)]
    Serialize(#[from] ciborium::ser::Error<std::io::Error>),
}

impl Codec for CborCodec {
    type Error = CborError;

    fn decode<T>(&self, payload: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned,
    {
        Ok(ciborium::de::from_reader(payload)?)
    }

    fn encode<T>(&self, value: &T) -> Result<Bytes, Self::Error>
    where
        T: Serialize + ?Sized,
    {
        let mut buffer = Vec::new();
        ciborium::ser::into_writer(value, &mut buffer)?;
        Ok(Bytes::from(buffer))
    }
}
