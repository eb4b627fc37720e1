//! Key and value encodings plus the pluggable object-graph codec.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Payload encodings recorded alongside every set entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Opaque byte string stored verbatim.
    Bytes,
    /// Canonical JSON text.
    Json,
    /// Output of the configured [`ObjectCodec`].
    Opaque,
}

/// Serializes a JSON value to its canonical text. Object keys are sorted by
/// `serde_json`'s map representation, so equal values always produce equal
/// text.
pub(crate) fn canonical_text(value: &serde_json::Value) -> String {
    serde_json::to_string(value).expect("serialize json value")
}

/// Caller-supplied key.
///
/// Identity is the canonical JSON text, so anything representable as a JSON
/// value works as a key: numbers, strings, booleans, null, and arrays or
/// objects of these.
#[derive(Clone, Debug, PartialEq)]
pub struct Key(serde_json::Value);

impl Key {
    /// Returns the canonical text used as the key's identity.
    pub fn canonical(&self) -> String {
        canonical_text(&self.0)
    }

    pub(crate) fn into_json(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Key {
    fn from(value: serde_json::Value) -> Self {
        Key(value)
    }
}

macro_rules! key_from {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Key {
            fn from(value: $ty) -> Self {
                Key(serde_json::Value::from(value))
            }
        })+
    };
}

key_from!(&str, String, bool, i32, i64, u32, u64, f64);

/// A value classified under one of the three payload encodings.
///
/// Raw byte vectors convert to `Bytes` and never to `Json`, so byte payloads
/// cannot be mis-tagged. `Opaque` carries bytes produced by an
/// [`ObjectCodec`]; `Store::set_object` and `Store::get_object` are the
/// typed entry points for it.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Opaque(Vec<u8>),
}

impl Value {
    /// Encodes the value, returning the payload bytes and their tag.
    pub(crate) fn into_payload(self) -> Result<(Vec<u8>, Encoding)> {
        match self {
            Value::Bytes(bytes) => Ok((bytes, Encoding::Bytes)),
            Value::Json(value) => {
                let text = serde_json::to_string(&value)
                    .map_err(|err| Error::Codec(err.to_string()))?;
                Ok((text.into_bytes(), Encoding::Json))
            }
            Value::Opaque(bytes) => Ok((bytes, Encoding::Opaque)),
        }
    }

    /// Decodes payload bytes read back under the recorded tag.
    pub(crate) fn from_payload(bytes: Vec<u8>, encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Bytes => Ok(Value::Bytes(bytes)),
            Encoding::Json => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|err| Error::Codec(err.to_string()))?;
                Ok(Value::Json(value))
            }
            Encoding::Opaque => Ok(Value::Opaque(bytes)),
        }
    }

    /// Returns the raw bytes of a `Bytes` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the JSON value of a `Json` value.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

macro_rules! value_from_json {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Json(serde_json::Value::from(value))
            }
        })+
    };
}

value_from_json!(&str, String, bool, i32, i64, u32, u64, f64);

/// Object-graph codec used for values outside the bytes/JSON taxonomy.
pub trait ObjectCodec {
    /// Serializes an arbitrary caller value to payload bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Reconstructs a value from payload bytes produced by `encode`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Default object codec backed by `bincode`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bincode;

impl ObjectCodec for Bincode {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|err| Error::Codec(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|err| Error::Codec(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_bytes_are_never_tagged_json() {
        let (payload, encoding) = Value::from(vec![1u8, 2, 3]).into_payload().unwrap();
        assert_eq!(encoding, Encoding::Bytes);
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn json_values_round_trip() {
        let original = Value::from(json!({"b": 2, "a": [1, null, "x"]}));
        let (payload, encoding) = original.clone().into_payload().unwrap();
        assert_eq!(encoding, Encoding::Json);
        assert_eq!(Value::from_payload(payload, encoding).unwrap(), original);
    }

    #[test]
    fn key_identity_is_canonical_text() {
        assert_eq!(Key::from(7i32).canonical(), Key::from(7u64).canonical());
        assert_ne!(Key::from("7").canonical(), Key::from(7i32).canonical());
    }

    #[test]
    fn bincode_codec_round_trips() {
        let codec = Bincode;
        let bytes = codec.encode(&("tuple", 9u32)).unwrap();
        let decoded: (String, u32) = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, ("tuple".to_string(), 9));
    }
}
