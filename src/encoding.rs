//! Canonical binary encodings used for hashing, size estimation and persistence

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Encoder: entity → 𝔹*
///
/// Must be deterministic: the same logical value always yields the same bytes.
pub trait Encoder {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Selectable encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoders {
    Cbor,
    Json,
}

impl Encoder for Encoders {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Encoders::Cbor => {
                serde_cbor::to_vec(value).map_err(|e| LedgerError::Serialization(e.to_string()))
            }
            Encoders::Json => {
                serde_json::to_vec(value).map_err(|e| LedgerError::Serialization(e.to_string()))
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Encoders::Cbor => serde_cbor::from_slice(bytes)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
            Encoders::Json => serde_json::from_slice(bytes)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_encode_deterministic() {
        let mut value = BTreeMap::new();
        value.insert("b".to_string(), 2u32);
        value.insert("a".to_string(), 1u32);
        for encoder in [Encoders::Cbor, Encoders::Json] {
            assert_eq!(encoder.encode(&value).unwrap(), encoder.encode(&value).unwrap());
        }
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let result: Result<BTreeMap<String, u32>> = Encoders::Json.decode(b"{not json");
        assert!(matches!(result, Err(LedgerError::Serialization(_))));
    }
}
