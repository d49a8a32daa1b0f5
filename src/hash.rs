//! Digest values, hash algorithms and the hashing capability

use std::fmt;

use ripemd::Ripemd160;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};
use sha3::{Sha3_256, Sha3_512};

use crate::error::{LedgerError, Result};

/// Immutable digest value, ordered lexicographically by its bytes.
///
/// The zero-length digest is the "no prior reference" sentinel, see
/// [`Hash::empty`].
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash)]
pub struct Hash(Vec<u8>);

impl Hash {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Sentinel meaning "no prior reference"
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Self)
            .map_err(|e| LedgerError::Serialization(format!("invalid hex digest: {}", e)))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct HashVisitor;

impl<'de> Visitor<'de> for HashVisitor {
    type Value = Hash;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a digest as hex string or byte sequence")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Hash, E> {
        hex::decode(v).map(Hash).map_err(E::custom)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Hash, E> {
        Ok(Hash(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Hash, E> {
        Ok(Hash(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Hash, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(b) = seq.next_element::<u8>()? {
            bytes.push(b);
        }
        Ok(Hash(bytes))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(HashVisitor)
        } else {
            deserializer.deserialize_byte_buf(HashVisitor)
        }
    }
}

/// Hasher: 𝔹* → ℍ
///
/// Pure and deterministic for a given algorithm.
pub trait Hasher {
    fn apply_hash(&self, bytes: &[u8]) -> Hash;
}

/// Selectable hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize)]
pub enum Hashers {
    #[serde(rename = "sha-256")]
    Sha256,
    #[serde(rename = "sha-512")]
    Sha512,
    #[serde(rename = "sha3-256")]
    Sha3_256,
    #[serde(rename = "sha3-512")]
    Sha3_512,
    #[serde(rename = "ripemd-160")]
    Ripemd160,
}

impl Hashers {
    pub const ALL: [Hashers; 5] = [
        Hashers::Sha256,
        Hashers::Sha512,
        Hashers::Sha3_256,
        Hashers::Sha3_512,
        Hashers::Ripemd160,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Hashers::Sha256 => "sha-256",
            Hashers::Sha512 => "sha-512",
            Hashers::Sha3_256 => "sha3-256",
            Hashers::Sha3_512 => "sha3-512",
            Hashers::Ripemd160 => "ripemd-160",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Hashers::Sha256 | Hashers::Sha3_256 => 32,
            Hashers::Sha512 | Hashers::Sha3_512 => 64,
            Hashers::Ripemd160 => 20,
        }
    }

    /// Stable identifier of the algorithm: SHA3-512 of its name
    pub fn id(&self) -> Hash {
        Hashers::Sha3_512.apply_hash(self.name().as_bytes())
    }

    pub fn from_id(id: &Hash) -> Result<Hashers> {
        Hashers::ALL
            .iter()
            .copied()
            .find(|h| &h.id() == id)
            .ok_or_else(|| LedgerError::UnknownHasher(id.to_hex()))
    }
}

impl Hasher for Hashers {
    fn apply_hash(&self, bytes: &[u8]) -> Hash {
        let digest = match self {
            Hashers::Sha256 => Sha256::digest(bytes).to_vec(),
            Hashers::Sha512 => Sha512::digest(bytes).to_vec(),
            Hashers::Sha3_256 => Sha3_256::digest(bytes).to_vec(),
            Hashers::Sha3_512 => Sha3_512::digest(bytes).to_vec(),
            Hashers::Ripemd160 => Ripemd160::digest(bytes).to_vec(),
        };
        Hash(digest)
    }
}

/// Any entity exposing a digest of its fields
pub trait Hashing {
    fn hash(&self) -> &Hash;
}

impl Hashing for Hash {
    fn hash(&self) -> &Hash {
        self
    }
}
