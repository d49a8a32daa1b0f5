//! Signed sensor transactions

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

use crate::data::PhysicalData;
use crate::encoding::{Encoder, Encoders};
use crate::error::{LedgerError, Result};
use crate::hash::{Hash, Hasher, Hashers, Hashing};
use crate::types::PublicKey;

/// Transaction: 𝒦 × 𝒟 × 𝒮
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub public_key: PublicKey,
    pub data: PhysicalData,
    pub signature: Signature,
}

/// Message signed for a reading: SHA-256 of its digest under `hasher`
fn signing_message(data: &PhysicalData, hasher: Hashers) -> Result<Message> {
    let digest = Hashers::Sha256.apply_hash(data.digest(hasher).as_bytes());
    Message::from_digest_slice(digest.as_bytes())
        .map_err(|e| LedgerError::InvalidSignature(e.to_string()))
}

impl Transaction {
    /// Signs `data` with `secret_key`
    pub fn new(secret_key: &SecretKey, data: PhysicalData, hasher: Hashers) -> Result<Self> {
        let secp = Secp256k1::new();
        let message = signing_message(&data, hasher)?;
        Ok(Self {
            public_key: PublicKey::from_secret_key(&secp, secret_key),
            signature: secp.sign_ecdsa(&message, secret_key),
            data,
        })
    }

    pub fn verify(&self, hasher: Hashers) -> Result<()> {
        let secp = Secp256k1::verification_only();
        let message = signing_message(&self.data, hasher)?;
        secp.verify_ecdsa(&message, &self.signature, &self.public_key)
            .map_err(|e| LedgerError::InvalidSignature(e.to_string()))
    }
}

/// Transaction with its digest and approximate size frozen at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashedTransaction {
    transaction: Transaction,
    hash: Hash,
    #[serde(skip)]
    size: u64,
}

#[derive(Deserialize)]
struct StoredTransaction {
    transaction: Transaction,
    hash: Hash,
}

impl HashedTransaction {
    pub fn new(transaction: Transaction, hasher: Hashers, encoder: Encoders) -> Result<Self> {
        let bytes = encoder.encode(&transaction)?;
        let hash = hasher.apply_hash(&bytes);
        let size = (bytes.len() + hash.len()) as u64;
        Ok(Self { transaction, hash, size })
    }

    /// Decodes a persisted transaction, refusing it if its stored hash is stale
    pub fn decode(bytes: &[u8], hasher: Hashers, encoder: Encoders) -> Result<Self> {
        let stored: StoredTransaction = encoder.decode(bytes)?;
        let rebuilt = Self::new(stored.transaction, hasher, encoder)?;
        if rebuilt.hash != stored.hash {
            return Err(LedgerError::HashMismatch {
                stored: stored.hash.to_hex(),
                computed: rebuilt.hash.to_hex(),
            });
        }
        Ok(rebuilt)
    }

    pub fn encode(&self, encoder: Encoders) -> Result<Vec<u8>> {
        encoder.encode(self)
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.transaction.public_key
    }

    pub fn data(&self) -> &PhysicalData {
        &self.transaction.data
    }

    pub fn approximate_size(&self) -> u64 {
        self.size
    }

    pub fn verify(&self, hasher: Hashers) -> Result<()> {
        self.transaction.verify(hasher)
    }
}

impl Hashing for HashedTransaction {
    fn hash(&self) -> &Hash {
        &self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LUnit, LedgerData, LuminosityData};
    use crate::types::{DataConstant, Measurement};
    use chrono::{DateTime, Utc};

    fn reading(lum: i64) -> PhysicalData {
        PhysicalData::new(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            LedgerData::Luminosity(LuminosityData { lum: Measurement::from(lum), unit: LUnit::Lux }),
            DataConstant::one(),
        )
    }

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let tx = Transaction::new(&key(7), reading(10), Hashers::Sha3_512).unwrap();
        assert!(tx.verify(Hashers::Sha3_512).is_ok());
    }

    #[test]
    fn test_tampered_data_fails_verification() {
        let mut tx = Transaction::new(&key(7), reading(10), Hashers::Sha3_512).unwrap();
        tx.data = reading(11);
        assert!(matches!(tx.verify(Hashers::Sha3_512), Err(LedgerError::InvalidSignature(_))));
    }

    #[test]
    fn test_hash_depends_on_content() {
        let a = HashedTransaction::new(
            Transaction::new(&key(1), reading(10), Hashers::Sha256).unwrap(),
            Hashers::Sha256,
            Encoders::Cbor,
        )
        .unwrap();
        let b = HashedTransaction::new(
            Transaction::new(&key(1), reading(20), Hashers::Sha256).unwrap(),
            Hashers::Sha256,
            Encoders::Cbor,
        )
        .unwrap();
        assert_ne!(a.hash(), b.hash());
        assert!(a.approximate_size() > 32);
    }

    #[test]
    fn test_decode_round_trip() {
        for encoder in [Encoders::Cbor, Encoders::Json] {
            let tx = HashedTransaction::new(
                Transaction::new(&key(3), reading(42), Hashers::Sha256).unwrap(),
                Hashers::Sha256,
                encoder,
            )
            .unwrap();
            let bytes = tx.encode(encoder).unwrap();
            let decoded = HashedTransaction::decode(&bytes, Hashers::Sha256, encoder).unwrap();
            assert_eq!(decoded, tx);
        }
    }

    #[test]
    fn test_decode_with_other_hasher_is_mismatch() {
        let tx = HashedTransaction::new(
            Transaction::new(&key(3), reading(42), Hashers::Sha256).unwrap(),
            Hashers::Sha256,
            Encoders::Json,
        )
        .unwrap();
        let bytes = tx.encode(Encoders::Json).unwrap();
        assert!(matches!(
            HashedTransaction::decode(&bytes, Hashers::Sha3_256, Encoders::Json),
            Err(LedgerError::HashMismatch { .. })
        ));
    }
}
