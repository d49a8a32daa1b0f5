//! Ledger identity
//!
//! A [`LedgerId`] is hashed exactly once, when it is built. Changing any of
//! its inputs means building a new identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::LedgerParams;
use crate::encoding::{Encoder, Encoders};
use crate::error::{LedgerError, Result};
use crate::hash::{Hash, Hasher, Hashers, Hashing};

/// LedgerId: tag × ℍ × uuid × instant × LedgerParams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerId {
    tag: String,
    hash: Hash,
    uuid: Uuid,
    instant: DateTime<Utc>,
    ledger_params: LedgerParams,
}

/// Tuple the identity hash is computed over
#[derive(Serialize)]
struct IdentityFields<'a> {
    tag: &'a str,
    hasher: Hashers,
    uuid: &'a Uuid,
    instant: &'a DateTime<Utc>,
    ledger_params: &'a LedgerParams,
}

impl IdentityFields<'_> {
    fn digest(&self, encoder: Encoders) -> Result<Hash> {
        Ok(self.hasher.apply_hash(&encoder.encode(self)?))
    }
}

impl LedgerId {
    /// New identity with a random uuid created now
    pub fn new(tag: impl Into<String>, ledger_params: LedgerParams, hasher: Hashers, encoder: Encoders) -> Result<Self> {
        LedgerIdBuilder::new(tag, ledger_params).build(hasher, encoder)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn instant(&self) -> &DateTime<Utc> {
        &self.instant
    }

    pub fn ledger_params(&self) -> &LedgerParams {
        &self.ledger_params
    }

    fn fields(&self, hasher: Hashers) -> IdentityFields<'_> {
        IdentityFields {
            tag: &self.tag,
            hasher,
            uuid: &self.uuid,
            instant: &self.instant,
            ledger_params: &self.ledger_params,
        }
    }

    /// Recomputes the identity hash from the stored fields
    pub fn verify(&self, hasher: Hashers, encoder: Encoders) -> Result<()> {
        let computed = self.fields(hasher).digest(encoder)?;
        if computed != self.hash {
            return Err(LedgerError::HashMismatch {
                stored: self.hash.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }

    pub fn encode(&self, encoder: Encoders) -> Result<Vec<u8>> {
        encoder.encode(self)
    }

    /// Decodes a persisted identity and checks its hash
    pub fn decode(bytes: &[u8], hasher: Hashers, encoder: Encoders) -> Result<Self> {
        let id: LedgerId = encoder.decode(bytes)?;
        id.verify(hasher, encoder)?;
        Ok(id)
    }
}

impl Hashing for LedgerId {
    fn hash(&self) -> &Hash {
        &self.hash
    }
}

/// One-shot builder for [`LedgerId`]
#[derive(Debug, Clone)]
pub struct LedgerIdBuilder {
    tag: String,
    ledger_params: LedgerParams,
    uuid: Option<Uuid>,
    instant: Option<DateTime<Utc>>,
}

impl LedgerIdBuilder {
    pub fn new(tag: impl Into<String>, ledger_params: LedgerParams) -> Self {
        Self { tag: tag.into(), ledger_params, uuid: None, instant: None }
    }

    /// Fixes the uuid instead of drawing a random one
    pub fn uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Fixes the creation instant instead of using the current time
    pub fn instant(mut self, instant: DateTime<Utc>) -> Self {
        self.instant = Some(instant);
        self
    }

    pub fn build(self, hasher: Hashers, encoder: Encoders) -> Result<LedgerId> {
        if self.ledger_params.crypter != hasher.id() {
            return Err(LedgerError::InvalidConfig(format!(
                "ledger params crypter does not identify {}",
                hasher.name()
            )));
        }
        let mut id = LedgerId {
            tag: self.tag,
            hash: Hash::empty(),
            uuid: self.uuid.unwrap_or_else(Uuid::new_v4),
            instant: self.instant.unwrap_or_else(Utc::now),
            ledger_params: self.ledger_params,
        };
        id.hash = id.fields(hasher).digest(encoder)?;
        debug!(tag = %id.tag, uuid = %id.uuid, hash = %id.hash, "created ledger id");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(tag: &str) -> LedgerIdBuilder {
        LedgerIdBuilder::new(tag, LedgerParams::for_hasher(Hashers::Sha3_256))
            .uuid(Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0))
            .instant(DateTime::<Utc>::from_timestamp(1_650_000_000, 0).unwrap())
    }

    #[test]
    fn test_fixed_inputs_are_reproducible() {
        let a = fixed("ledger").build(Hashers::Sha3_256, Encoders::Cbor).unwrap();
        let b = fixed("ledger").build(Hashers::Sha3_256, Encoders::Cbor).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 32);
    }

    #[test]
    fn test_every_field_feeds_the_hash() {
        let base = fixed("ledger").build(Hashers::Sha3_256, Encoders::Cbor).unwrap();
        let tag = fixed("other").build(Hashers::Sha3_256, Encoders::Cbor).unwrap();
        let uuid = fixed("ledger").uuid(Uuid::nil()).build(Hashers::Sha3_256, Encoders::Cbor).unwrap();
        let mut params = LedgerParams::for_hasher(Hashers::Sha3_256);
        params.recalc_trigger += 1;
        let params = LedgerIdBuilder::new("ledger", params)
            .uuid(*base.uuid())
            .instant(*base.instant())
            .build(Hashers::Sha3_256, Encoders::Cbor)
            .unwrap();
        assert_ne!(base.hash(), tag.hash());
        assert_ne!(base.hash(), uuid.hash());
        assert_ne!(base.hash(), params.hash());
    }

    #[test]
    fn test_random_ids_differ() {
        let params = LedgerParams::for_hasher(Hashers::Sha256);
        let a = LedgerId::new("l", params.clone(), Hashers::Sha256, Encoders::Json).unwrap();
        let b = LedgerId::new("l", params, Hashers::Sha256, Encoders::Json).unwrap();
        assert_ne!(a.uuid(), b.uuid());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_crypter_must_match_hasher() {
        let result = fixed("ledger").build(Hashers::Sha256, Encoders::Cbor);
        assert!(matches!(result, Err(LedgerError::InvalidConfig(_))));
    }

    #[test]
    fn test_round_trip_and_tamper_detection() {
        for encoder in [Encoders::Cbor, Encoders::Json] {
            let id = fixed("ledger").build(Hashers::Sha3_256, encoder).unwrap();
            let decoded = LedgerId::decode(&id.encode(encoder).unwrap(), Hashers::Sha3_256, encoder).unwrap();
            assert_eq!(decoded, id);

            let mut tampered = id.clone();
            tampered.tag = "forged".to_string();
            assert!(matches!(
                tampered.verify(Hashers::Sha3_256, encoder),
                Err(LedgerError::HashMismatch { .. })
            ));
        }
    }
}
