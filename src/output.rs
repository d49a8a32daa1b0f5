//! Per-participant payout records

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cache::{DigestCache, HashUpdateable};
use crate::encoding::{Encoder, Encoders};
use crate::error::Result;
use crate::hash::{Hash, Hashers};
use crate::types::{Payout, PublicKey};

/// A transaction counted into a payout, with the participant's previous one
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionLink {
    pub new_transaction: Hash,
    pub previous_transaction: Hash,
}

/// TransactionOutput: 𝒦 × ℍ × 𝒫 × (ℍ × ℍ)*
///
/// Two outputs are the same output iff they belong to the same participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionOutput {
    public_key: PublicKey,
    previous_utxo: Hash,
    payout: Payout,
    history: BTreeSet<TransactionLink>,
}

impl PartialEq for TransactionOutput {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for TransactionOutput {}

impl TransactionOutput {
    pub fn new(
        public_key: PublicKey,
        previous_utxo: Hash,
        payout: Payout,
        new_transaction: Hash,
        previous_transaction: Hash,
    ) -> Self {
        let mut history = BTreeSet::new();
        history.insert(TransactionLink { new_transaction, previous_transaction });
        Self { public_key, previous_utxo, payout, history }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn previous_utxo(&self) -> &Hash {
        &self.previous_utxo
    }

    pub fn payout(&self) -> &Payout {
        &self.payout
    }

    pub fn history(&self) -> &BTreeSet<TransactionLink> {
        &self.history
    }
}

/// [`TransactionOutput`] with a lazily cached digest
///
/// Encodes exactly like the wrapped output; the cache is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashedTransactionOutput {
    output: TransactionOutput,
    #[serde(skip)]
    cache: DigestCache,
}

impl PartialEq for HashedTransactionOutput {
    fn eq(&self, other: &Self) -> bool {
        self.output == other.output
    }
}

impl Eq for HashedTransactionOutput {}

impl HashedTransactionOutput {
    pub fn new(output: TransactionOutput) -> Self {
        Self { output, cache: DigestCache::new() }
    }

    pub fn output(&self) -> &TransactionOutput {
        &self.output
    }

    pub fn public_key(&self) -> &PublicKey {
        self.output.public_key()
    }

    pub fn previous_utxo(&self) -> &Hash {
        self.output.previous_utxo()
    }

    pub fn payout(&self) -> &Payout {
        self.output.payout()
    }

    pub fn history(&self) -> &BTreeSet<TransactionLink> {
        self.output.history()
    }

    /// Adds `payout` for `new_transaction` and records the link to the
    /// participant's previous transaction.
    pub(crate) fn add_to_payout(
        &mut self,
        payout: &Payout,
        new_transaction: Hash,
        previous_transaction: Hash,
    ) {
        self.output.payout += payout;
        self.output.history.insert(TransactionLink { new_transaction, previous_transaction });
        self.cache.invalidate();
    }

    pub fn hash(&self, hasher: Hashers, encoder: Encoders) -> Result<Hash> {
        Ok(self.cached_digest(hasher, encoder)?.hash.clone())
    }

    pub fn approximate_size(&self, hasher: Hashers, encoder: Encoders) -> Result<u64> {
        Ok(self.cached_digest(hasher, encoder)?.size)
    }
}

impl HashUpdateable for HashedTransactionOutput {
    fn digest_cache(&self) -> &DigestCache {
        &self.cache
    }

    fn digest_cache_mut(&mut self) -> &mut DigestCache {
        &mut self.cache
    }

    fn canonical_bytes(&self, encoder: Encoders) -> Result<Vec<u8>> {
        encoder.encode(&self.output)
    }
}
