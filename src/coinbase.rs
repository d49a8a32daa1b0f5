//! Coinbase: block-level payout aggregation
//!
//! Incoming transactions are fed one at a time into [`HashedCoinbase::add_to_input`],
//! which prices each contribution with the configured reward formula and
//! accumulates it into the contributing participant's [`TransactionOutput`].
//!
//! Invariant: `payout` always equals the sum of every output's payout. The
//! output set can only be changed through `add_to_input`.
//!
//! [`TransactionOutput`]: crate::output::TransactionOutput

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cache::{DigestCache, HashUpdateable};
use crate::config::{CoinbaseParams, LedgerConfig};
use crate::encoding::{Encoder, Encoders};
use crate::error::{LedgerError, Result};
use crate::formula::{calculate_payout, first_payout, DataFormula};
use crate::hash::{Hash, Hashers, Hashing};
use crate::output::{HashedTransactionOutput, TransactionOutput};
use crate::transaction::HashedTransaction;
use crate::types::{Difficulty, Payout, PublicKey};

/// Coinbase: 𝒪* × 𝒫 × 𝒟 × ℕ × ℕ × 𝒞 × ℱ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coinbase {
    #[serde(with = "output_set")]
    outputs: BTreeMap<PublicKey, HashedTransactionOutput>,
    payout: Payout,
    difficulty: Difficulty,
    block_height: u64,
    extra_nonce: u64,
    params: CoinbaseParams,
    #[serde(with = "crate::formula::digest_serde")]
    formula: Arc<dyn DataFormula>,
}

impl PartialEq for Coinbase {
    fn eq(&self, other: &Self) -> bool {
        self.payout == other.payout
            && self.difficulty == other.difficulty
            && self.block_height == other.block_height
            && self.extra_nonce == other.extra_nonce
            && self.params == other.params
            && self.formula.digest() == other.formula.digest()
            && self.outputs.len() == other.outputs.len()
            && self
                .outputs
                .values()
                .zip(other.outputs.values())
                .all(|(a, b)| same_output(a, b))
    }
}

fn same_output(a: &HashedTransactionOutput, b: &HashedTransactionOutput) -> bool {
    a.public_key() == b.public_key()
        && a.previous_utxo() == b.previous_utxo()
        && a.payout() == b.payout()
        && a.history() == b.history()
}

impl Coinbase {
    pub fn new(
        difficulty: Difficulty,
        block_height: u64,
        params: CoinbaseParams,
        formula: Arc<dyn DataFormula>,
    ) -> Self {
        Self {
            outputs: BTreeMap::new(),
            payout: Payout::zero(),
            difficulty,
            block_height,
            extra_nonce: 0,
            params,
            formula,
        }
    }
}

/// Coinbase with lazily cached hash and size
///
/// All reads go through [`HashUpdateable::cached_digest`]; every mutating
/// method takes `&mut self` and invalidates the cache before returning. To
/// share one instance across threads wrap it in a lock, see [`SharedCoinbase`].
#[derive(Debug, Clone)]
pub struct HashedCoinbase {
    coinbase: Coinbase,
    cache: DigestCache,
    hasher: Hashers,
    encoder: Encoders,
}

/// Single-writer, many-reader handle to a coinbase
pub type SharedCoinbase = Arc<RwLock<HashedCoinbase>>;

#[derive(Serialize)]
struct StoredCoinbaseRef<'a> {
    coinbase: &'a Coinbase,
    hash: &'a Hash,
}

#[derive(Deserialize)]
struct StoredCoinbase {
    coinbase: Coinbase,
    hash: Hash,
}

impl PartialEq for HashedCoinbase {
    fn eq(&self, other: &Self) -> bool {
        self.coinbase == other.coinbase
            && self.hasher == other.hasher
            && self.encoder == other.encoder
    }
}

impl HashedCoinbase {
    /// Empty coinbase for a new block
    pub fn new(difficulty: Difficulty, block_height: u64, config: &LedgerConfig) -> Self {
        Self::from_coinbase(
            Coinbase::new(
                difficulty,
                block_height,
                config.coinbase_params().clone(),
                config.formula().clone(),
            ),
            config.hasher(),
            config.encoder(),
        )
    }

    pub fn from_coinbase(coinbase: Coinbase, hasher: Hashers, encoder: Encoders) -> Self {
        Self { coinbase, cache: DigestCache::new(), hasher, encoder }
    }

    pub fn coinbase(&self) -> &Coinbase {
        &self.coinbase
    }

    pub fn outputs(&self) -> impl Iterator<Item = &HashedTransactionOutput> {
        self.coinbase.outputs.values()
    }

    pub fn output(&self, owner: &PublicKey) -> Option<&HashedTransactionOutput> {
        self.coinbase.outputs.get(owner)
    }

    pub fn output_count(&self) -> usize {
        self.coinbase.outputs.len()
    }

    pub fn payout(&self) -> &Payout {
        &self.coinbase.payout
    }

    pub fn difficulty(&self) -> &Difficulty {
        &self.coinbase.difficulty
    }

    pub fn block_height(&self) -> u64 {
        self.coinbase.block_height
    }

    pub fn extra_nonce(&self) -> u64 {
        self.coinbase.extra_nonce
    }

    pub fn params(&self) -> &CoinbaseParams {
        &self.coinbase.params
    }

    pub fn formula(&self) -> &Arc<dyn DataFormula> {
        &self.coinbase.formula
    }

    pub fn hasher(&self) -> Hashers {
        self.hasher
    }

    pub fn encoder(&self) -> Encoders {
        self.encoder
    }

    pub fn hash(&self) -> Result<Hash> {
        Ok(self.cached_digest(self.hasher, self.encoder)?.hash.clone())
    }

    pub fn approximate_size(&self) -> Result<u64> {
        Ok(self.cached_digest(self.hasher, self.encoder)?.size)
    }

    /// Sum of the payouts of every output
    pub fn outputs_total(&self) -> Payout {
        self.outputs().map(|o| o.payout().clone()).sum()
    }

    pub fn set_extra_nonce(&mut self, extra_nonce: u64) {
        self.coinbase.extra_nonce = extra_nonce;
        self.cache.invalidate();
    }

    /// AddToInput: 𝒯𝒳 × 𝒯𝒳? × 𝒪? → ()
    ///
    /// 1. No `latest_known`: first contribution, priced by the base formula
    ///    with unit factors; its previous transaction is the empty hash
    /// 2. Otherwise: priced by the diff between the new and the latest known reading
    /// 3. Add the payout to the coinbase total
    /// 4. Add it to the owner's output, creating one linked to `latest_utxo`
    ///    (or the empty hash) if the owner has none yet
    ///
    /// Nothing is mutated if pricing fails.
    ///
    /// # Panics
    ///
    /// If `latest_known` or `latest_utxo` belong to another participant than
    /// `new_transaction`. Accepting them would corrupt the payout invariant.
    pub fn add_to_input(
        &mut self,
        new_transaction: &HashedTransaction,
        latest_known: Option<&HashedTransaction>,
        latest_utxo: Option<&HashedTransactionOutput>,
    ) -> Result<()> {
        let owner = *new_transaction.public_key();
        if let Some(known) = latest_known {
            assert!(
                *known.public_key() == owner,
                "latest known transaction {} belongs to another participant",
                known.hash()
            );
        }
        if let Some(utxo) = latest_utxo {
            assert!(
                *utxo.public_key() == owner,
                "latest UTXO belongs to another participant"
            );
        }

        let latest_utxo_hash = match latest_utxo {
            Some(utxo) => utxo.hash(self.hasher, self.encoder)?,
            None => Hash::empty(),
        };

        let (payout, latest_known_hash) = match latest_known {
            None => {
                let payout = first_payout(
                    new_transaction.data(),
                    self.coinbase.formula.as_ref(),
                    &self.coinbase.params,
                )?;
                debug!(owner = %owner, payout = %payout, "first contribution");
                (payout, Hash::empty())
            }
            Some(known) => {
                let payout = calculate_payout(
                    new_transaction.data(),
                    known.data(),
                    self.coinbase.formula.as_ref(),
                    &self.coinbase.params,
                )?;
                debug!(owner = %owner, payout = %payout, previous = %known.hash(), "differential contribution");
                (payout, known.hash().clone())
            }
        };

        self.coinbase.payout += &payout;
        self.add_to_outputs(
            owner,
            latest_utxo_hash,
            new_transaction.hash().clone(),
            latest_known_hash,
            &payout,
        );
        self.cache.invalidate();
        Ok(())
    }

    fn add_to_outputs(
        &mut self,
        owner: PublicKey,
        previous_utxo: Hash,
        new_transaction: Hash,
        previous_transaction: Hash,
        payout: &Payout,
    ) {
        match self.coinbase.outputs.get_mut(&owner) {
            Some(output) => {
                trace!(owner = %owner, "extending existing output");
                output.add_to_payout(payout, new_transaction, previous_transaction);
            }
            None => {
                trace!(owner = %owner, previous_utxo = %previous_utxo, "opening new output");
                let output = TransactionOutput::new(
                    owner,
                    previous_utxo,
                    payout.clone(),
                    new_transaction,
                    previous_transaction,
                );
                self.coinbase
                    .outputs
                    .insert(owner, HashedTransactionOutput::new(output));
            }
        }
    }

    /// Encodes the coinbase together with its hash
    pub fn encode(&self) -> Result<Vec<u8>> {
        let hash = self.hash()?;
        self.encoder.encode(&StoredCoinbaseRef { coinbase: &self.coinbase, hash: &hash })
    }

    /// Decodes a persisted coinbase, refusing it if its stored hash is stale
    /// or its payout pool differs from the sum of its outputs
    pub fn decode(bytes: &[u8], hasher: Hashers, encoder: Encoders) -> Result<Self> {
        let stored: StoredCoinbase = encoder.decode(bytes)?;
        let mut coinbase = Self::from_coinbase(stored.coinbase, hasher, encoder);
        let computed = coinbase.compute_digest(hasher, encoder)?;
        if computed.hash != stored.hash {
            return Err(LedgerError::HashMismatch {
                stored: stored.hash.to_hex(),
                computed: computed.hash.to_hex(),
            });
        }
        let outputs = coinbase.outputs_total();
        if coinbase.payout() != &outputs {
            return Err(LedgerError::PayoutMismatch {
                pool: coinbase.payout().to_string(),
                outputs: outputs.to_string(),
            });
        }
        coinbase.cache = DigestCache::seeded(computed);
        Ok(coinbase)
    }
}

impl HashUpdateable for HashedCoinbase {
    fn digest_cache(&self) -> &DigestCache {
        &self.cache
    }

    fn digest_cache_mut(&mut self) -> &mut DigestCache {
        &mut self.cache
    }

    fn canonical_bytes(&self, encoder: Encoders) -> Result<Vec<u8>> {
        encoder.encode(&self.coinbase)
    }
}

/// Output set persisted as a sequence ordered by owner
mod output_set {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::output::HashedTransactionOutput;
    use crate::types::PublicKey;

    pub fn serialize<S: Serializer>(
        outputs: &BTreeMap<PublicKey, HashedTransactionOutput>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(outputs.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<PublicKey, HashedTransactionOutput>, D::Error> {
        let outputs = Vec::<HashedTransactionOutput>::deserialize(deserializer)?;
        let mut set = BTreeMap::new();
        for output in outputs {
            let owner = *output.public_key();
            if set.insert(owner, output).is_some() {
                return Err(serde::de::Error::custom(format!("duplicate output for {}", owner)));
            }
        }
        Ok(set)
    }
}
