//! # Hashed-Ledger
//!
//! Integrity core of a permissioned, append-only ledger of sensor readings.
//!
//! This crate provides the entities whose digests anchor the ledger: lazily
//! hashed coinbases, block headers and payout records, Merkle trees over
//! block transactions, and the ledger's self-hashed identity.
//!
//! ## Architecture
//!
//! The system follows a layered architecture:
//! - Values (hashes, decimals, readings, configuration)
//! - Hashed entities (transactions, outputs, coinbase, block header)
//! - Assembly (Merkle trees, blocks, ledger identity)
//! - Storage boundary (adapters to property-bag elements)
//!
//! ## Design Principles
//!
//! 1. **Explicit Configuration**: hasher, encoder and parameters are handed to every constructor
//! 2. **Never Stale**: a cached digest is invalidated by every mutation before it returns
//! 3. **Exact Arithmetic**: payouts are arbitrary-precision decimals under a precision context
//! 4. **Exact Version Pinning**: all integrity-critical dependencies pinned to exact versions
//!
//! ## Usage
//!
//! ```rust
//! use hashed_ledger::{Encoders, Hashers, Ledger, LedgerConfig};
//! use hashed_ledger::data::{LUnit, LedgerData, LuminosityData, PhysicalData};
//! use hashed_ledger::types::{DataConstant, Difficulty, Measurement};
//! use hashed_ledger::hash::Hash;
//! use secp256k1::SecretKey;
//! use chrono::Utc;
//!
//! let ledger = Ledger::new("greenhouse", LedgerConfig::new(Hashers::Sha3_256, Encoders::Cbor))?;
//! let mut block = ledger.new_block(Hash::empty(), Difficulty::one(), 1, ledger.new_merkle_tree())?;
//!
//! let sensor = SecretKey::from_slice(&[7u8; 32]).unwrap();
//! let reading = PhysicalData::new(
//!     Utc::now(),
//!     LedgerData::Luminosity(LuminosityData { lum: Measurement::from(320), unit: LUnit::Lux }),
//!     DataConstant::one(),
//! );
//! let transaction = ledger.sign_transaction(&sensor, reading)?;
//!
//! assert!(block.add_transaction(transaction, None, None)?);
//! assert_eq!(block.coinbase().output_count(), 1);
//! assert!(block.verify_body());
//! # Ok::<(), hashed_ledger::LedgerError>(())
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod hash;
pub mod encoding;
pub mod cache;
pub mod config;
pub mod data;
pub mod formula;
pub mod transaction;
pub mod output;
pub mod coinbase;
pub mod merkle;
pub mod merkle_storage;
pub mod block;
pub mod ledger_id;
pub mod storage;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{LedgerError, Result};
pub use hash::{Hash, Hasher, Hashers, Hashing};
pub use encoding::{Encoder, Encoders};
pub use cache::HashUpdateable;
pub use config::{BlockParams, CoinbaseParams, LedgerConfig, LedgerParams, LedgerSettings};
pub use coinbase::{HashedCoinbase, SharedCoinbase};
pub use merkle::{MerkleTree, MerkleTreeImpl, MutableMerkleTree};
pub use merkle_storage::{MerkleTreeFactory, StorageAwareMerkleTree};
pub use block::Block;
pub use ledger_id::{LedgerId, LedgerIdBuilder};

use chrono::{DateTime, Utc};
use secp256k1::SecretKey;
use tracing::debug;

use block::HashedBlockHeader;
use data::PhysicalData;
use transaction::{HashedTransaction, Transaction};

/// A ledger: its validated configuration and identity
///
/// Every entity created through a `Ledger` uses its hasher, encoder and
/// parameters.
///
/// # Examples
///
/// ```
/// use hashed_ledger::{Encoders, Hashers, Hashing, Ledger, LedgerConfig};
///
/// let ledger = Ledger::new("orchard", LedgerConfig::new(Hashers::Sha256, Encoders::Json)).unwrap();
/// assert_eq!(ledger.id().tag(), "orchard");
/// assert_eq!(ledger.id().hash().len(), 32);
/// ```
#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
    id: LedgerId,
}

impl Ledger {
    /// Create a ledger with a fresh identity
    pub fn new(tag: impl Into<String>, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let id = LedgerId::new(tag, config.ledger_params().clone(), config.hasher(), config.encoder())?;
        debug!(tag = id.tag(), "opened ledger");
        Ok(Self { config, id })
    }

    /// Reopen a ledger from a persisted identity
    ///
    /// The identity must verify under the configuration and carry the same
    /// ledger parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use hashed_ledger::{Encoders, Hashers, Ledger, LedgerConfig, LedgerId};
    ///
    /// let config = LedgerConfig::new(Hashers::Sha3_512, Encoders::Cbor);
    /// let ledger = Ledger::new("hives", config.clone()).unwrap();
    ///
    /// let bytes = ledger.id().encode(Encoders::Cbor).unwrap();
    /// let id = LedgerId::decode(&bytes, Hashers::Sha3_512, Encoders::Cbor).unwrap();
    /// let reopened = Ledger::open(config, id).unwrap();
    /// assert_eq!(reopened.id(), ledger.id());
    /// ```
    pub fn open(config: LedgerConfig, id: LedgerId) -> Result<Self> {
        config.validate()?;
        id.verify(config.hasher(), config.encoder())?;
        if id.ledger_params() != config.ledger_params() {
            return Err(LedgerError::InvalidConfig(
                "ledger id was created with other ledger params".to_string(),
            ));
        }
        Ok(Self { config, id })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn id(&self) -> &LedgerId {
        &self.id
    }

    /// Empty coinbase for the block at `block_height`
    pub fn new_coinbase(&self, difficulty: Difficulty, block_height: u64) -> HashedCoinbase {
        HashedCoinbase::new(difficulty, block_height, &self.config)
    }

    pub fn new_merkle_tree(&self) -> MerkleTreeImpl {
        MerkleTreeImpl::new(self.config.hasher())
    }

    pub fn new_storage_aware_merkle_tree(&self) -> StorageAwareMerkleTree {
        StorageAwareMerkleTree::new(self.new_merkle_tree())
    }

    /// Empty block chained after `previous_hash`, timestamped now
    pub fn new_block<T: MutableMerkleTree>(
        &self,
        previous_hash: Hash,
        difficulty: Difficulty,
        block_height: u64,
        merkle_tree: T,
    ) -> Result<Block<T>> {
        self.new_block_at(previous_hash, difficulty, block_height, merkle_tree, Utc::now())
    }

    pub fn new_block_at<T: MutableMerkleTree>(
        &self,
        previous_hash: Hash,
        difficulty: Difficulty,
        block_height: u64,
        merkle_tree: T,
        timestamp: DateTime<Utc>,
    ) -> Result<Block<T>> {
        let header = HashedBlockHeader::new(
            self.id.hash().clone(),
            previous_hash,
            self.config.ledger_params().block_params.clone(),
            timestamp,
            self.config.hasher(),
            self.config.encoder(),
        );
        Block::new(header, self.new_coinbase(difficulty, block_height), merkle_tree)
    }

    /// Sign a reading and freeze its transaction hash
    pub fn sign_transaction(&self, secret_key: &SecretKey, data: PhysicalData) -> Result<HashedTransaction> {
        let transaction = Transaction::new(secret_key, data, self.config.hasher())?;
        HashedTransaction::new(transaction, self.config.hasher(), self.config.encoder())
    }
}
