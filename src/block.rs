//! Block assembly: header, coinbase, transactions and their Merkle tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{DigestCache, HashUpdateable};
use crate::coinbase::HashedCoinbase;
use crate::config::BlockParams;
use crate::encoding::{Encoder, Encoders};
use crate::error::Result;
use crate::hash::{Hash, Hashers, Hashing};
use crate::merkle::{MerkleTreeImpl, MutableMerkleTree};
use crate::output::HashedTransactionOutput;
use crate::transaction::HashedTransaction;

/// BlockHeader: ℍ × ℍ × BlockParams × ℍ × ℍ × instant × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub ledger_hash: Hash,
    pub previous_hash: Hash,
    pub params: BlockParams,
    pub coinbase_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: DateTime<Utc>,
    pub nonce: u64,
}

/// [`BlockHeader`] with lazily cached hash and size
#[derive(Debug, Clone)]
pub struct HashedBlockHeader {
    header: BlockHeader,
    cache: DigestCache,
    hasher: Hashers,
    encoder: Encoders,
}

impl PartialEq for HashedBlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.hasher == other.hasher && self.encoder == other.encoder
    }
}

impl HashedBlockHeader {
    pub fn new(
        ledger_hash: Hash,
        previous_hash: Hash,
        params: BlockParams,
        timestamp: DateTime<Utc>,
        hasher: Hashers,
        encoder: Encoders,
    ) -> Self {
        Self {
            header: BlockHeader {
                ledger_hash,
                previous_hash,
                params,
                coinbase_hash: Hash::empty(),
                merkle_root: Hash::empty(),
                timestamp,
                nonce: 0,
            },
            cache: DigestCache::new(),
            hasher,
            encoder,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn merkle_root(&self) -> &Hash {
        &self.header.merkle_root
    }

    pub fn coinbase_hash(&self) -> &Hash {
        &self.header.coinbase_hash
    }

    pub fn params(&self) -> &BlockParams {
        &self.header.params
    }

    pub fn nonce(&self) -> u64 {
        self.header.nonce
    }

    pub fn hash(&self) -> Result<Hash> {
        Ok(self.cached_digest(self.hasher, self.encoder)?.hash.clone())
    }

    pub fn approximate_size(&self) -> Result<u64> {
        Ok(self.cached_digest(self.hasher, self.encoder)?.size)
    }

    pub(crate) fn set_coinbase_hash(&mut self, hash: Hash) {
        self.header.coinbase_hash = hash;
        self.cache.invalidate();
    }

    pub(crate) fn set_merkle_root(&mut self, root: Hash) {
        self.header.merkle_root = root;
        self.cache.invalidate();
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.header.nonce = nonce;
        self.cache.invalidate();
    }
}

impl HashUpdateable for HashedBlockHeader {
    fn digest_cache(&self) -> &DigestCache {
        &self.cache
    }

    fn digest_cache_mut(&mut self) -> &mut DigestCache {
        &mut self.cache
    }

    fn canonical_bytes(&self, encoder: Encoders) -> Result<Vec<u8>> {
        encoder.encode(&self.header)
    }
}

/// Block: header × coinbase × transactions × Merkle tree
///
/// The tree is built over the transactions in insertion order; the header
/// always carries its current root and the current coinbase hash, so the
/// block hash covers both.
#[derive(Debug, Clone)]
pub struct Block<T = MerkleTreeImpl> {
    header: HashedBlockHeader,
    coinbase: HashedCoinbase,
    transactions: Vec<HashedTransaction>,
    merkle_tree: T,
}

impl<T: MutableMerkleTree> Block<T> {
    /// Empty block over `merkle_tree`, which is cleared first
    pub fn new(header: HashedBlockHeader, coinbase: HashedCoinbase, mut merkle_tree: T) -> Result<Self> {
        merkle_tree.rebuild::<HashedTransaction>(&[]);
        let mut header = header;
        header.set_coinbase_hash(coinbase.hash()?);
        header.set_merkle_root(merkle_tree.root());
        Ok(Self { header, coinbase, transactions: Vec::new(), merkle_tree })
    }

    pub fn header(&self) -> &HashedBlockHeader {
        &self.header
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.header.set_nonce(nonce);
    }

    pub fn coinbase(&self) -> &HashedCoinbase {
        &self.coinbase
    }

    pub fn transactions(&self) -> &[HashedTransaction] {
        &self.transactions
    }

    pub fn merkle_tree(&self) -> &T {
        &self.merkle_tree
    }

    pub fn hash(&self) -> Result<Hash> {
        self.header.hash()
    }

    pub fn contains(&self, transaction: &Hash) -> bool {
        self.merkle_tree.has_transaction(transaction)
    }

    /// Approximate size of header, coinbase and transactions together
    pub fn approximate_size(&self) -> Result<u64> {
        Ok(self.header.approximate_size()? + self.coinbase.approximate_size()? + self.transactions_size())
    }

    fn transactions_size(&self) -> u64 {
        self.transactions.iter().map(HashedTransaction::approximate_size).sum()
    }

    /// AddTransaction: 𝒯𝒳 × 𝒯𝒳? × 𝒪? → 𝔹
    ///
    /// 1. Refuse (`Ok(false)`) if the block is full by transaction count
    /// 2. Verify the transaction signature
    /// 3. Feed it to a copy of the coinbase (see [`HashedCoinbase::add_to_input`])
    /// 4. Refuse (`Ok(false)`) if the block with the grown coinbase would
    ///    exceed its size limit
    /// 5. Commit the coinbase, append to the Merkle tree and refresh both
    ///    header hashes
    ///
    /// Nothing is mutated when this returns `Ok(false)` or an error.
    pub fn add_transaction(
        &mut self,
        transaction: HashedTransaction,
        latest_known: Option<&HashedTransaction>,
        latest_utxo: Option<&HashedTransactionOutput>,
    ) -> Result<bool> {
        let params = self.header.params();
        let block_mem_size = params.block_mem_size;
        if self.transactions.len() as u64 >= params.block_length {
            debug!(length = self.transactions.len(), "block full by transaction count");
            return Ok(false);
        }

        transaction.verify(self.coinbase.hasher())?;
        let mut coinbase = self.coinbase.clone();
        coinbase.add_to_input(&transaction, latest_known, latest_utxo)?;

        let coinbase_hash = coinbase.hash()?;

        // Stand-in root of the same length as the one the append produces
        let mut header = self.header.clone();
        header.set_coinbase_hash(coinbase_hash.clone());
        header.set_merkle_root(Hash::new(vec![0u8; self.merkle_tree.hasher().digest_len()]));
        let size = header.approximate_size()?
            + coinbase.approximate_size()?
            + self.transactions_size()
            + transaction.approximate_size();
        if size > block_mem_size {
            debug!(size, limit = block_mem_size, "block full by size");
            return Ok(false);
        }

        self.coinbase = coinbase;
        self.merkle_tree.append(&transaction);
        self.header.set_coinbase_hash(coinbase_hash);
        self.header.set_merkle_root(self.merkle_tree.root());
        debug!(transaction = %transaction.hash(), count = self.transactions.len() + 1, "added transaction to block");
        self.transactions.push(transaction);
        Ok(true)
    }

    /// Rebuilds the tree from the transactions and checks it and the coinbase
    /// against the header
    pub fn verify_body(&self) -> bool {
        self.merkle_tree.verify_block_transactions(&self.transactions)
            && self.header.merkle_root() == &self.merkle_tree.root()
            && self.coinbase.hash().map_or(false, |hash| self.header.coinbase_hash() == &hash)
    }

    pub fn into_parts(self) -> (HashedBlockHeader, HashedCoinbase, Vec<HashedTransaction>, T) {
        (self.header, self.coinbase, self.transactions, self.merkle_tree)
    }
}
