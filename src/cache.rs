//! Lazily cached digest and approximate size of mutable entities
//!
//! Every entity whose digest is expensive and whose state can change adopts
//! [`HashUpdateable`]. The hash and the size live together in one
//! [`CachedDigest`] held by a [`DigestCache`], so a reader can never observe
//! one of them updated without the other.
//!
//! The protocol:
//! 1. A mutation takes `&mut self` and calls [`DigestCache::invalidate`]
//!    before it returns.
//! 2. The first read after that computes the digest once and stores it.
//! 3. Later reads return the stored value until the next mutation.
//!
//! A stored digest remembers the hasher and encoder that produced it. A read
//! under another pair computes a fresh digest and leaves the stored one alone.

use std::borrow::Cow;
use std::sync::OnceLock;

use crate::encoding::Encoders;
use crate::error::Result;
use crate::hash::{Hash, Hasher, Hashers};

/// Hash and approximate serialized size, computed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDigest {
    pub hash: Hash,
    pub size: u64,
    pub hasher: Hashers,
    pub encoder: Encoders,
}

impl CachedDigest {
    pub fn computed_with(&self, hasher: Hashers, encoder: Encoders) -> bool {
        self.hasher == hasher && self.encoder == encoder
    }
}

#[derive(Debug, Clone, Default)]
pub struct DigestCache {
    cell: OnceLock<CachedDigest>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache already holding a digest, e.g. one read back from storage
    pub fn seeded(digest: CachedDigest) -> Self {
        Self { cell: OnceLock::from(digest) }
    }

    pub fn get(&self) -> Option<&CachedDigest> {
        self.cell.get()
    }

    pub fn is_present(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn invalidate(&mut self) {
        self.cell.take();
    }

    /// Returns the stored digest for `hasher` and `encoder`, computing and
    /// storing it first if the cache is empty.
    ///
    /// Concurrent readers racing on an empty cache may both compute, but only
    /// one value is ever stored. A digest stored under another pair is not
    /// replaced; the caller gets a freshly computed one instead.
    fn get_or_compute<F>(&self, hasher: Hashers, encoder: Encoders, compute: F) -> Result<Cow<'_, CachedDigest>>
    where
        F: FnOnce() -> Result<CachedDigest>,
    {
        if let Some(digest) = self.cell.get() {
            if digest.computed_with(hasher, encoder) {
                return Ok(Cow::Borrowed(digest));
            }
            return Ok(Cow::Owned(compute()?));
        }
        let digest = compute()?;
        let stored = self.cell.get_or_init(|| digest.clone());
        if stored.computed_with(hasher, encoder) {
            Ok(Cow::Borrowed(stored))
        } else {
            Ok(Cow::Owned(digest))
        }
    }

    fn store(&mut self, digest: CachedDigest) -> &CachedDigest {
        self.cell = OnceLock::new();
        self.cell.get_or_init(|| digest)
    }
}

/// HashUpdateable: entity × Hasher × Encoder → ℍ × ℕ
///
/// Implementors supply the canonical bytes and access to their cache; the
/// provided methods own the compute/store logic.
pub trait HashUpdateable {
    fn digest_cache(&self) -> &DigestCache;

    fn digest_cache_mut(&mut self) -> &mut DigestCache;

    /// Canonical encoding of the wrapped entity, excluding the cache itself
    fn canonical_bytes(&self, encoder: Encoders) -> Result<Vec<u8>>;

    fn compute_digest(&self, hasher: Hashers, encoder: Encoders) -> Result<CachedDigest> {
        let bytes = self.canonical_bytes(encoder)?;
        let hash = hasher.apply_hash(&bytes);
        let size = (bytes.len() + hash.len()) as u64;
        Ok(CachedDigest { hash, size, hasher, encoder })
    }

    /// Recomputes and stores both cache fields unconditionally
    fn update_hash(&mut self, hasher: Hashers, encoder: Encoders) -> Result<&CachedDigest> {
        let digest = self.compute_digest(hasher, encoder)?;
        Ok(self.digest_cache_mut().store(digest))
    }

    fn recalculate_hash(&mut self, hasher: Hashers, encoder: Encoders) -> Result<Hash> {
        Ok(self.update_hash(hasher, encoder)?.hash.clone())
    }

    fn recalculate_size(&mut self, hasher: Hashers, encoder: Encoders) -> Result<u64> {
        Ok(self.update_hash(hasher, encoder)?.size)
    }

    /// The only read path: cached value if present for this hasher and
    /// encoder, otherwise computed
    fn cached_digest(&self, hasher: Hashers, encoder: Encoders) -> Result<Cow<'_, CachedDigest>> {
        self.digest_cache()
            .get_or_compute(hasher, encoder, || self.compute_digest(hasher, encoder))
    }
}
