//! Storage-aware Merkle trees and tree factories
//!
//! [`StorageAwareMerkleTree`] behaves exactly like the tree it wraps and
//! additionally remembers which nodes each mutation wrote, so a storage layer
//! can persist only those nodes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use crate::hash::{Hash, Hashers, Hashing};
use crate::merkle::{MerkleProof, MerkleTree, MerkleTreeImpl, MutableMerkleTree, NodePosition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageAwareMerkleTree<T = MerkleTreeImpl> {
    tree: T,
    #[serde(skip)]
    dirty: BTreeSet<NodePosition>,
    #[serde(skip)]
    replaced: bool,
}

impl<T: MutableMerkleTree> StorageAwareMerkleTree<T> {
    /// Wraps `tree`; nothing is dirty yet
    pub fn new(tree: T) -> Self {
        Self { tree, dirty: BTreeSet::new(), replaced: false }
    }

    pub fn inner(&self) -> &T {
        &self.tree
    }

    pub fn into_inner(self) -> T {
        self.tree
    }

    /// Nodes written since the last [`take_dirty`](Self::take_dirty)
    pub fn dirty_nodes(&self) -> &BTreeSet<NodePosition> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.replaced || !self.dirty.is_empty()
    }

    /// Whether a rebuild or restore replaced the whole tree, so stored nodes
    /// beyond the current ones must be dropped too
    pub fn was_replaced(&self) -> bool {
        self.replaced
    }

    /// Offsets of the dirty nodes in the collapsed tree
    pub fn dirty_offsets(&self) -> Vec<usize> {
        let level_index = self.tree.level_index();
        self.dirty
            .iter()
            .filter_map(|pos| level_index.get(pos.level).map(|start| start + pos.index))
            .collect()
    }

    /// Returns and clears the dirty set once the caller has persisted it
    pub fn take_dirty(&mut self) -> BTreeSet<NodePosition> {
        self.replaced = false;
        std::mem::take(&mut self.dirty)
    }

    fn record(&mut self, positions: Vec<NodePosition>) -> Vec<NodePosition> {
        self.dirty.extend(positions.iter().copied());
        positions
    }

    fn record_replacement(&mut self, positions: Vec<NodePosition>) -> Vec<NodePosition> {
        self.dirty.clear();
        self.replaced = true;
        debug!(nodes = positions.len(), "merkle tree replaced, marking all nodes dirty");
        self.record(positions)
    }
}

impl<T: MutableMerkleTree> MerkleTree for StorageAwareMerkleTree<T> {
    fn hasher(&self) -> Hashers {
        self.tree.hasher()
    }

    fn root(&self) -> Hash {
        self.tree.root()
    }

    fn leaves(&self) -> &[Hash] {
        self.tree.leaves()
    }

    fn node(&self, position: NodePosition) -> Option<&Hash> {
        self.tree.node(position)
    }

    fn collapsed_tree(&self) -> Vec<Hash> {
        self.tree.collapsed_tree()
    }

    fn level_index(&self) -> Vec<usize> {
        self.tree.level_index()
    }

    fn has_transaction(&self, hash: &Hash) -> bool {
        self.tree.has_transaction(hash)
    }

    fn proof_for(&self, hash: &Hash) -> Option<MerkleProof> {
        self.tree.proof_for(hash)
    }

    fn verify_block_transactions<H: Hashing>(&self, items: &[H]) -> bool {
        self.tree.verify_block_transactions(items)
    }
}

impl<T: MutableMerkleTree> MutableMerkleTree for StorageAwareMerkleTree<T> {
    fn rebuild<H: Hashing>(&mut self, items: &[H]) -> Vec<NodePosition> {
        let positions = self.tree.rebuild(items);
        self.record_replacement(positions)
    }

    fn rebuild_with_primary<P: Hashing, H: Hashing>(&mut self, primary: &P, items: &[H]) -> Vec<NodePosition> {
        let positions = self.tree.rebuild_with_primary(primary, items);
        self.record_replacement(positions)
    }

    fn restore(&mut self, collapsed_tree: Vec<Hash>, level_index: Vec<usize>) -> Result<Vec<NodePosition>> {
        let positions = self.tree.restore(collapsed_tree, level_index)?;
        Ok(self.record_replacement(positions))
    }

    fn append<H: Hashing>(&mut self, item: &H) -> Vec<NodePosition> {
        let positions = self.tree.append(item);
        trace!(changed = positions.len(), "recorded dirty merkle path");
        self.record(positions)
    }
}

/// Creates trees of one concrete kind
pub trait MerkleTreeFactory {
    type Tree: MutableMerkleTree;

    fn create_empty(&self, hasher: Hashers) -> Self::Tree;

    fn create<H: Hashing>(&self, hasher: Hashers, items: &[H]) -> Self::Tree {
        let mut tree = self.create_empty(hasher);
        tree.rebuild(items);
        tree
    }

    fn create_with_primary<P: Hashing, H: Hashing>(&self, hasher: Hashers, primary: &P, items: &[H]) -> Self::Tree {
        let mut tree = self.create_empty(hasher);
        tree.rebuild_with_primary(primary, items);
        tree
    }

    fn restore(&self, hasher: Hashers, collapsed_tree: Vec<Hash>, level_index: Vec<usize>) -> Result<Self::Tree> {
        let mut tree = self.create_empty(hasher);
        tree.restore(collapsed_tree, level_index)?;
        Ok(tree)
    }

    /// Copies the nodes of any existing tree
    fn create_from<M: MerkleTree>(&self, other: &M) -> Result<Self::Tree> {
        self.restore(other.hasher(), other.collapsed_tree(), other.level_index())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleTreeFactoryImpl;

impl MerkleTreeFactory for MerkleTreeFactoryImpl {
    type Tree = MerkleTreeImpl;

    fn create_empty(&self, hasher: Hashers) -> MerkleTreeImpl {
        MerkleTreeImpl::new(hasher)
    }
}

/// Wraps every tree built by `F` in a [`StorageAwareMerkleTree`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageAwareMerkleTreeFactory<F = MerkleTreeFactoryImpl> {
    inner: F,
}

impl<F: MerkleTreeFactory> StorageAwareMerkleTreeFactory<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: MerkleTreeFactory> MerkleTreeFactory for StorageAwareMerkleTreeFactory<F> {
    type Tree = StorageAwareMerkleTree<F::Tree>;

    fn create_empty(&self, hasher: Hashers) -> Self::Tree {
        StorageAwareMerkleTree::new(self.inner.create_empty(hasher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hasher;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| Hashers::Sha256.apply_hash(format!("tx-{}", i).as_bytes())).collect()
    }

    #[test]
    fn test_forwards_everything() {
        let l = leaves(5);
        let plain = MerkleTreeImpl::from_items(Hashers::Sha256, &l);
        let aware = StorageAwareMerkleTreeFactory::<MerkleTreeFactoryImpl>::default().create(Hashers::Sha256, &l);
        assert_eq!(aware.root(), plain.root());
        assert_eq!(aware.collapsed_tree(), plain.collapsed_tree());
        assert_eq!(aware.level_index(), plain.level_index());
        assert_eq!(aware.proof_for(&l[2]), plain.proof_for(&l[2]));
        assert!(aware.verify_block_transactions(&l));
    }

    #[test]
    fn test_append_marks_path_only() {
        let l = leaves(4);
        let mut aware = StorageAwareMerkleTree::new(MerkleTreeImpl::from_items(Hashers::Sha256, &l[..3]));
        assert!(!aware.is_dirty());

        aware.append(&l[3]);
        let expected: BTreeSet<_> = [(0, 3), (1, 1), (2, 0)]
            .into_iter()
            .map(|(level, index)| NodePosition { level, index })
            .collect();
        assert_eq!(aware.dirty_nodes(), &expected);
        assert!(!aware.was_replaced());
        assert_eq!(aware.dirty_offsets(), vec![3, 5, 6]);
        assert_eq!(aware.root(), MerkleTreeImpl::from_items(Hashers::Sha256, &l).root());
    }

    #[test]
    fn test_rebuild_marks_everything() {
        let l = leaves(3);
        let mut aware = StorageAwareMerkleTree::new(MerkleTreeImpl::new(Hashers::Sha256));
        aware.rebuild(&l);
        assert!(aware.was_replaced());
        assert_eq!(aware.dirty_nodes().len(), aware.collapsed_tree().len());

        let taken = aware.take_dirty();
        assert_eq!(taken.len(), 6);
        assert!(!aware.is_dirty());
    }

    #[test]
    fn test_failed_restore_leaves_state() {
        let mut aware = StorageAwareMerkleTree::new(MerkleTreeImpl::from_items(Hashers::Sha256, &leaves(2)));
        let root = aware.root();
        assert!(aware.restore(leaves(3), vec![0, 2]).is_err());
        assert_eq!(aware.root(), root);
        assert!(!aware.is_dirty());
    }

    #[test]
    fn test_factory_restore() {
        let tree = MerkleTreeImpl::from_items(Hashers::Sha3_512, &leaves(6));
        let restored = MerkleTreeFactoryImpl
            .restore(Hashers::Sha3_512, tree.collapsed_tree(), tree.level_index())
            .unwrap();
        assert_eq!(restored, tree);

        let aware = StorageAwareMerkleTreeFactory::new(MerkleTreeFactoryImpl).create_from(&tree).unwrap();
        assert_eq!(aware.inner(), &tree);
        assert!(aware.was_replaced());
    }
}
