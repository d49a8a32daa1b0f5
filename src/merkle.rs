//! Merkle trees over ordered sequences of hashable items
//!
//! Layout: level 0 holds the leaves (the items' own digests), each further
//! level holds `H(left || right)` of consecutive pairs of the level below, and
//! the last level holds the root alone. An unpaired last node is paired with
//! itself. A single leaf is its own root; an empty tree has the empty hash as
//! root.
//!
//! The flattened form (`collapsed_tree`) lists the levels from the leaves up,
//! so the root is its last element; `level_index` holds the offset at which
//! each level starts.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{LedgerError, Result};
use crate::hash::{Hash, Hasher, Hashers, Hashing};

/// Position of a node: level (0 = leaves) and index within the level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Serialize, Deserialize)]
pub struct NodePosition {
    pub level: usize,
    pub index: usize,
}

/// Which side of the running hash a proof sibling sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Hash,
    pub side: Side,
}

/// Sibling path from a leaf to the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub steps: Vec<ProofStep>,
}

/// Node combination: H(left || right)
pub fn combine(hasher: Hashers, left: &Hash, right: &Hash) -> Hash {
    let mut bytes = Vec::with_capacity(left.len() + right.len());
    bytes.extend_from_slice(left.as_bytes());
    bytes.extend_from_slice(right.as_bytes());
    hasher.apply_hash(&bytes)
}

/// Checks that `leaf` hashes up to `root` along `proof`
pub fn verify_proof(hasher: Hashers, leaf: &Hash, proof: &MerkleProof, root: &Hash) -> bool {
    let computed = proof.steps.iter().fold(leaf.clone(), |acc, step| match step.side {
        Side::Left => combine(hasher, &step.sibling, &acc),
        Side::Right => combine(hasher, &acc, &step.sibling),
    });
    &computed == root
}

/// Read access to a Merkle tree
pub trait MerkleTree {
    fn hasher(&self) -> Hashers;

    /// Root digest; the empty hash for an empty tree
    fn root(&self) -> Hash;

    fn leaves(&self) -> &[Hash];

    fn node(&self, position: NodePosition) -> Option<&Hash>;

    fn collapsed_tree(&self) -> Vec<Hash>;

    fn level_index(&self) -> Vec<usize>;

    fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    fn has_transaction(&self, hash: &Hash) -> bool {
        self.leaves().contains(hash)
    }

    fn proof_for(&self, hash: &Hash) -> Option<MerkleProof>;

    /// Rebuilds over `items` and compares the root with this tree's
    fn verify_block_transactions<H: Hashing>(&self, items: &[H]) -> bool {
        MerkleTreeImpl::from_items(self.hasher(), items).root() == self.root()
    }
}

/// Merkle tree that can be rebuilt, restored and appended to
///
/// Mutations report the positions of every node they wrote.
pub trait MutableMerkleTree: MerkleTree {
    fn rebuild<H: Hashing>(&mut self, items: &[H]) -> Vec<NodePosition>;

    /// Rebuild with `primary` (typically the coinbase) as the first leaf
    fn rebuild_with_primary<P: Hashing, H: Hashing>(&mut self, primary: &P, items: &[H]) -> Vec<NodePosition>;

    /// Replace the tree with a persisted `(collapsed_tree, level_index)` pair
    fn restore(&mut self, collapsed_tree: Vec<Hash>, level_index: Vec<usize>) -> Result<Vec<NodePosition>>;

    /// Append one item, rehashing only the path from its leaf to the root
    fn append<H: Hashing>(&mut self, item: &H) -> Vec<NodePosition>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "MerkleTreeRecord", try_from = "MerkleTreeRecord")]
pub struct MerkleTreeImpl {
    hasher: Hashers,
    levels: Vec<Vec<Hash>>,
}

/// Persisted form of a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTreeRecord {
    pub hasher: Hashers,
    pub collapsed_tree: Vec<Hash>,
    pub level_index: Vec<usize>,
}

impl From<MerkleTreeImpl> for MerkleTreeRecord {
    fn from(tree: MerkleTreeImpl) -> Self {
        MerkleTreeRecord {
            hasher: tree.hasher,
            collapsed_tree: tree.collapsed_tree(),
            level_index: tree.level_index(),
        }
    }
}

impl TryFrom<MerkleTreeRecord> for MerkleTreeImpl {
    type Error = LedgerError;

    fn try_from(record: MerkleTreeRecord) -> Result<Self> {
        MerkleTreeImpl::from_collapsed(record.hasher, record.collapsed_tree, record.level_index)
    }
}

impl MerkleTreeImpl {
    pub fn new(hasher: Hashers) -> Self {
        Self { hasher, levels: Vec::new() }
    }

    pub fn from_items<H: Hashing>(hasher: Hashers, items: &[H]) -> Self {
        let mut tree = Self::new(hasher);
        tree.rebuild(items);
        tree
    }

    pub fn from_collapsed(hasher: Hashers, collapsed_tree: Vec<Hash>, level_index: Vec<usize>) -> Result<Self> {
        let mut tree = Self::new(hasher);
        tree.restore(collapsed_tree, level_index)?;
        Ok(tree)
    }

    pub fn height(&self) -> usize {
        self.levels.len()
    }

    fn build_from_leaves(&mut self, leaves: Vec<Hash>) -> Vec<NodePosition> {
        self.levels.clear();
        if leaves.is_empty() {
            debug!("cleared merkle tree");
            return Vec::new();
        }
        let leaf_count = leaves.len();
        self.levels.push(leaves);

        // Build bottom-up, duplicating the last node of odd levels
        while self.levels.last().map_or(false, |level| level.len() > 1) {
            let below = &self.levels[self.levels.len() - 1];
            let next: Vec<Hash> = below
                .chunks(2)
                .map(|pair| combine(self.hasher, &pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            self.levels.push(next);
        }
        debug!(leaves = leaf_count, height = self.levels.len(), "rebuilt merkle tree");
        self.all_positions()
    }

    fn all_positions(&self) -> Vec<NodePosition> {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, nodes)| (0..nodes.len()).map(move |index| NodePosition { level, index }))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        for (level, window) in self.levels.windows(2).enumerate() {
            let (below, above) = (&window[0], &window[1]);
            if above.len() != (below.len() + 1) / 2 {
                return Err(LedgerError::MalformedTree(format!(
                    "level {} has {} nodes, expected {}",
                    level + 1,
                    above.len(),
                    (below.len() + 1) / 2
                )));
            }
            for (index, pair) in below.chunks(2).enumerate() {
                let expected = combine(self.hasher, &pair[0], pair.get(1).unwrap_or(&pair[0]));
                if above[index] != expected {
                    return Err(LedgerError::MalformedTree(format!(
                        "node {} at level {} does not match its children",
                        index,
                        level + 1
                    )));
                }
            }
        }
        match self.levels.last() {
            Some(top) if top.len() != 1 => Err(LedgerError::MalformedTree(format!(
                "top level has {} nodes",
                top.len()
            ))),
            _ => Ok(()),
        }
    }
}

impl MerkleTree for MerkleTreeImpl {
    fn hasher(&self) -> Hashers {
        self.hasher
    }

    fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|top| top.first())
            .cloned()
            .unwrap_or_else(Hash::empty)
    }

    fn leaves(&self) -> &[Hash] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    fn node(&self, position: NodePosition) -> Option<&Hash> {
        self.levels.get(position.level)?.get(position.index)
    }

    fn collapsed_tree(&self) -> Vec<Hash> {
        self.levels.iter().flatten().cloned().collect()
    }

    fn level_index(&self) -> Vec<usize> {
        self.levels
            .iter()
            .scan(0, |offset, level| {
                let start = *offset;
                *offset += level.len();
                Some(start)
            })
            .collect()
    }

    fn proof_for(&self, hash: &Hash) -> Option<MerkleProof> {
        let leaf_index = self.leaves().iter().position(|leaf| leaf == hash)?;
        let mut index = leaf_index;
        let mut steps = Vec::with_capacity(self.levels.len());
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if index % 2 == 0 {
                ProofStep { sibling: level.get(index + 1).unwrap_or(&level[index]).clone(), side: Side::Right }
            } else {
                ProofStep { sibling: level[index - 1].clone(), side: Side::Left }
            };
            steps.push(step);
            index /= 2;
        }
        Some(MerkleProof { leaf_index, steps })
    }
}

impl MutableMerkleTree for MerkleTreeImpl {
    fn rebuild<H: Hashing>(&mut self, items: &[H]) -> Vec<NodePosition> {
        let leaves = items.iter().map(|item| item.hash().clone()).collect();
        self.build_from_leaves(leaves)
    }

    fn rebuild_with_primary<P: Hashing, H: Hashing>(&mut self, primary: &P, items: &[H]) -> Vec<NodePosition> {
        let leaves = std::iter::once(primary.hash().clone())
            .chain(items.iter().map(|item| item.hash().clone()))
            .collect();
        self.build_from_leaves(leaves)
    }

    fn restore(&mut self, collapsed_tree: Vec<Hash>, level_index: Vec<usize>) -> Result<Vec<NodePosition>> {
        if level_index.is_empty() {
            if !collapsed_tree.is_empty() {
                return Err(LedgerError::MalformedTree("nodes without level index".to_string()));
            }
            self.levels.clear();
            return Ok(Vec::new());
        }
        if level_index[0] != 0 {
            return Err(LedgerError::MalformedTree("first level must start at 0".to_string()));
        }

        let mut levels = Vec::with_capacity(level_index.len());
        for (i, &start) in level_index.iter().enumerate() {
            let end = level_index.get(i + 1).copied().unwrap_or(collapsed_tree.len());
            if start >= end || end > collapsed_tree.len() {
                return Err(LedgerError::MalformedTree(format!(
                    "invalid bounds {}..{} for level {}",
                    start, end, i
                )));
            }
            levels.push(collapsed_tree[start..end].to_vec());
        }

        let restored = MerkleTreeImpl { hasher: self.hasher, levels };
        restored.validate()?;
        self.levels = restored.levels;
        debug!(leaves = self.leaf_count(), "restored merkle tree");
        Ok(self.all_positions())
    }

    fn append<H: Hashing>(&mut self, item: &H) -> Vec<NodePosition> {
        let leaf = item.hash().clone();
        if self.levels.is_empty() {
            self.levels.push(vec![leaf]);
            return vec![NodePosition { level: 0, index: 0 }];
        }

        self.levels[0].push(leaf);
        let mut index = self.levels[0].len() - 1;
        let mut changed = vec![NodePosition { level: 0, index }];
        let mut level = 0;

        // Walk up while the current level still has more than one node
        while self.levels[level].len() > 1 {
            let parent = index / 2;
            let nodes = &self.levels[level];
            let left = &nodes[2 * parent];
            let right = nodes.get(2 * parent + 1).unwrap_or(left);
            let hash = combine(self.hasher, left, right);

            if self.levels.len() == level + 1 {
                self.levels.push(Vec::new());
            }
            let above = &mut self.levels[level + 1];
            if parent < above.len() {
                above[parent] = hash;
            } else {
                above.push(hash);
            }
            changed.push(NodePosition { level: level + 1, index: parent });
            index = parent;
            level += 1;
        }
        trace!(leaves = self.leaf_count(), changed = changed.len(), "appended merkle leaf");
        changed
    }
}
