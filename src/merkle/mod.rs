//! Merkle inclusion proofs: path types, root recomputation and tree helpers.
//!
//! A leaf identifier is hashed once with double-SHA256 to form the leaf node.
//! Each path step then combines the running node with a sibling:
//!
//! ```text
//! sibling on the right: H(current || sibling)
//! sibling on the left:  H(sibling || current)
//! ```
//!
//! Verification is a plain replay of the supplied steps. When a tree level has
//! an odd number of nodes the last node pairs with itself, and a path through
//! it must carry that duplicate as an explicit step.
use bitcoin::{
    hashes::{sha256d, Hash},
    TxMerkleNode,
};
use serde::{Deserialize, Serialize};

/// Binary and JSON wire forms of [`MerklePath`].
pub mod wire;

/// Which side of the running node a sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is the left child; the running node is the right child.
    Left,
    /// Sibling is the right child; the running node is the left child.
    Right,
}

/// One level of a merkle path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MerkleStep {
    /// Sibling node at this level.
    pub sibling: TxMerkleNode,
    /// Where the sibling sits.
    pub side: Side,
}

impl MerkleStep {
    /// Sibling on the left of the running node.
    pub const fn left(sibling: TxMerkleNode) -> Self {
        Self {
            sibling,
            side: Side::Left,
        }
    }

    /// Sibling on the right of the running node.
    pub const fn right(sibling: TxMerkleNode) -> Self {
        Self {
            sibling,
            side: Side::Right,
        }
    }

    /// `true` when the sibling is the right child.
    pub fn is_right_sibling(&self) -> bool {
        self.side == Side::Right
    }
}

/// Ordered sibling steps from a leaf up to the root, plus the leaf position
/// and the block height the proof claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "wire::JsonPath", try_from = "wire::JsonPath")]
pub struct MerklePath {
    /// Height of the block the leaf is claimed to be in.
    pub block_height: u32,
    /// Position of the leaf in the bottom level.
    pub index: u64,
    /// Steps ordered leaf to root.
    pub steps: Vec<MerkleStep>,
}

impl MerklePath {
    /// Assemble a path from its parts.
    pub fn new(block_height: u32, index: u64, steps: Vec<MerkleStep>) -> Self {
        Self {
            block_height,
            index,
            steps,
        }
    }

    /// Number of steps (tree depth).
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `true` for a single-leaf tree.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Build the path for `leaf_ids[index]`, duplicating the last node of odd levels.
    ///
    /// Returns `None` if `index` is out of range.
    pub fn from_leaves<L: AsRef<[u8]>>(
        leaf_ids: &[L],
        index: usize,
        block_height: u32,
    ) -> Option<Self> {
        if index >= leaf_ids.len() {
            return None;
        }
        let mut level: Vec<TxMerkleNode> = leaf_ids.iter().map(|l| leaf_hash(l.as_ref())).collect();
        let mut pos = index;
        let mut steps = Vec::new();
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                level.push(level[level.len() - 1]);
            }
            let sibling = level[pos ^ 1];
            steps.push(if pos % 2 == 0 {
                MerkleStep::right(sibling)
            } else {
                MerkleStep::left(sibling)
            });
            level = next_level(&level);
            pos /= 2;
        }
        Some(Self::new(block_height, index as u64, steps))
    }

    /// Root obtained by replaying this path from `leaf_id`.
    pub fn compute_root(&self, leaf_id: &[u8]) -> TxMerkleNode {
        compute_root(leaf_id, self)
    }
}

/// Leaf node for a raw identifier: double-SHA256 of its bytes.
pub fn leaf_hash(leaf_id: &[u8]) -> TxMerkleNode {
    TxMerkleNode::from_raw_hash(sha256d::Hash::hash(leaf_id))
}

/// Interior node over two children.
pub fn parent(left: &TxMerkleNode, right: &TxMerkleNode) -> TxMerkleNode {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_byte_array());
    buf[32..].copy_from_slice(right.as_byte_array());
    TxMerkleNode::from_raw_hash(sha256d::Hash::hash(&buf))
}

/// Replay `path` from `leaf_id`. An empty path yields the leaf hash itself.
pub fn compute_root(leaf_id: &[u8], path: &MerklePath) -> TxMerkleNode {
    path.steps
        .iter()
        .fold(leaf_hash(leaf_id), |current, step| match step.side {
            Side::Right => parent(&current, &step.sibling),
            Side::Left => parent(&step.sibling, &current),
        })
}

/// Whether `path` proves `leaf_id` under `expected_root`.
pub fn verify(leaf_id: &[u8], path: &MerklePath, expected_root: &TxMerkleNode) -> bool {
    compute_root(leaf_id, path) == *expected_root
}

/// Root of the tree over `leaf_ids`. `None` for an empty list.
pub fn merkle_root<L: AsRef<[u8]>>(leaf_ids: &[L]) -> Option<TxMerkleNode> {
    let mut level: Vec<TxMerkleNode> = leaf_ids.iter().map(|l| leaf_hash(l.as_ref())).collect();
    if level.is_empty() {
        return None;
    }
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1]);
        }
        level = next_level(&level);
    }
    Some(level[0])
}

// Input has even length.
fn next_level(level: &[TxMerkleNode]) -> Vec<TxMerkleNode> {
    level.chunks(2).map(|pair| parent(&pair[0], &pair[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAVES: [&[u8]; 4] = [b"A", b"B", b"C", b"D"];

    #[test]
    fn empty_path_returns_leaf_hash() {
        let path = MerklePath::new(7, 0, vec![]);
        assert_eq!(compute_root(b"lonely", &path), leaf_hash(b"lonely"));
        assert_eq!(
            compute_root(b"lonely", &path).to_byte_array(),
            sha256d::Hash::hash(b"lonely").to_byte_array()
        );
    }

    #[test]
    fn four_leaf_proof_for_b() {
        let (a, b, c, d) = (leaf_hash(b"A"), leaf_hash(b"B"), leaf_hash(b"C"), leaf_hash(b"D"));
        let root = parent(&parent(&a, &b), &parent(&c, &d));
        assert_eq!(merkle_root(&LEAVES), Some(root));

        let path = MerklePath::new(1, 1, vec![MerkleStep::left(a), MerkleStep::right(parent(&c, &d))]);
        assert!(verify(b"B", &path, &root));
        assert_eq!(MerklePath::from_leaves(&LEAVES, 1, 1), Some(path.clone()));

        let mut raw = a.to_byte_array();
        raw[0] ^= 0x01;
        let mut bad = path;
        bad.steps[0].sibling = TxMerkleNode::from_byte_array(raw);
        assert!(!verify(b"B", &bad, &root));
    }

    #[test]
    fn wrong_leaf_or_side_fails() {
        let root = merkle_root(&LEAVES).unwrap();
        let path = MerklePath::from_leaves(&LEAVES, 2, 0).unwrap();
        assert!(verify(b"C", &path, &root));
        assert!(!verify(b"D", &path, &root));

        let mut flipped = path;
        flipped.steps[0].side = Side::Left;
        assert!(!verify(b"C", &flipped, &root));
    }

    #[test]
    fn odd_level_duplicate_is_an_explicit_step() {
        let leaves: [&[u8]; 3] = [b"x", b"y", b"z"];
        let root = merkle_root(&leaves).unwrap();
        let z = leaf_hash(b"z");
        let path = MerklePath::from_leaves(&leaves, 2, 0).unwrap();
        assert_eq!(path.steps[0], MerkleStep::right(z));
        assert!(verify(b"z", &path, &root));

        // Dropping the duplicate step does not reach the root.
        let mut short = path.clone();
        short.steps.remove(0);
        assert!(!verify(b"z", &short, &root));
    }

    #[test]
    fn every_leaf_proves_for_many_sizes() {
        for n in 1..=9usize {
            let ids: Vec<Vec<u8>> = (0..n).map(|i| vec![i as u8; 5]).collect();
            let root = merkle_root(&ids).unwrap();
            for (i, id) in ids.iter().enumerate() {
                let path = MerklePath::from_leaves(&ids, i, 0).unwrap();
                assert!(verify(id, &path, &root), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn matches_bitcoin_merkle_tree_over_leaf_hashes() {
        let ids: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 3]).collect();
        let hashes = ids.iter().map(|id| leaf_hash(id));
        let theirs = bitcoin::merkle_tree::calculate_root(hashes).unwrap();
        assert_eq!(merkle_root(&ids), Some(theirs));
    }

    #[test]
    fn from_leaves_rejects_out_of_range() {
        assert!(MerklePath::from_leaves(&LEAVES, 4, 0).is_none());
        let none: [&[u8]; 0] = [];
        assert!(MerklePath::from_leaves(&none, 0, 0).is_none());
        assert!(merkle_root(&none).is_none());
    }
}
