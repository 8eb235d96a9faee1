//! # Merkle Tree
//!
//! Binary Merkle tree over ledger transaction hashes, producing and
//! verifying audit proofs used as SPV evidence on the other chain.
//!
//! ## Hashing
//!
//! `H(x)` is SHA-256 rendered as lowercase hex. Leaves are `H(leaf)`; a
//! parent is `H(left.hash ++ right.hash)` over the hex strings, so a remote
//! verifier only needs string concatenation and SHA-256.
//!
//! ## Layout
//!
//! Nodes live in an arena and refer to each other by index. Child links
//! are the only structural edges; `parent` is a lookup index used to walk
//! up from a leaf. An odd layer gets a copy of its last node appended, so
//! every parent has exactly two children and the copy is the last node's
//! sibling.

use crate::domain::RelayError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type NodeId = usize;

/// SHA-256 of `data` as lowercase hex.
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Parent hash of two sibling hashes.
pub fn hash_branches(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// Side on which a sibling lies relative to the ascending node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchDirection {
    /// Sibling is the left child: `H(sibling ++ acc)`.
    Left,
    /// Sibling is the right child: `H(acc ++ sibling)`.
    Right,
}

/// One step of an audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditNode {
    /// Sibling hash.
    pub hash: String,
    /// Sibling side.
    pub direction: BranchDirection,
}

#[derive(Clone, Debug)]
struct MerkleNode {
    hash: String,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Vec<MerkleNode>,
    /// Node ids per layer, leaves first. Odd layers include their copy.
    levels: Vec<Vec<NodeId>>,
    leaf_count: usize,
    root: Option<String>,
}

impl TreeState {
    fn push(&mut self, hash: String, left: Option<NodeId>, right: Option<NodeId>) -> NodeId {
        self.nodes.push(MerkleNode {
            hash,
            left,
            right,
            parent: None,
        });
        self.nodes.len() - 1
    }

    /// The other child of `id`'s parent, compared by index.
    fn sibling(&self, id: NodeId) -> Option<(NodeId, BranchDirection)> {
        let parent = &self.nodes[self.nodes[id].parent?];
        if parent.left == Some(id) {
            parent.right.map(|r| (r, BranchDirection::Right))
        } else {
            parent.left.map(|l| (l, BranchDirection::Left))
        }
    }

    fn find_leaf(&self, leaf_hash: &str) -> Option<NodeId> {
        self.levels
            .first()?
            .iter()
            .copied()
            .find(|&id| self.nodes[id].hash == leaf_hash)
    }

    /// Walk from `leaf` to the root, returning the recomputed root and the
    /// audit trail.
    fn ascend(&self, leaf: NodeId) -> (String, Vec<AuditNode>) {
        let mut acc = self.nodes[leaf].hash.clone();
        let mut trail = Vec::new();
        let mut current = leaf;

        while let Some(parent) = self.nodes[current].parent {
            if let Some((sibling, direction)) = self.sibling(current) {
                let sibling_hash = &self.nodes[sibling].hash;
                acc = match direction {
                    BranchDirection::Left => hash_branches(sibling_hash, &acc),
                    BranchDirection::Right => hash_branches(&acc, sibling_hash),
                };
                trail.push(AuditNode {
                    hash: sibling_hash.clone(),
                    direction,
                });
            }
            current = parent;
        }

        (acc, trail)
    }
}

/// Binary Merkle tree with audit proofs.
///
/// Built once per leaf set; concurrent queries share a read lock and a
/// rebuild takes the write lock.
#[derive(Debug, Default)]
pub struct MerkleTree {
    state: RwLock<TreeState>,
}

impl MerkleTree {
    /// Create an empty tree (no root).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree and return it.
    pub fn from_leaves<S: AsRef<[u8]>>(leaves: &[S]) -> Result<Self, RelayError> {
        let tree = Self::new();
        tree.build_tree(leaves)?;
        Ok(tree)
    }

    /// Build the tree over `leaves`, replacing any previous tree.
    ///
    /// Returns the root hash. An empty leaf list leaves the tree without a
    /// root.
    pub fn build_tree<S: AsRef<[u8]>>(&self, leaves: &[S]) -> Result<String, RelayError> {
        let mut state = self.state.write();
        *state = TreeState::default();

        if leaves.is_empty() {
            return Err(RelayError::EmptyMerkleTree);
        }

        state.leaf_count = leaves.len();
        let mut layer: Vec<NodeId> = leaves
            .iter()
            .map(|leaf| state.push(hash_hex(leaf.as_ref()), None, None))
            .collect();

        loop {
            if layer.len() % 2 != 0 {
                if let Some(&last) = layer.last() {
                    let copy = state.nodes[last].clone();
                    let dup = state.push(copy.hash, copy.left, copy.right);
                    layer.push(dup);
                }
            }

            let mut parents = Vec::with_capacity(layer.len() / 2);
            for pair in layer.chunks_exact(2) {
                let (left, right) = (pair[0], pair[1]);
                let hash = hash_branches(&state.nodes[left].hash, &state.nodes[right].hash);
                let parent = state.push(hash, Some(left), Some(right));
                state.nodes[left].parent = Some(parent);
                state.nodes[right].parent = Some(parent);
                parents.push(parent);
            }

            state.levels.push(layer);
            layer = parents;
            if layer.len() == 1 {
                break;
            }
        }

        let root = state.nodes[layer[0]].hash.clone();
        state.levels.push(layer);
        state.root = Some(root.clone());
        Ok(root)
    }

    /// Root hash, `None` until a non-empty build.
    pub fn root(&self) -> Option<String> {
        self.state.read().root.clone()
    }

    /// Number of leaves passed to the last build.
    pub fn leaf_count(&self) -> usize {
        self.state.read().leaf_count
    }

    /// Number of layers including leaves and root.
    pub fn depth(&self) -> usize {
        self.state.read().levels.len()
    }

    /// Check that `leaf_hash` is a leaf and that its path rehashes to the
    /// stored root.
    pub fn verify_leaf(&self, leaf_hash: &str) -> bool {
        let state = self.state.read();
        let (Some(root), Some(leaf)) = (state.root.as_deref(), state.find_leaf(leaf_hash)) else {
            return false;
        };
        let (recomputed, _) = state.ascend(leaf);
        recomputed == root
    }

    /// Audit trail for `leaf_hash`, empty if the leaf does not verify.
    pub fn audit_proof(&self, leaf_hash: &str) -> Vec<AuditNode> {
        let state = self.state.read();
        let (Some(root), Some(leaf)) = (state.root.as_deref(), state.find_leaf(leaf_hash)) else {
            return Vec::new();
        };
        let (recomputed, trail) = state.ascend(leaf);
        if recomputed != root {
            return Vec::new();
        }
        trail
    }

    /// Replay an audit trail without tree state.
    pub fn verify_audit(root_hash: &str, leaf_hash: &str, audit_trail: &[AuditNode]) -> bool {
        let computed = audit_trail
            .iter()
            .fold(leaf_hash.to_string(), |acc, node| match node.direction {
                BranchDirection::Left => hash_branches(&node.hash, &acc),
                BranchDirection::Right => hash_branches(&acc, &node.hash),
            });
        computed == root_hash
    }
}
