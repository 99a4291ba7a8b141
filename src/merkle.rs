// Copyright (c) 2024, The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::prelude::*;
use subtle::ConstantTimeEq;

use crate::{
    codec::{CodecError, Sink, Source},
    Hash,
};

// Smallest encoding of a node: one-byte layer, one-byte index, and an empty hash
const MIN_NODE_BYTES: usize = 3;

/// Errors that can arise relating to merkle trees and paths.
#[derive(Debug, Snafu)]
pub enum MerkleError {
    /// A tree needs at least one leaf.
    #[snafu(display("Cannot build a merkle tree without leaves"))]
    EmptyTree,
    /// A leaf index was outside the tree.
    #[snafu(display("Leaf {index} is outside a tree of {leaf_count} leaves"))]
    IndexOutOfRange {
        /// The requested leaf index.
        index: u64,
        /// The number of leaves in the tree.
        leaf_count: u64,
    },
    /// A path did not lead from the data to the root.
    #[snafu(display("Merkle path mismatch: {reason}"))]
    MerkleMismatch {
        /// Which check failed.
        reason: &'static str,
    },
}

/// A node of a merkle tree.
///
/// Leaves are at layer zero. The index of a node is its position within its layer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MerkleNode {
    /// Layer of the node, counted from the leaves.
    pub layer: u64,
    /// Position of the node within its layer.
    pub index: u64,
    /// Hash of the node.
    pub hash: Hash,
}

impl MerkleNode {
    /// Create the leaf at `index` for `data`.
    pub fn leaf(index: u64, data: &[u8]) -> Self {
        Self {
            layer: 0,
            index,
            hash: Sha256::digest(data).into(),
        }
    }

    /// Create the parent of a `left` and `right` sibling pair.
    ///
    /// The parent hash covers the full encoding of both children, so the layer and index of each child are bound into
    /// it along with its hash.
    pub fn parent(left: &MerkleNode, right: &MerkleNode) -> Self {
        let mut sink = Sink::new();
        left.encode(&mut sink);
        right.encode(&mut sink);

        Self {
            layer: left.layer + 1,
            index: left.index / 2,
            hash: Sha256::digest(sink.as_bytes()).into(),
        }
    }

    /// Encode as `varUint(layer) ‖ varUint(index) ‖ varBytes(hash)`.
    pub fn encode(&self, sink: &mut Sink) {
        sink.write_var_uint(self.layer);
        sink.write_var_uint(self.index);
        sink.write_var_bytes(&self.hash);
    }

    /// Decode a node, requiring a 32-byte hash.
    pub fn decode(source: &mut Source<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            layer: source.read_var_uint()?,
            index: source.read_var_uint()?,
            hash: source.read_var_array()?,
        })
    }
}

/// A merkle path from a leaf to the root.
///
/// The first node is the leaf, each following node but the last is the sibling at the next layer up, and the last node
/// is the root. A path in a tree of one leaf is that leaf followed by itself as the root.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MerklePath {
    nodes: Vec<MerkleNode>,
}

impl MerklePath {
    /// Create a [`MerklePath`] from its nodes.
    pub fn new(nodes: Vec<MerkleNode>) -> Self {
        Self { nodes }
    }

    /// Get the nodes of this [`MerklePath`].
    pub fn get_nodes(&self) -> &[MerkleNode] {
        &self.nodes
    }

    /// Get the number of nodes in this [`MerklePath`].
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if this [`MerklePath`] has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Encode as `varUint(len)` followed by each node.
    pub fn encode(&self, sink: &mut Sink) {
        sink.write_var_uint(self.nodes.len() as u64);
        for node in &self.nodes {
            node.encode(sink);
        }
    }

    /// Decode a path.
    pub fn decode(source: &mut Source<'_>) -> Result<Self, CodecError> {
        let len = source.read_count(MIN_NODE_BYTES)?;
        let nodes = (0..len)
            .map(|_| MerkleNode::decode(source))
            .collect::<Result<Vec<MerkleNode>, CodecError>>()?;

        Ok(Self { nodes })
    }

    /// Serialize a [`MerklePath`] to a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        self.encode(&mut sink);
        sink.into_bytes()
    }

    /// Deserialize a [`MerklePath`] from a byte slice holding exactly one path.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut source = Source::new(bytes);
        let path = Self::decode(&mut source)?;
        source.finish()?;

        Ok(path)
    }
}

impl From<Vec<MerkleNode>> for MerklePath {
    fn from(nodes: Vec<MerkleNode>) -> Self {
        Self::new(nodes)
    }
}

/// A merkle tree over a sequence of data items.
///
/// Each layer is stored in full. When a layer has an odd number of nodes, its last node is duplicated into the layer
/// itself before pairing, with the copy taking the next index, so paths see the copy as an ordinary sibling.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MerkleTree {
    layers: Vec<Vec<MerkleNode>>,
    leaf_count: u64,
    root: MerkleNode,
}

impl MerkleTree {
    /// Build a [`MerkleTree`] whose leaves are the `SHA-256` hashes of `items`.
    ///
    /// If there are no items, returns a [`MerkleError`].
    pub fn new<T: AsRef<[u8]>>(items: &[T]) -> Result<Self, MerkleError> {
        let leaves = items
            .iter()
            .enumerate()
            .map(|(index, item)| MerkleNode::leaf(index as u64, item.as_ref()))
            .collect::<Vec<MerkleNode>>();

        let mut layers = Vec::new();
        let mut current = leaves;
        while current.len() > 1 {
            if current.len() % 2 == 1 {
                if let Some(last) = current.last() {
                    let mut duplicate = last.clone();
                    duplicate.index += 1;
                    current.push(duplicate);
                }
            }

            let next = current
                .chunks_exact(2)
                .map(|pair| MerkleNode::parent(&pair[0], &pair[1]))
                .collect::<Vec<MerkleNode>>();
            layers.push(current);
            current = next;
        }

        let root = current.first().cloned().ok_or(MerkleError::EmptyTree)?;
        layers.push(current);

        Ok(Self {
            layers,
            leaf_count: items.len() as u64,
            root,
        })
    }

    /// Get the number of leaves, not counting a duplicated last leaf.
    pub fn get_leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// Get the number of layers, including the leaves and the root.
    pub fn get_layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Get the root node.
    pub fn get_root(&self) -> &MerkleNode {
        &self.root
    }

    /// Get the root hash.
    pub fn get_root_hash(&self) -> Hash {
        self.root.hash
    }

    /// Get the leaf at `index`.
    pub fn get_leaf(&self, index: u64) -> Result<&MerkleNode, MerkleError> {
        self.layers
            .first()
            .filter(|_| index < self.leaf_count)
            .and_then(|leaves| leaves.get(usize::try_from(index).ok()?))
            .ok_or(MerkleError::IndexOutOfRange {
                index,
                leaf_count: self.leaf_count,
            })
    }

    /// Get the [`MerklePath`] of the leaf at `index`.
    pub fn get_path(&self, index: u64) -> Result<MerklePath, MerkleError> {
        let mut nodes = Vec::with_capacity(self.layers.len() + 1);
        nodes.push(self.get_leaf(index)?.clone());

        let mut position = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = usize::try_from(position ^ 1)
                .ok()
                .and_then(|sibling| layer.get(sibling))
                .ok_or(MerkleError::IndexOutOfRange {
                    index,
                    leaf_count: self.leaf_count,
                })?;
            nodes.push(sibling.clone());
            position /= 2;
        }
        nodes.push(self.root.clone());

        Ok(MerklePath::new(nodes))
    }
}

fn hashes_equal(left: &Hash, right: &Hash) -> bool {
    bool::from(left[..].ct_eq(&right[..]))
}

/// Verify that `path` shows `data` at leaf `index` of the tree with root hash `root_hash`.
///
/// If any check fails, returns a [`MerkleError`].
pub fn verify_merkle_path(path: &MerklePath, index: u64, data: &[u8], root_hash: &Hash) -> Result<(), MerkleError> {
    let (leaf, rest) = path.get_nodes().split_first().ok_or(MerkleError::MerkleMismatch {
        reason: "path is empty",
    })?;
    let (root, siblings) = rest.split_last().ok_or(MerkleError::MerkleMismatch {
        reason: "path has no root",
    })?;

    ensure!(hashes_equal(&root.hash, root_hash), MerkleMismatchSnafu {
        reason: "path root does not match the root hash",
    });
    ensure!(leaf.index == index, MerkleMismatchSnafu {
        reason: "leaf index does not match",
    });
    ensure!(hashes_equal(&leaf.hash, &Sha256::digest(data).into()), MerkleMismatchSnafu {
        reason: "leaf hash does not match the data",
    });

    let node = siblings.iter().fold(leaf.clone(), |node, sibling| {
        if node.index % 2 == 0 {
            MerkleNode::parent(&node, sibling)
        } else {
            MerkleNode::parent(sibling, &node)
        }
    });
    ensure!(hashes_equal(&node.hash, root_hash), MerkleMismatchSnafu {
        reason: "computed root does not match the root hash",
    });

    Ok(())
}
