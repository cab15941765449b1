//! # Merkle Builder
//!
//! Builds a deterministic hash tree over a sequence of leaves.
//! The shape is independent of the sort tree's own internal layout — only
//! the left-to-right order of leaf names matters, so the same sorted leaf
//! sequence always produces the same Merkle tree and root hash regardless of
//! how the sort tree that produced it was balanced.
//!
//! Construction uses the same "binary counter" technique as streaming Merkle
//! logs (each new leaf can immediately carry-merge with any equal-sized run
//! already on the stack): a stack of perfect subtrees tagged with their leaf
//! count, processed one leaf at a time, with same-size tops merged eagerly.
//! What's easy to get backwards is the final fold once input runs out and
//! more than one partial subtree remains on the stack — folding in the wrong
//! direction silently reorders the tail leaves. The fold here walks the
//! stack from its last (smallest, most-recently-pushed) entry back toward
//! its first (largest, earliest) entry, each step making the earlier entry
//! the left child and the running node the right child, which is the only
//! direction that reproduces the original left-to-right leaf order.

use sha2::{Digest, Sha256};

use crate::sort_tree::{HashedItem, Hash32};

#[derive(Debug, Clone)]
pub enum MerkleNode {
    Leaf { name: String, hash: Hash32 },
    Internal { left: Box<MerkleNode>, right: Box<MerkleNode>, hash: Hash32 },
}

impl MerkleNode {
    pub fn hash(&self) -> &Hash32 {
        match self {
            MerkleNode::Leaf { hash, .. } => hash,
            MerkleNode::Internal { hash, .. } => hash,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, MerkleNode::Leaf { .. })
    }

    fn leaf(item: &HashedItem) -> Self {
        MerkleNode::Leaf { name: item.name.clone(), hash: item.content_hash }
    }
}

/// `SHA256(left_hash || right_hash)`.
pub fn combine(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn make_internal(left: MerkleNode, right: MerkleNode) -> MerkleNode {
    let hash = combine(left.hash(), right.hash());
    MerkleNode::Internal { left: Box::new(left), right: Box::new(right), hash }
}

/// Builds a Merkle tree over `leaves` in the given order. Returns `None` for
/// an empty slice — an empty index has no root hash.
pub fn build(leaves: &[HashedItem]) -> Option<MerkleNode> {
    if leaves.is_empty() {
        return None;
    }

    let mut stack: Vec<(MerkleNode, usize)> = Vec::new();
    for item in leaves {
        let mut node = (MerkleNode::leaf(item), 1usize);
        while let Some(&(_, top_size)) = stack.last() {
            if top_size == node.1 {
                let (top_node, top_size) = stack.pop().expect("just peeked");
                node = (make_internal(top_node, node.0), top_size * 2);
            } else {
                break;
            }
        }
        stack.push(node);
    }

    let mut iter = stack.into_iter();
    let (mut result, _) = iter.next_back().expect("leaves is non-empty");
    let remaining: Vec<(MerkleNode, usize)> = iter.collect();
    for (node, _) in remaining.into_iter().rev() {
        result = make_internal(node, result);
    }
    Some(result)
}

/// Convenience wrapper over [`build`] for callers holding a [`HashedItem`]
/// slice already sorted by name (as `SortTree::leaves_in_order` returns).
pub fn build_from_sorted_leaves(leaves: &[&HashedItem]) -> Option<MerkleNode> {
    let owned: Vec<HashedItem> = leaves.iter().map(|item| (*item).clone()).collect();
    build(&owned)
}

/// Left-to-right iterator over the leaf names of a Merkle (sub)tree.
pub struct LeafNames<'a> {
    stack: Vec<&'a MerkleNode>,
}

impl<'a> LeafNames<'a> {
    pub fn new(root: &'a MerkleNode) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for LeafNames<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.stack.pop()?;
            match node {
                MerkleNode::Leaf { name, .. } => return Some(name),
                MerkleNode::Internal { left, right, .. } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn hash_of(s: &str) -> Hash32 {
        let mut hasher = Sha256::new();
        hasher.update(s.as_bytes());
        hasher.finalize().into()
    }

    fn item(name: &str) -> HashedItem {
        HashedItem::new(name, hash_of(name))
    }

    #[test]
    fn empty_input_has_no_root() {
        assert!(build(&[]).is_none());
    }

    #[test]
    fn single_leaf_tree_is_just_the_leaf() {
        let root = build(&[item("a")]).unwrap();
        assert!(root.is_leaf());
        assert_eq!(*root.hash(), hash_of("a"));
    }

    #[test]
    fn three_leaf_tree_preserves_left_to_right_order() {
        let leaves = vec![item("L1"), item("L2"), item("L3")];
        let root = build(&leaves).unwrap();
        let names: Vec<&str> = LeafNames::new(&root).collect();
        assert_eq!(names, vec!["L1", "L2", "L3"]);

        // Expected shape: ((L1,L2),L3)
        let l12 = combine(&hash_of("L1"), &hash_of("L2"));
        let expected_root = combine(&l12, &hash_of("L3"));
        assert_eq!(*root.hash(), expected_root);
    }

    #[test]
    fn five_leaf_tree_preserves_order_across_two_carry_merges() {
        let names = ["L1", "L2", "L3", "L4", "L5"];
        let leaves: Vec<HashedItem> = names.iter().map(|n| item(n)).collect();
        let root = build(&leaves).unwrap();
        let got: Vec<&str> = LeafNames::new(&root).collect();
        assert_eq!(got, names.to_vec());
    }

    #[test]
    fn identical_leaf_sequences_produce_identical_root_hashes() {
        let leaves_a: Vec<HashedItem> = ["x", "y", "z"].iter().map(|n| item(n)).collect();
        let leaves_b = leaves_a.clone();
        let root_a = build(&leaves_a).unwrap();
        let root_b = build(&leaves_b).unwrap();
        assert_eq!(root_a.hash(), root_b.hash());
    }

    #[test]
    fn changing_a_single_leaf_hash_changes_the_root() {
        let mut leaves: Vec<HashedItem> = ["a", "b", "c", "d"].iter().map(|n| item(n)).collect();
        let root_before = build(&leaves).unwrap();
        leaves[2].content_hash = hash_of("c-modified");
        let root_after = build(&leaves).unwrap();
        assert_ne!(root_before.hash(), root_after.hash());
    }
}
