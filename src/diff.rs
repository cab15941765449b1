//! # Merkle Diff
//!
//! Enumerates the symmetric difference between two Merkle trees' leaf
//! multisets without a full linear scan of either side: any
//! subtree whose hash has an unconsumed match on the other side is known to
//! be identical down to its leaves, so the walk can stop there instead of
//! descending into it.
//!
//! Two names can legitimately carry the same content hash (two records with
//! identical bytes). A plain hash-set membership test would let one matching
//! name on the other side "absorb" both occurrences, hiding a real
//! difference. [`differing_nodes`] guards against that with a *multiset*:
//! every node dequeued from the other side contributes one unit to a count
//! keyed by its hash, and each match consumes exactly one unit. Internal
//! nodes of the probed side are deliberately never matched whole while the
//! two queues are still being expanded in lockstep — only leaves are
//! matched during that phase — because the counts accumulated so far are a
//! partial view of the other tree; whole-subtree matching only becomes safe
//! once one side's queue has run dry and the remaining counts are final.

use std::collections::VecDeque;

use crate::hash_set::HashMap32;
use crate::merkle::{LeafNames, MerkleNode};

/// The result of a one-way or two-way comparison: the leaves present on one
/// side with no corresponding occurrence on the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    pub identical: bool,
    /// Leaf names present in `a` with no unmatched counterpart in `b`.
    pub only_in_a: Vec<String>,
    /// Leaf names present in `b` with no unmatched counterpart in `a`.
    pub only_in_b: Vec<String>,
}

/// One-way comparison: every leaf name under `a` whose
/// content hash has no unconsumed match anywhere in `b`, accounting for
/// duplicate-hash multiplicity.
///
/// Mirrors the two-queue construction level-by-level: each round expands one
/// more level of `b` into the running multiset, then probes the current
/// level of `a` against it. A leaf of `a` with no available match yet is
/// *requeued*, not given up on, since a later round may still expand the
/// part of `b` it belongs with. Once `b`'s queue drains, the remainder of
/// `a` is resolved in a tail pass that — only now, since the multiset is
/// final — may match whole internal subtrees instead of descending leaf by
/// leaf.
pub fn differing_nodes(a: &MerkleNode, b: &MerkleNode) -> Vec<String> {
    if a.hash() == b.hash() {
        return Vec::new();
    }

    let mut map_b: HashMap32<u64> = HashMap32::new();
    let mut queue_b: VecDeque<&MerkleNode> = VecDeque::new();
    queue_b.push_back(b);
    let mut queue_a: VecDeque<&MerkleNode> = VecDeque::new();
    queue_a.push_back(a);

    while !queue_a.is_empty() && !queue_b.is_empty() {
        // Expand b one level: count every node currently queued, then queue
        // its children for the next round.
        let level_b: Vec<&MerkleNode> = queue_b.drain(..).collect();
        for node in level_b {
            let count = map_b.get(node.hash()).expect("merkle hashes are always 32 bytes").copied().unwrap_or(0);
            map_b.set(node.hash(), count + 1).expect("merkle hashes are always 32 bytes");
            if let MerkleNode::Internal { left, right, .. } = node {
                queue_b.push_back(left);
                queue_b.push_back(right);
            }
        }

        // Probe a one level: internal nodes always expand; leaves either
        // consume a match now or get requeued for the next round.
        let level_a: Vec<&MerkleNode> = queue_a.drain(..).collect();
        for node in level_a {
            match node {
                MerkleNode::Leaf { hash, .. } => {
                    let count = map_b.get(hash).expect("merkle hashes are always 32 bytes").copied().unwrap_or(0);
                    if count > 0 {
                        map_b.set(hash, count - 1).expect("merkle hashes are always 32 bytes");
                    } else {
                        queue_a.push_back(node);
                    }
                }
                MerkleNode::Internal { left, right, .. } => {
                    queue_a.push_back(left);
                    queue_a.push_back(right);
                }
            }
        }
    }

    // Tail pass: one side ran out first. Whatever remains of `a` is resolved
    // against the now-final counts, with whole-subtree matching allowed.
    let mut result = Vec::new();
    let mut remaining: VecDeque<&MerkleNode> = queue_a;
    while let Some(node) = remaining.pop_front() {
        match node {
            MerkleNode::Leaf { name, hash } => {
                let count = map_b.get(hash).expect("merkle hashes are always 32 bytes").copied().unwrap_or(0);
                if count > 0 {
                    map_b.set(hash, count - 1).expect("merkle hashes are always 32 bytes");
                } else {
                    result.push(name.clone());
                }
            }
            MerkleNode::Internal { left, right, hash } => {
                let count = map_b.get(hash).expect("merkle hashes are always 32 bytes").copied().unwrap_or(0);
                if count > 0 {
                    map_b.set(hash, count - 1).expect("merkle hashes are always 32 bytes");
                } else {
                    remaining.push_back(left);
                    remaining.push_back(right);
                }
            }
        }
    }
    result
}

fn all_leaf_names(root: &MerkleNode) -> Vec<String> {
    LeafNames::new(root).map(str::to_owned).collect()
}

/// Two-way diff over a pair of optional Merkle roots (`None` for an empty
/// index). The fast path short-circuits identical roots without touching
/// either tree; otherwise each direction is an independent call to
/// [`differing_nodes`] — a single-pass version is a known possible
/// optimization but is not required for correctness.
pub fn diff(a: Option<&MerkleNode>, b: Option<&MerkleNode>) -> DiffOutcome {
    match (a, b) {
        (None, None) => DiffOutcome { identical: true, only_in_a: Vec::new(), only_in_b: Vec::new() },
        (Some(a), None) => {
            DiffOutcome { identical: false, only_in_a: all_leaf_names(a), only_in_b: Vec::new() }
        }
        (None, Some(b)) => {
            DiffOutcome { identical: false, only_in_a: Vec::new(), only_in_b: all_leaf_names(b) }
        }
        (Some(a), Some(b)) => {
            if a.hash() == b.hash() {
                return DiffOutcome { identical: true, only_in_a: Vec::new(), only_in_b: Vec::new() };
            }
            let mut only_in_a = differing_nodes(a, b);
            let mut only_in_b = differing_nodes(b, a);
            only_in_a.sort();
            only_in_b.sort();
            DiffOutcome { identical: false, only_in_a, only_in_b }
        }
    }
}
