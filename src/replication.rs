//! # Replication-facing helpers
//!
//! Three thin iterators over the database→collection→shard hierarchy a
//! replication driver walks externally. Each one loads a pair of
//! trees from a [`Storage`] — either side may be absent, e.g. a shard that
//! exists on one node but hasn't been created on the other yet — and turns
//! the [`crate::diff`] result into per-name deltas a caller can apply.
//!
//! A small entry point nodes call to find out what changed since they last
//! synced. Transport, publish/subscribe plumbing, and loop-prevention
//! bookkeeping are someone else's problem here — this module only ever
//! answers "what differs", never "how to send it".

use std::collections::HashMap;

use log::{debug, warn};

use crate::format::Storage;
use crate::name_order::compare_names;
use crate::sort_tree::Hash32;
use crate::tree::MerkleIndexTree;
use crate::CoreResult;

/// One name's worth of difference between a left and a right tree. Absent on
/// one side means the name either doesn't exist there or carries a
/// different content hash than the other side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub name: String,
    pub left_hash: Option<Hash32>,
    pub right_hash: Option<Hash32>,
}

/// The result of one replication-level diff: an ordered sequence of
/// [`Delta`] values a caller can apply one at a time.
pub struct ReplicationDiff {
    deltas: std::vec::IntoIter<Delta>,
}

impl Iterator for ReplicationDiff {
    type Item = Delta;

    fn next(&mut self) -> Option<Delta> {
        self.deltas.next()
    }
}

/// Loads `left` and `right` (either path may be `None`, standing for "this
/// side doesn't have this tree at all") and reduces their Merkle diff into
/// per-name deltas (if the left tree is absent, yields nothing;
/// if the right is absent, yields every leaf of the left").
fn diff_at(storage: &dyn Storage, left_path: Option<&str>, right_path: Option<&str>) -> CoreResult<ReplicationDiff> {
    let left = match left_path {
        Some(path) => MerkleIndexTree::load(storage, path)?,
        None => None,
    };
    let Some(left) = left else {
        debug!("replication: left tree absent, nothing to diff");
        return Ok(ReplicationDiff { deltas: Vec::new().into_iter() });
    };

    let right = match right_path {
        Some(path) => MerkleIndexTree::load(storage, path)?,
        None => None,
    };
    let Some(right) = right else {
        warn!("replication: right tree absent at {:?}, reporting every left leaf as added", right_path);
        let mut deltas: Vec<Delta> = left
            .sort_tree()
            .leaves_in_order()
            .into_iter()
            .map(|item| Delta { name: item.name.clone(), left_hash: Some(item.content_hash), right_hash: None })
            .collect();
        deltas.sort_by(|a, b| compare_names(&a.name, &b.name));
        return Ok(ReplicationDiff { deltas: deltas.into_iter() });
    };

    let outcome = left.diff(&right);
    let mut by_name: HashMap<String, Delta> = HashMap::new();
    for name in outcome.only_in_a {
        let left_hash = left.find(&name).map(|item| item.content_hash);
        by_name.entry(name.clone()).or_insert_with(|| Delta { name, left_hash: None, right_hash: None }).left_hash = left_hash;
    }
    for name in outcome.only_in_b {
        let right_hash = right.find(&name).map(|item| item.content_hash);
        by_name.entry(name.clone()).or_insert_with(|| Delta { name, left_hash: None, right_hash: None }).right_hash = right_hash;
    }
    let mut deltas: Vec<Delta> = by_name.into_values().collect();
    deltas.sort_by(|a, b| compare_names(&a.name, &b.name));
    debug!("replication: {} differing names between {:?} and {:?}", deltas.len(), left_path, right_path);
    Ok(ReplicationDiff { deltas: deltas.into_iter() })
}

/// Diffs a single shard pair — the leaf level of the hierarchy, where each
/// side is exactly one [`MerkleIndexTree`].
pub fn diff_shards(storage: &dyn Storage, left_path: Option<&str>, right_path: Option<&str>) -> CoreResult<ReplicationDiff> {
    diff_at(storage, left_path, right_path)
}

/// Diffs a collection pair. A collection is itself represented as a tree
/// whose leaves name its shards, so the mechanics are identical to
/// [`diff_shards`] — only the caller's interpretation of the resulting names
/// (shard identifiers rather than record names) differs.
pub fn diff_collections(storage: &dyn Storage, left_path: Option<&str>, right_path: Option<&str>) -> CoreResult<ReplicationDiff> {
    diff_at(storage, left_path, right_path)
}

/// Diffs a database pair. A database is represented as a tree whose leaves
/// name its collections; otherwise identical to [`diff_shards`] and
/// [`diff_collections`].
pub fn diff_databases(storage: &dyn Storage, left_path: Option<&str>, right_path: Option<&str>) -> CoreResult<ReplicationDiff> {
    diff_at(storage, left_path, right_path)
}
