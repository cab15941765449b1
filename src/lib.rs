//! Content-addressed Merkle index for detecting record-level differences
//! between hierarchical datasets.
//!
//! A [`tree::MerkleIndexTree`] wraps a canonical, numeric-aware sort tree
//! ([`sort_tree`]) and the Merkle tree derived from its leaf sequence
//! ([`merkle`]). Two trees can be compared cheaply via [`diff`] without
//! either side having to be fully present in memory at once, and the whole
//! thing round-trips through a versioned binary encoding ([`format`]) behind
//! a storage-agnostic [`format::Storage`] trait. [`replication`] builds
//! three-level (database/collection/shard) convenience iterators on top of
//! [`diff`] for callers that need to find exactly what changed between two
//! snapshots of a larger hierarchy.

pub mod config;
pub mod diff;
pub mod error;
pub mod format;
pub mod hash_set;
pub mod merkle;
pub mod name_order;
pub mod replication;
pub mod sort_tree;
pub mod tree;

pub use error::{CoreError, CoreResult};
pub use format::Storage;
pub use merkle::MerkleNode;
pub use sort_tree::{Hash32, HashedItem};
pub use tree::{iterate_leaves, MerkleIndexTree};
