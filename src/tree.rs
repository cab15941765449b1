//! # `MerkleIndexTree`
//!
//! The top-level object a caller actually holds: a sort tree plus
//! the Merkle tree derived from it, a dirty flag tracking whether the two
//! are in sync, the on-disk format version, and an opaque metadata payload.
//! Every mutation method here is a thin wrapper over [`crate::sort_tree`]
//! that additionally manages `dirty` and, for [`MerkleIndexTree::rebuild`],
//! the Merkle rebuild this type calls out as a special case.

use uuid::Uuid;

use crate::diff::{self, DiffOutcome};
use crate::error::{CoreError, CoreResult};
use crate::format::{self, Storage};
use crate::merkle::{self, LeafNames, MerkleNode};
use crate::sort_tree::{Hash32, HashedItem, SortTree};

/// A content-addressed index over one collection's worth of items: a sort
/// tree for lookups, a Merkle tree for cheap equality and diffing, and the
/// bookkeeping that keeps the two in sync across saves and loads.
#[derive(Debug, Clone)]
pub struct MerkleIndexTree {
    id: Uuid,
    sort: SortTree,
    merkle: Option<MerkleNode>,
    dirty: bool,
    version: u32,
    database_metadata: serde_cbor::Value,
}

impl MerkleIndexTree {
    /// Creates a new, empty tree. No sort or Merkle tree exists yet; an
    /// empty tree has nothing to rebuild, so it starts clean.
    pub fn create(id: Uuid) -> Self {
        Self {
            id,
            sort: SortTree::new(),
            merkle: None,
            dirty: false,
            version: format::CURRENT_VERSION,
            database_metadata: serde_cbor::Value::Null,
        }
    }

    pub fn with_metadata(mut self, database_metadata: serde_cbor::Value) -> Self {
        self.database_metadata = database_metadata;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn database_metadata(&self) -> &serde_cbor::Value {
        &self.database_metadata
    }

    pub fn len(&self) -> usize {
        self.sort.leaves_in_order().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sort.is_empty()
    }

    pub fn sort_tree(&self) -> &SortTree {
        &self.sort
    }

    pub fn merkle_root(&self) -> Option<&MerkleNode> {
        self.merkle.as_ref()
    }

    /// The current Merkle root hash, if one has been built. `None` both for
    /// an empty tree and for a non-empty-but-never-built one; callers that
    /// need "is there content" should check [`MerkleIndexTree::is_empty`]
    /// instead.
    pub fn root_hash(&self) -> Option<&Hash32> {
        self.merkle.as_ref().map(MerkleNode::hash)
    }

    /// Inserts a new item. Fails if the name is already present — use
    /// [`MerkleIndexTree::upsert`] for insert-or-replace.
    pub fn add(&mut self, item: HashedItem) -> CoreResult<()> {
        self.sort.add(item)?;
        self.dirty = true;
        Ok(())
    }

    /// Inserts a new item, or replaces the content hash/length/last-modified
    /// of an existing one.
    pub fn upsert(&mut self, item: HashedItem) {
        self.sort.upsert(item);
        self.dirty = true;
    }

    /// Replaces the fields of an existing item. Fails with `NotFound` if the
    /// name is absent.
    pub fn update(&mut self, name: &str, content_hash: Hash32, length: u64, last_modified: Option<u64>) -> CoreResult<()> {
        self.sort.update(name, content_hash, length, last_modified)?;
        self.dirty = true;
        Ok(())
    }

    /// Removes a single item. A non-existent name is a silent no-op.
    pub fn delete(&mut self, name: &str) -> CoreResult<()> {
        self.sort.delete(name)?;
        self.dirty = true;
        Ok(())
    }

    /// Removes every name in `names`. Unlike [`MerkleIndexTree::delete`],
    /// this rejects the whole batch with `NotFound` if any name is absent,
    /// and leaves the tree untouched in that case.
    pub fn delete_many(&mut self, names: &[String]) -> CoreResult<()> {
        if let Some(missing) = names.iter().find(|n| self.sort.find(n).is_none()) {
            return Err(CoreError::NotFound(missing.clone()));
        }
        for name in names {
            self.sort.delete(name)?;
        }
        self.dirty = true;
        Ok(())
    }

    /// Deletes every leaf under the given Merkle subtree roots, returning
    /// the names actually removed.
    pub fn prune(&mut self, nodes: &[&MerkleNode]) -> Vec<String> {
        let names: Vec<String> = nodes.iter().flat_map(|n| LeafNames::new(n)).map(str::to_owned).collect();
        let pruned = self.sort.prune(&names);
        if !pruned.is_empty() {
            self.dirty = true;
        }
        pruned
    }

    /// Drops every item whose name begins with any of `drop_prefixes`, then
    /// re-inserts the survivors into a fresh canonical tree and immediately
    /// rebuilds the Merkle tree, so `dirty` ends up `false` rather than left
    /// for the caller to clear. O(n log n); intended for cleanup and
    /// format-upgrade passes, not routine mutation.
    pub fn rebuild(&mut self, drop_prefixes: &[String]) {
        self.sort.rebuild(drop_prefixes);
        self.build_merkle();
    }

    pub fn find(&self, name: &str) -> Option<&HashedItem> {
        self.sort.find(name)
    }

    pub fn get_item_info(&self, name: &str) -> Option<(Hash32, u64, Option<u64>)> {
        self.sort.find(name).map(|item| (item.content_hash, item.length, item.last_modified))
    }

    /// Rebuilds the Merkle tree from the current sort tree's leaf sequence
    /// and clears `dirty`.
    pub fn build_merkle(&mut self) {
        let leaves = self.sort.leaves_in_order();
        self.merkle = merkle::build_from_sorted_leaves(&leaves);
        self.dirty = false;
    }

    /// Visits every sort-tree node in preorder; `visit` returning
    /// `Err(CoreError::Cancelled)` stops early without surfacing as an
    /// error.
    pub fn traverse_preorder<F>(&self, visit: F) -> CoreResult<()>
    where
        F: FnMut(&crate::sort_tree::SortNode) -> CoreResult<()>,
    {
        self.sort.traverse_preorder(visit)
    }

    /// Serializes the tree via `storage` at the current format version.
    /// Refuses while `dirty` — call [`MerkleIndexTree::build_merkle`] first.
    pub fn save(&self, storage: &dyn Storage, path: &str) -> CoreResult<()> {
        if self.dirty {
            return Err(CoreError::Dirty);
        }
        format::save(storage, path, &self.id, &self.database_metadata, &self.sort, self.merkle.as_ref())
    }

    /// Loads a tree from `path`, dispatching on its on-disk version. Any
    /// version older than the current one has its Merkle tree rebuilt from
    /// the loaded sort tree rather than trusting (or requiring) an on-disk
    /// Merkle encoding. Returns `Ok(None)` if `path` does not exist.
    pub fn load(storage: &dyn Storage, path: &str) -> CoreResult<Option<Self>> {
        let Some(loaded) = format::load(storage, path)? else {
            return Ok(None);
        };
        let merkle = match loaded.merkle {
            Some(m) => Some(m),
            None => {
                let leaves = loaded.sort.leaves_in_order();
                merkle::build_from_sorted_leaves(&leaves)
            }
        };
        Ok(Some(Self {
            id: loaded.id,
            sort: loaded.sort,
            merkle,
            dirty: false,
            version: loaded.version,
            database_metadata: loaded.database_metadata,
        }))
    }

    /// Reads only the on-disk version prefix, without parsing the rest of
    /// the file.
    pub fn load_version(storage: &dyn Storage, path: &str) -> CoreResult<Option<u32>> {
        format::load_version(storage, path)
    }

    /// Two-way Merkle diff against another tree.
    pub fn diff(&self, other: &Self) -> DiffOutcome {
        diff::diff(self.merkle.as_ref(), other.merkle.as_ref())
    }
}

/// Lazy left-to-right sequence of leaf names under a Merkle (sub)tree.
pub fn iterate_leaves(node: &MerkleNode) -> LeafNames<'_> {
    LeafNames::new(node)
}
