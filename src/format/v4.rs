//! V4: read-only predecessor to V5, without a string table. Names are
//! inlined per leaf instead of indexed, and
//! internal sort nodes additionally carry a `leaf_count`/`size` pair that V5
//! dropped — both are discarded here and recomputed from the children, per
//! "leafCount is recomputed on demand".
//!
//! [`read_node`] takes a `has_is_deleted` flag so V3 ("V4 plus a
//! per-leaf isDeleted flag") can reuse the same walk instead of duplicating
//! it.

use uuid::Uuid;

use super::{LoadedTree, Reader};
use crate::error::CoreError;
use crate::error::CoreResult;
use crate::sort_tree::{self, HashedItem, SortNode, SortTree};

pub(crate) fn read_node(reader: &mut Reader, has_is_deleted: bool) -> CoreResult<Option<SortNode>> {
    let node_count = reader.read_u32()?;
    if node_count == 0 {
        return Ok(None);
    }
    if node_count == 1 {
        if has_is_deleted {
            let _is_deleted = reader.read_u8()?;
        }
        let length = reader.read_u64_lo_hi()?;
        let name = reader.read_string()?;
        let content_hash = reader.read_hash32()?;
        let last_modified_raw = reader.read_u64_lo_hi()?;
        let last_modified = (last_modified_raw != 0).then_some(last_modified_raw);
        return Ok(Some(SortNode::Leaf(HashedItem::with_metadata(name, content_hash, length, last_modified))));
    }
    // leaf_count/size were persisted in this version; both recomputed on load.
    let _leaf_count = reader.read_u32()?;
    let _size = reader.read_u64_lo_hi()?;
    let left = read_node(reader, has_is_deleted)?
        .ok_or_else(|| CoreError::FormatCorruption("internal sort node missing left child".to_string()))?;
    let right = read_node(reader, has_is_deleted)?
        .ok_or_else(|| CoreError::FormatCorruption("internal sort node missing right child".to_string()))?;
    Ok(Some(sort_tree::make_internal(left, right)))
}

pub(crate) fn deserialize(reader: &mut Reader) -> CoreResult<LoadedTree> {
    let database_metadata = reader.read_cbor_framed()?;
    let id_bytes = reader.read_bytes(16)?;
    let id = Uuid::from_slice(id_bytes).map_err(|e| CoreError::FormatCorruption(format!("bad uuid: {e}")))?;

    let sort_root = read_node(reader, false)?;
    let mut sort = SortTree::new();
    sort.set_root(sort_root);

    Ok(LoadedTree { id, database_metadata, sort, merkle: None, version: 4 })
}
