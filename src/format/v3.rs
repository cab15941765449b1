//! V3: read-only predecessor to V4 ("V4 plus a
//! per-leaf `isDeleted` flag (discarded on load) and a different record of
//! leaf count"). The wire shape is otherwise identical to V4 — no string
//! table, inline per-leaf names, `leaf_count`/`size` on internal sort nodes —
//! so this module is a thin wrapper over [`super::v4::read_node`] with
//! `has_is_deleted` pinned to `true`.

use uuid::Uuid;

use super::v4::read_node;
use super::{LoadedTree, Reader};
use crate::error::{CoreError, CoreResult};
use crate::sort_tree::SortTree;

pub(crate) fn deserialize(reader: &mut Reader) -> CoreResult<LoadedTree> {
    let database_metadata = reader.read_cbor_framed()?;
    let id_bytes = reader.read_bytes(16)?;
    let id = Uuid::from_slice(id_bytes).map_err(|e| CoreError::FormatCorruption(format!("bad uuid: {e}")))?;

    let sort_root = read_node(reader, true)?;
    let mut sort = SortTree::new();
    sort.set_root(sort_root);

    Ok(LoadedTree { id, database_metadata, sort, merkle: None, version: 3 })
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use crate::format::Writer;
    use crate::sort_tree::SortNode;

    fn write_node(writer: &mut Writer, node: &SortNode) {
        writer.write_u32(node.node_count() as u32);
        match node {
            SortNode::Leaf(item) => {
                writer.write_u8(0); // isDeleted, always false for a live fixture
                writer.write_u64_lo_hi(item.length);
                writer.write_string(&item.name);
                writer.write_bytes_fixed(&item.content_hash);
                writer.write_u64_lo_hi(item.last_modified.unwrap_or(0));
            }
            SortNode::Internal { left, right, node_count, size, .. } => {
                writer.write_u32(*node_count as u32);
                writer.write_u64_lo_hi(*size);
                write_node(writer, left);
                write_node(writer, right);
            }
        }
    }

    pub(crate) fn write_v3_body(
        writer: &mut Writer,
        id: &Uuid,
        database_metadata: &serde_cbor::Value,
        sort: &SortTree,
    ) {
        writer.write_cbor_framed(database_metadata).unwrap();
        writer.write_bytes_fixed(id.as_bytes());
        match sort.root() {
            None => writer.write_u32(0),
            Some(root) => write_node(writer, root),
        }
    }
}
