//! V2: the oldest readable format ("no database
//! metadata, plus two discarded `created_at`/`modified_at` fields"). No
//! metadata document is written at all — [`LoadedTree::database_metadata`]
//! is synthesized as CBOR null — and two 64-bit timestamps follow the UUID
//! that every later version dropped. The sort tree itself uses the same
//! inline-name, `isDeleted`-flagged shape as V3, via [`super::v4::read_node`].

use uuid::Uuid;

use super::v4::read_node;
use super::{LoadedTree, Reader};
use crate::error::{CoreError, CoreResult};
use crate::sort_tree::SortTree;

pub(crate) fn deserialize(reader: &mut Reader) -> CoreResult<LoadedTree> {
    let id_bytes = reader.read_bytes(16)?;
    let id = Uuid::from_slice(id_bytes).map_err(|e| CoreError::FormatCorruption(format!("bad uuid: {e}")))?;

    let _created_at = reader.read_u64_lo_hi()?;
    let _modified_at = reader.read_u64_lo_hi()?;

    let sort_root = read_node(reader, true)?;
    let mut sort = SortTree::new();
    sort.set_root(sort_root);

    Ok(LoadedTree {
        id,
        database_metadata: serde_cbor::Value::Null,
        sort,
        merkle: None,
        version: 2,
    })
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
                writer.write_u8(0); // isDeleted
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

    pub(crate) fn write_v2_body(writer: &mut Writer, id: &Uuid, created_at: u64, modified_at: u64, sort: &SortTree) {
        writer.write_bytes_fixed(id.as_bytes());
        writer.write_u64_lo_hi(created_at);
        writer.write_u64_lo_hi(modified_at);
        match sort.root() {
            None => writer.write_u32(0),
            Some(root) => write_node(writer, root),
        }
    }
}
