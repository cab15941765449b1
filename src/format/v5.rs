//! V5 payload: current on-disk format.
//!
//! Layout, in order: CBOR-framed database metadata, 16-byte tree UUID, the
//! string table, the sort tree (pre-order, names by table index), then the
//! Merkle tree (pre-order, names by table index). Every internal sort node
//! drops `size`/`min_name` on the wire and has them recomputed on load;
//! every internal Merkle node keeps its stored hash rather than
//! recomputing it, since recomputation is exactly what a corrupt file would
//! need to be caught re-deriving.

use uuid::Uuid;

use super::string_table::{StringTable, StringTableBuilder};
use super::{LoadedTree, Reader, Writer};
use crate::error::{CoreError, CoreResult};
use crate::merkle::{LeafNames, MerkleNode};
use crate::sort_tree::{self, HashedItem, SortNode, SortTree};

fn merkle_node_count(node: &MerkleNode) -> u32 {
    match node {
        MerkleNode::Leaf { .. } => 1,
        MerkleNode::Internal { left, right, .. } => 1 + merkle_node_count(left) + merkle_node_count(right),
    }
}

fn collect_table(sort: &SortTree, merkle: Option<&MerkleNode>) -> StringTableBuilder {
    let mut table = StringTableBuilder::new();
    for leaf in sort.leaves_in_order() {
        table.intern(&leaf.name);
    }
    if let Some(root) = merkle {
        for name in LeafNames::new(root) {
            table.intern(name);
        }
    }
    table
}

fn write_sort_node(writer: &mut Writer, node: &SortNode, table: &StringTableBuilder) {
    writer.write_u32(node.node_count() as u32);
    match node {
        SortNode::Leaf(item) => {
            writer.write_u64_lo_hi(item.length);
            writer.write_u32(table.index_of(&item.name));
            writer.write_bytes_fixed(&item.content_hash);
            writer.write_u64_lo_hi(item.last_modified.unwrap_or(0));
        }
        SortNode::Internal { left, right, .. } => {
            write_sort_node(writer, left, table);
            write_sort_node(writer, right, table);
        }
    }
}

fn write_merkle_node(writer: &mut Writer, node: &MerkleNode, table: &StringTableBuilder) {
    writer.write_u32(merkle_node_count(node));
    writer.write_bytes_fixed(node.hash());
    match node {
        MerkleNode::Leaf { name, .. } => writer.write_u32(table.index_of(name)),
        MerkleNode::Internal { left, right, .. } => {
            write_merkle_node(writer, left, table);
            write_merkle_node(writer, right, table);
        }
    }
}

pub(crate) fn serialize(
    writer: &mut Writer,
    id: &Uuid,
    database_metadata: &serde_cbor::Value,
    sort: &SortTree,
    merkle: Option<&MerkleNode>,
) -> CoreResult<()> {
    writer.write_cbor_framed(database_metadata)?;
    writer.write_bytes_fixed(id.as_bytes());

    let table = collect_table(sort, merkle);
    let strings = table.strings();
    writer.write_u32(strings.len() as u32);
    for s in strings {
        writer.write_string(s);
    }

    match sort.root() {
        None => writer.write_u32(0),
        Some(root) => write_sort_node(writer, root, &table),
    }

    match merkle {
        None => writer.write_u32(0),
        Some(root) => write_merkle_node(writer, root, &table),
    }

    Ok(())
}

fn read_sort_node(reader: &mut Reader, table: &StringTable) -> CoreResult<Option<SortNode>> {
    let node_count = reader.read_u32()?;
    if node_count == 0 {
        return Ok(None);
    }
    if node_count == 1 {
        let length = reader.read_u64_lo_hi()?;
        let name_index = reader.read_u32()?;
        let name = table.get(name_index)?.to_string();
        let content_hash = reader.read_hash32()?;
        let last_modified_raw = reader.read_u64_lo_hi()?;
        let last_modified = (last_modified_raw != 0).then_some(last_modified_raw);
        return Ok(Some(SortNode::Leaf(HashedItem::with_metadata(name, content_hash, length, last_modified))));
    }
    let left = read_sort_node(reader, table)?
        .ok_or_else(|| CoreError::FormatCorruption("internal sort node missing left child".to_string()))?;
    let right = read_sort_node(reader, table)?
        .ok_or_else(|| CoreError::FormatCorruption("internal sort node missing right child".to_string()))?;
    Ok(Some(sort_tree::make_internal(left, right)))
}

fn read_merkle_node(reader: &mut Reader, table: &StringTable) -> CoreResult<Option<MerkleNode>> {
    let node_count = reader.read_u32()?;
    if node_count == 0 {
        return Ok(None);
    }
    let hash = reader.read_hash32()?;
    if node_count == 1 {
        let name_index = reader.read_u32()?;
        let name = table.get(name_index)?.to_string();
        return Ok(Some(MerkleNode::Leaf { name, hash }));
    }
    let left = read_merkle_node(reader, table)?
        .ok_or_else(|| CoreError::FormatCorruption("internal merkle node missing left child".to_string()))?;
    let right = read_merkle_node(reader, table)?
        .ok_or_else(|| CoreError::FormatCorruption("internal merkle node missing right child".to_string()))?;
    Ok(Some(MerkleNode::Internal { left: Box::new(left), right: Box::new(right), hash }))
}

pub(crate) fn deserialize(reader: &mut Reader) -> CoreResult<LoadedTree> {
    let database_metadata = reader.read_cbor_framed()?;
    let id_bytes = reader.read_bytes(16)?;
    let id = Uuid::from_slice(id_bytes).map_err(|e| CoreError::FormatCorruption(format!("bad uuid: {e}")))?;

    let count = reader.read_u32()?;
    let mut strings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        strings.push(reader.read_string()?);
    }
    let table = StringTable::new(strings);

    let sort_root = read_sort_node(reader, &table)?;
    let mut sort = SortTree::new();
    sort.set_root(sort_root);

    let merkle = read_merkle_node(reader, &table)?;

    Ok(LoadedTree { id, database_metadata, sort, merkle, version: 5 })
}
