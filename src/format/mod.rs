//! # Versioned Binary Format
//!
//! The on-disk envelope is a 4-byte little-endian version prefix followed by
//! a payload written by that version's serializer. V5 is the
//! only version this crate writes; V2-V4 are read-only, upgraded into an
//! in-memory V5-shaped tree on load. Every deserializer stops once it has
//! read the sort tree — the Merkle tree is always rebuilt via
//! [`crate::merkle::build`] rather than trusting whatever bytes (if any)
//! follow it on disk, so a legacy reader never needs to understand a legacy
//! Merkle encoding.

mod string_table;
mod v2;
mod v3;
mod v4;
mod v5;

use std::io::Read;

use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::merkle::MerkleNode;
use crate::sort_tree::SortTree;

pub const CURRENT_VERSION: u32 = 5;

/// Byte-stream storage the core reads and writes through. Implementations
/// own path resolution and atomicity; the core only ever asks for whole
/// reads and whole writes.
pub trait Storage {
    fn read_stream(&self, path: &str) -> std::io::Result<Box<dyn Read>>;
    fn write_bytes(&self, path: &str, bytes: &[u8]) -> std::io::Result<()>;
    fn exists(&self, path: &str) -> std::io::Result<bool>;
}

/// Everything the deserializer recovers from a file, handed back to
/// `MerkleIndexTree::load` to assemble the public type.
pub struct LoadedTree {
    pub id: Uuid,
    pub database_metadata: serde_cbor::Value,
    pub sort: SortTree,
    /// `Some` only for V5, which persists its Merkle tree; `None` for every
    /// older version, which always gets its Merkle tree rebuilt by the
    /// caller from the loaded sort tree instead.
    pub merkle: Option<MerkleNode>,
    pub version: u32,
}

pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Matches the wire layout's `lo`/`hi` u32 pair for a 64-bit value.
    fn write_u64_lo_hi(&mut self, v: u64) {
        self.write_u32((v & 0xFFFF_FFFF) as u32);
        self.write_u32((v >> 32) as u32);
    }

    fn write_bytes_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn write_cbor_framed(&mut self, value: &serde_cbor::Value) -> CoreResult<()> {
        let bytes = serde_cbor::to_vec(value)
            .map_err(|e| CoreError::InvalidStructure(format!("database_metadata not CBOR-encodable: {e}")))?;
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(CoreError::FormatCorruption(format!(
                "truncated stream: wanted {n} bytes at offset {}, only {} remain",
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> CoreResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(b.try_into().expect("4 bytes")))
    }

    fn read_u64_lo_hi(&mut self) -> CoreResult<u64> {
        let lo = self.read_u32()? as u64;
        let hi = self.read_u32()? as u64;
        Ok(lo | (hi << 32))
    }

    fn read_hash32(&mut self) -> CoreResult<[u8; 32]> {
        self.read_bytes(32)?.try_into().map_err(|_| {
            CoreError::FormatCorruption("hash field was not 32 bytes".to_string())
        })
    }

    fn read_string(&mut self) -> CoreResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| CoreError::FormatCorruption(format!("name was not valid UTF-8: {e}")))
    }

    fn read_cbor_framed(&mut self) -> CoreResult<serde_cbor::Value> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        serde_cbor::from_slice(bytes)
            .map_err(|e| CoreError::FormatCorruption(format!("database_metadata was not valid CBOR: {e}")))
    }
}

/// Serializes `tree` as the current version and writes it via `storage`.
/// Callers are responsible for checking `dirty` before calling this — the
/// format module itself has no notion of dirtiness, that is a `tree.rs`
/// concern.
pub fn save(
    storage: &dyn Storage,
    path: &str,
    id: &Uuid,
    database_metadata: &serde_cbor::Value,
    sort: &SortTree,
    merkle: Option<&MerkleNode>,
) -> CoreResult<()> {
    let mut writer = Writer::new();
    writer.write_u32(CURRENT_VERSION);
    v5::serialize(&mut writer, id, database_metadata, sort, merkle)?;
    storage.write_bytes(path, &writer.into_bytes()).map_err(CoreError::from)
}

/// Loads a tree from `path`, dispatching on its version prefix. Returns
/// `Ok(None)` if the file does not exist. Refuses a file whose version
/// exceeds [`CURRENT_VERSION`].
pub fn load(storage: &dyn Storage, path: &str) -> CoreResult<Option<LoadedTree>> {
    if !storage.exists(path).map_err(CoreError::from)? {
        return Ok(None);
    }
    let mut stream = storage.read_stream(path).map_err(CoreError::from)?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).map_err(CoreError::from)?;

    let mut reader = Reader::new(&bytes);
    let version = reader.read_u32()?;
    if version > CURRENT_VERSION {
        return Err(CoreError::BadVersion { found: version, max: CURRENT_VERSION });
    }

    let loaded = match version {
        5 => v5::deserialize(&mut reader)?,
        4 => v4::deserialize(&mut reader)?,
        3 => v3::deserialize(&mut reader)?,
        2 => v2::deserialize(&mut reader)?,
        other => return Err(CoreError::BadVersion { found: other, max: CURRENT_VERSION }),
    };
    Ok(Some(loaded))
}

/// Reads only the 4-byte version prefix, without parsing the body.
pub fn load_version(storage: &dyn Storage, path: &str) -> CoreResult<Option<u32>> {
    if !storage.exists(path).map_err(CoreError::from)? {
        return Ok(None);
    }
    let mut stream = storage.read_stream(path).map_err(CoreError::from)?;
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).map_err(CoreError::from)?;
    Ok(Some(u32::from_le_bytes(prefix)))
}


#[cfg(test)]
mod tests {
    use super::test_support::MemStorage;
    use super::*;
    use crate::sort_tree::HashedItem;
    use sha2::{Digest, Sha256};

    fn hash_of(s: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(s.as_bytes());
        hasher.finalize().into()
    }

    #[test]
    fn save_then_load_round_trips_sort_tree_and_version() {
        let storage = MemStorage::new();
        let id = Uuid::new_v4();
        let mut sort = SortTree::new();
        sort.add(HashedItem::with_metadata("a", hash_of("a"), 3, Some(1000))).unwrap();
        sort.add(HashedItem::with_metadata("b", hash_of("b"), 4, None)).unwrap();
        let leaves: Vec<HashedItem> = sort.leaves_in_order().into_iter().cloned().collect();
        let merkle = crate::merkle::build(&leaves);
        let metadata = serde_cbor::Value::Map(Default::default());

        save(&storage, "tree.bin", &id, &metadata, &sort, merkle.as_ref()).unwrap();

        assert_eq!(load_version(&storage, "tree.bin").unwrap(), Some(5));

        let loaded = load(&storage, "tree.bin").unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.version, 5);
        let names: Vec<&str> = loaded.sort.leaves_in_order().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(loaded.sort.find("a").unwrap().length, 3);
        assert_eq!(loaded.sort.find("a").unwrap().last_modified, Some(1000));
        assert_eq!(loaded.sort.find("b").unwrap().last_modified, None);
        assert_eq!(loaded.merkle.as_ref().map(|m| *m.hash()), merkle.as_ref().map(|m| *m.hash()));
    }

    #[test]
    fn load_of_missing_path_is_none() {
        let storage = MemStorage::new();
        assert!(load(&storage, "nope.bin").unwrap().is_none());
        assert!(load_version(&storage, "nope.bin").unwrap().is_none());
    }

    #[test]
    fn load_refuses_a_version_newer_than_current() {
        let storage = MemStorage::new();
        storage.write_bytes("future.bin", &999u32.to_le_bytes()).unwrap();
        let err = load(&storage, "future.bin").unwrap_err();
        assert!(matches!(err, CoreError::BadVersion { found: 999, max: CURRENT_VERSION }));
    }

    #[test]
    fn load_truncated_stream_is_format_corruption() {
        let storage = MemStorage::new();
        storage.write_bytes("short.bin", &5u32.to_le_bytes()).unwrap(); // version only, no body
        let err = load(&storage, "short.bin").unwrap_err();
        assert!(matches!(err, CoreError::FormatCorruption(_)));
    }

    #[test]
    fn empty_tree_round_trips() {
        let storage = MemStorage::new();
        let id = Uuid::new_v4();
        let sort = SortTree::new();
        let metadata = serde_cbor::Value::Null;
        save(&storage, "empty.bin", &id, &metadata, &sort, None).unwrap();
        let loaded = load(&storage, "empty.bin").unwrap().unwrap();
        assert!(loaded.sort.is_empty());
    }
}
