//! # Content-Hash Set & Map
//!
//! Backing store for membership and multiplicity checks over 32-byte SHA-256
//! hashes. Each hash is summarized by XOR-folding its eight
//! big-endian 32-bit words into a 32-bit fingerprint; the fingerprint selects
//! a bucket, and the bucket holds the full hashes (or hash/value pairs) that
//! share it. Fingerprint equality is only ever a hint — every lookup falls
//! through to a byte-exact comparison of the full hash before it is treated
//! as a match, so two unrelated hashes that happen to fold to the same
//! fingerprint never collide in the set's findability.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};

pub type Hash32 = [u8; 32];

fn fingerprint(hash: &Hash32) -> u32 {
    let mut fp = 0u32;
    for chunk in hash.chunks_exact(4) {
        let word = u32::from_be_bytes(chunk.try_into().expect("chunk is 4 bytes"));
        fp ^= word;
    }
    fp
}

pub(crate) fn to_hash32(buf: &[u8]) -> CoreResult<Hash32> {
    buf.try_into()
        .map_err(|_| CoreError::Precondition(format!("expected a 32-byte hash, got {} bytes", buf.len())))
}

/// A set of 32-byte hashes with explicit fingerprint-collision handling.
#[derive(Debug, Default, Clone)]
pub struct HashSet32 {
    buckets: HashMap<u32, Vec<Hash32>>,
}

impl HashSet32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the hash was newly inserted.
    pub fn add(&mut self, hash: &[u8]) -> CoreResult<bool> {
        let hash = to_hash32(hash)?;
        let bucket = self.buckets.entry(fingerprint(&hash)).or_default();
        if bucket.contains(&hash) {
            return Ok(false);
        }
        bucket.push(hash);
        Ok(true)
    }

    pub fn has(&self, hash: &[u8]) -> CoreResult<bool> {
        let hash = to_hash32(hash)?;
        Ok(self
            .buckets
            .get(&fingerprint(&hash))
            .is_some_and(|bucket| bucket.contains(&hash)))
    }

    /// Returns `true` if the hash was present and removed. Removing one hash
    /// never disturbs the findability of other hashes sharing its fingerprint
    /// bucket.
    pub fn delete(&mut self, hash: &[u8]) -> CoreResult<bool> {
        let hash = to_hash32(hash)?;
        let fp = fingerprint(&hash);
        let Some(bucket) = self.buckets.get_mut(&fp) else {
            return Ok(false);
        };
        let before = bucket.len();
        bucket.retain(|h| h != &hash);
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            self.buckets.remove(&fp);
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn size(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hash32> {
        self.buckets.values().flatten()
    }
}

/// A map keyed by 32-byte hash with the same fingerprint-bucket strategy as
/// [`HashSet32`].
#[derive(Debug, Default, Clone)]
pub struct HashMap32<V> {
    buckets: HashMap<u32, Vec<(Hash32, V)>>,
}

impl<V> HashMap32<V> {
    pub fn new() -> Self {
        Self { buckets: HashMap::new() }
    }

    pub fn set(&mut self, hash: &[u8], value: V) -> CoreResult<()> {
        let hash = to_hash32(hash)?;
        let bucket = self.buckets.entry(fingerprint(&hash)).or_default();
        if let Some(entry) = bucket.iter_mut().find(|(h, _)| *h == hash) {
            entry.1 = value;
        } else {
            bucket.push((hash, value));
        }
        Ok(())
    }

    pub fn get(&self, hash: &[u8]) -> CoreResult<Option<&V>> {
        let hash = to_hash32(hash)?;
        Ok(self
            .buckets
            .get(&fingerprint(&hash))
            .and_then(|bucket| bucket.iter().find(|(h, _)| *h == hash))
            .map(|(_, v)| v))
    }

    pub fn has(&self, hash: &[u8]) -> CoreResult<bool> {
        Ok(self.get(hash)?.is_some())
    }

    pub fn delete(&mut self, hash: &[u8]) -> CoreResult<bool> {
        let hash = to_hash32(hash)?;
        let fp = fingerprint(&hash);
        let Some(bucket) = self.buckets.get_mut(&fp) else {
            return Ok(false);
        };
        let before = bucket.len();
        bucket.retain(|(h, _)| h != &hash);
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            self.buckets.remove(&fp);
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn size(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Hash32, V)> {
        self.buckets.values().flatten()
    }
}
