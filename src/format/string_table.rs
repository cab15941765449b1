//! V5's per-file string-interning table.
//!
//! Record names repeat heavily across the three-level replication scheme
//! this index feeds (the same UUID-shaped name shows up under sibling
//! subtrees), so V5 writes each distinct name once and references it by
//! index everywhere else. Indices are assigned in first-seen order during a
//! pre-pass over the sort tree, then the Merkle tree — callers must walk the
//! two trees in that same order when building the index so the writer and
//! the conceptual "pre-pass" agree, though in practice every Merkle leaf
//! name already appeared in the sort-tree pass, since Merkle leaves mirror
//! sort leaves one-for-one.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Default)]
pub struct StringTableBuilder {
    index: HashMap<String, u32>,
    strings: Vec<String>,
}

impl StringTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `s`, assigning a fresh one on first sight.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    pub fn into_strings(self) -> Vec<String> {
        self.strings
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Looks up the index assigned to `s` during the pre-pass. Panics if `s`
    /// was never interned — a programming error in the writer, not a
    /// recoverable condition, since every name written must have been
    /// interned first.
    pub fn index_of(&self, s: &str) -> u32 {
        *self.index.get(s).expect("name must be interned before it is written")
    }
}

#[derive(Debug, Clone)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    pub fn new(strings: Vec<String>) -> Self {
        Self { strings }
    }

    pub fn get(&self, index: u32) -> CoreResult<&str> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| CoreError::FormatCorruption(format!("string table index {index} out of range")))
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_and_preserves_first_seen_order() {
        let mut builder = StringTableBuilder::new();
        assert_eq!(builder.intern("alpha"), 0);
        assert_eq!(builder.intern("beta"), 1);
        assert_eq!(builder.intern("alpha"), 0);
        assert_eq!(builder.intern("gamma"), 2);
        assert_eq!(builder.into_strings(), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn out_of_range_lookup_is_format_corruption() {
        let table = StringTable::new(vec!["only".to_string()]);
        assert_eq!(table.get(0).unwrap(), "only");
        assert!(matches!(table.get(1), Err(CoreError::FormatCorruption(_))));
    }
}
