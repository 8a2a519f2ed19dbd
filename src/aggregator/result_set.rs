//! Deduplicated result accumulation

use crate::model::DedupKey;
use std::collections::HashSet;

/// Mapping from dedup key to presence, plus the accumulated outputs
///
/// `insert` updates the key set and the output sequence in one `&mut self`
/// call, so whatever lock guards the set also makes check-then-insert
/// atomic.
#[derive(Debug, Clone)]
pub struct ResultSet<O> {
    seen: HashSet<DedupKey>,
    entries: Vec<(DedupKey, O)>,
}

impl<O> Default for ResultSet<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> ResultSet<O> {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert `record` under `key` unless the key is already present
    ///
    /// Returns `true` if the record was added, `false` if it was a duplicate
    /// and has been discarded.
    pub fn insert(&mut self, key: DedupKey, record: O) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.entries.push((key, record));
        true
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold another set into this one, returning how many of its entries
    /// were duplicates of keys already present
    pub fn merge(&mut self, other: ResultSet<O>) -> usize {
        let mut duplicates = 0;
        for (key, record) in other.entries {
            if !self.insert(key, record) {
                duplicates += 1;
            }
        }
        duplicates
    }

    /// Consume the set, yielding outputs in insertion order
    pub fn into_records(self) -> Vec<O> {
        self.entries.into_iter().map(|(_, record)| record).collect()
    }
}
