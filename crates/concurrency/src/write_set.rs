//! Per-transaction write set
//!
//! A `WriteSet` buffers the mutations of one transaction against one
//! keyspace. Entries are kept in key order, which is what the cursor merge
//! consumes; insertion order is irrelevant and a later mutation of a key
//! replaces the earlier one.
//!
//! Prefix deletes are recorded as prefix tombstones: every committed key
//! starting with the prefix reads as deleted unless the same write set later
//! re-creates it with an explicit put.

use std::collections::btree_map::Range;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use kvdb_core::{CommitBatch, Direction, Key, KvsId, Mutation};

/// Result of looking a key up in a write set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The write set puts this value
    Put(&'a [u8]),
    /// The write set deletes the key, explicitly or through a prefix tombstone
    Delete,
    /// The write set does not touch the key
    Absent,
}

/// Summary of buffered operations
///
/// These are the operations that would be published on commit or
/// discarded on abort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOperations {
    /// Number of pending put operations
    pub puts: usize,
    /// Number of pending delete operations
    pub deletes: usize,
    /// Number of pending prefix deletes
    pub prefix_deletes: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.puts + self.deletes + self.prefix_deletes
    }

    /// Check if there are no pending operations
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::ops::Add for PendingOperations {
    type Output = PendingOperations;

    fn add(self, rhs: PendingOperations) -> PendingOperations {
        PendingOperations {
            puts: self.puts + rhs.puts,
            deletes: self.deletes + rhs.deletes,
            prefix_deletes: self.prefix_deletes + rhs.prefix_deletes,
        }
    }
}

/// Ordered buffer of pending mutations for one keyspace
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    entries: BTreeMap<Key, Mutation>,
    prefix_tombstones: BTreeSet<Vec<u8>>,
}

impl WriteSet {
    /// Create an empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a put, replacing any earlier mutation of `key`
    pub fn put(&mut self, key: Key, value: Vec<u8>) {
        self.entries.insert(key, Mutation::Put(value));
    }

    /// Buffer a delete, replacing any earlier mutation of `key`
    pub fn delete(&mut self, key: Key) {
        self.entries.insert(key, Mutation::Delete);
    }

    /// Delete every key starting with `prefix`
    ///
    /// Pending mutations under the prefix are dropped and the prefix is
    /// recorded as a tombstone over the committed keyspace.
    pub fn prefix_delete(&mut self, prefix: Vec<u8>) {
        self.entries.retain(|k, _| !k.starts_with(&prefix));
        self.prefix_tombstones.insert(prefix);
    }

    /// Look up the pending state of `key`
    pub fn lookup(&self, key: &Key) -> Lookup<'_> {
        match self.entries.get(key) {
            Some(Mutation::Put(v)) => Lookup::Put(v),
            Some(Mutation::Delete) => Lookup::Delete,
            None if self.covered_by_prefix_tombstone(key.as_bytes()) => Lookup::Delete,
            None => Lookup::Absent,
        }
    }

    /// Whether a prefix tombstone covers `key`
    ///
    /// Only the explicit entries of this write set can override the answer;
    /// the cursor merge checks those first.
    pub fn covered_by_prefix_tombstone(&self, key: &[u8]) -> bool {
        // Any prefix of `key` sorts at or before it
        self.prefix_tombstones
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .any(|prefix| key.starts_with(prefix))
    }

    /// Lazy ordered scan over pending entries starting at `from`
    pub fn scan_from(&self, from: Bound<&Key>, direction: Direction) -> WriteSetScan<'_> {
        let range = match direction {
            Direction::Forward => self.entries.range((from, Bound::Unbounded)),
            Direction::Reverse => self.entries.range((Bound::Unbounded, from)),
        };
        WriteSetScan { range, direction }
    }

    /// First pending entry at `from` in `direction`
    pub fn next_entry(&self, from: Bound<&Key>, direction: Direction) -> Option<(&Key, &Mutation)> {
        self.scan_from(from, direction).next()
    }

    /// Number of buffered operations
    pub fn len(&self) -> usize {
        self.entries.len() + self.prefix_tombstones.len()
    }

    /// Check for an empty write set
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.prefix_tombstones.is_empty()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.prefix_tombstones.clear();
    }

    /// Count buffered operations by kind
    pub fn pending(&self) -> PendingOperations {
        let deletes = self.entries.values().filter(|m| m.is_delete()).count();
        PendingOperations {
            puts: self.entries.len() - deletes,
            deletes,
            prefix_deletes: self.prefix_tombstones.len(),
        }
    }

    /// Copy this write set into `batch` for keyspace `kvs`
    pub fn append_to(&self, kvs: KvsId, batch: &mut CommitBatch) {
        batch
            .prefix_deletes
            .extend(self.prefix_tombstones.iter().map(|p| (kvs, p.clone())));
        batch
            .mutations
            .extend(self.entries.iter().map(|(k, m)| (kvs, k.clone(), m.clone())));
    }
}

/// Ordered iterator over a write set's entries
#[derive(Debug)]
pub struct WriteSetScan<'a> {
    range: Range<'a, Key, Mutation>,
    direction: Direction,
}

impl<'a> Iterator for WriteSetScan<'a> {
    type Item = (&'a Key, &'a Mutation);

    fn next(&mut self) -> Option<Self::Item> {
        match self.direction {
            Direction::Forward => self.range.next(),
            Direction::Reverse => self.range.next_back(),
        }
    }
}
