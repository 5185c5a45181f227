//! The versioned store contract
//!
//! This module defines the `VersionedStore` trait: the interface through which
//! transactions and cursors consume the committed keyspace. The physical store
//! (a compaction tree in a full engine, `MemStore` in this workspace) is an
//! external collaborator; nothing above this trait knows how it is organized.
//!
//! # Contract
//!
//! - Reads are *snapshot reads*: for a sequence number `S`, a key is visible
//!   iff its newest commit at or before `S` is a put.
//! - `publish` applies a whole batch at one commit sequence number, and the
//!   batch becomes visible en bloc: a reader at `S` sees all of it or none.
//! - Snapshot registrations pin the versions visible at a seqno against
//!   version garbage collection until released.

use std::ops::Bound;
use std::sync::Arc;

use crate::clock::SequenceClock;
use crate::error::KvdbResult;
use crate::types::{Direction, Key, KvsId, Mutation, SequenceNumber};

/// A write set flattened for publication
///
/// Prefix deletes are applied before key mutations, so a put that followed
/// a prefix delete in the transaction survives it.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    /// Snapshot the writer read from
    ///
    /// `Some(s)` enables first-committer-wins validation: the batch conflicts
    /// if any touched key has a commit newer than `s`. `None` publishes blindly
    /// (single-operation auto-commit).
    pub snapshot_seqno: Option<SequenceNumber>,
    /// Prefix tombstones, per keyspace
    pub prefix_deletes: Vec<(KvsId, Vec<u8>)>,
    /// Key mutations, per keyspace
    pub mutations: Vec<(KvsId, Key, Mutation)>,
}

impl CommitBatch {
    /// Total number of operations in the batch
    pub fn len(&self) -> usize {
        self.prefix_deletes.len() + self.mutations.len()
    }

    /// Check if the batch carries no operations
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Versioned store abstraction
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait VersionedStore: Send + Sync {
    /// Get the value of `key` as of `seqno`
    ///
    /// Returns `None` if the key never existed at or before `seqno`, or if its
    /// newest version at or before `seqno` is a tombstone.
    ///
    /// # Errors
    /// Returns `NotFound` if `kvs` does not exist.
    fn point_lookup(
        &self,
        kvs: KvsId,
        key: &Key,
        seqno: SequenceNumber,
    ) -> KvdbResult<Option<Vec<u8>>>;

    /// Get the first key visible at `seqno` starting from `from` in `direction`
    ///
    /// This is the single step of an ordered range scan. `Bound::Included(k)`
    /// admits `k` itself; `Bound::Excluded(k)` starts strictly past `k`;
    /// `Bound::Unbounded` starts at the first key in `direction`.
    ///
    /// # Errors
    /// Returns `NotFound` if `kvs` does not exist.
    fn next_visible(
        &self,
        kvs: KvsId,
        from: Bound<&Key>,
        direction: Direction,
        seqno: SequenceNumber,
    ) -> KvdbResult<Option<(Key, Vec<u8>)>>;

    /// Publish a batch atomically
    ///
    /// Validation (if `batch.snapshot_seqno` is set), allocation of the commit
    /// seqno from `clock`, and application of every operation happen in one
    /// critical section.
    ///
    /// # Errors
    /// - `Conflict` if validation fails; the store is unchanged
    /// - `NotFound` if a referenced keyspace does not exist; the store is unchanged
    /// - `ClockExhausted` if no commit seqno can be allocated
    fn publish(&self, batch: &CommitBatch, clock: &SequenceClock) -> KvdbResult<SequenceNumber>;

    /// Highest commit seqno whose batch is fully applied
    fn latest_committed_seqno(&self) -> SequenceNumber;

    /// Pin the latest committed seqno and return it
    ///
    /// Reading the seqno and registering it are one atomic step with respect
    /// to version garbage collection.
    fn register_latest(&self) -> SequenceNumber;

    /// Allocate a fresh seqno from `clock` and pin it
    ///
    /// # Errors
    /// Returns `ClockExhausted` if the clock is exhausted.
    fn register_next(&self, clock: &SequenceClock) -> KvdbResult<SequenceNumber>;

    /// Add a registration for an already pinned seqno
    fn register_snapshot(&self, seqno: SequenceNumber);

    /// Drop one registration of `seqno`
    fn release_snapshot(&self, seqno: SequenceNumber);
}

/// Lazy ordered scan over a store snapshot
///
/// Each call to `next()` performs one `next_visible` step past the last
/// returned key. Nothing is materialized, and no store lock is held between
/// steps.
pub struct RangeScan<'a> {
    store: &'a dyn VersionedStore,
    kvs: KvsId,
    from: Bound<Key>,
    direction: Direction,
    seqno: SequenceNumber,
    done: bool,
}

impl<'a> RangeScan<'a> {
    /// Create a scan over `kvs` at `seqno` starting from `from`
    pub fn new(
        store: &'a dyn VersionedStore,
        kvs: KvsId,
        from: Bound<Key>,
        direction: Direction,
        seqno: SequenceNumber,
    ) -> Self {
        RangeScan {
            store,
            kvs,
            from,
            direction,
            seqno,
            done: false,
        }
    }
}

impl<'a> Iterator for RangeScan<'a> {
    type Item = KvdbResult<(Key, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self
            .store
            .next_visible(self.kvs, self.from.as_ref(), self.direction, self.seqno)
        {
            Ok(Some((key, value))) => {
                self.from = Bound::Excluded(key.clone());
                Some(Ok((key, value)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Registration of a snapshot seqno, released on drop
///
/// Holders keep the versions visible at `seqno` readable. `release()` is
/// idempotent; dropping an unreleased handle releases it.
pub struct SnapshotHandle {
    store: Arc<dyn VersionedStore>,
    seqno: SequenceNumber,
    released: bool,
}

impl SnapshotHandle {
    /// Pin the store's latest committed seqno
    pub fn latest(store: Arc<dyn VersionedStore>) -> Self {
        let seqno = store.register_latest();
        SnapshotHandle {
            store,
            seqno,
            released: false,
        }
    }

    /// Allocate a fresh seqno from `clock` and pin it
    ///
    /// # Errors
    /// Returns `ClockExhausted` if the clock is exhausted.
    pub fn next(store: Arc<dyn VersionedStore>, clock: &SequenceClock) -> KvdbResult<Self> {
        let seqno = store.register_next(clock)?;
        Ok(SnapshotHandle {
            store,
            seqno,
            released: false,
        })
    }

    /// Pin an additional registration of a seqno someone else already holds
    pub fn pin(store: Arc<dyn VersionedStore>, seqno: SequenceNumber) -> Self {
        store.register_snapshot(seqno);
        SnapshotHandle {
            store,
            seqno,
            released: false,
        }
    }

    /// The pinned seqno
    pub fn seqno(&self) -> SequenceNumber {
        self.seqno
    }

    /// Release the registration now
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.store.release_snapshot(self.seqno);
        }
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("seqno", &self.seqno)
            .field("released", &self.released)
            .finish()
    }
}
