//! MemStore: in-memory MVCC implementation of `VersionedStore`
//!
//! This module implements the versioned store contract using:
//! - `BTreeMap<Key, VersionChain>` per keyspace for ordered snapshot scans
//! - `parking_lot::RwLock` around all keyspaces
//! - `AtomicU64` for the latest fully applied commit seqno
//! - `SnapshotRegistry` to pin snapshots against version GC
//!
//! # Atomic publication
//!
//! `publish` validates, allocates its commit seqno and applies every
//! mutation while holding the write lock. Every read holds the read lock.
//! A reader at snapshot `S` therefore sees a commit with seqno `<= S` in full
//! or not at all.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use kvdb_core::{
    CommitBatch, Direction, Key, KvdbError, KvdbResult, KvsId, RangeScan, SequenceClock,
    SequenceNumber, VersionedStore,
};

use crate::chain::VersionChain;
use crate::registry::SnapshotRegistry;

type Tree = BTreeMap<Key, VersionChain>;

/// Outcome of one version GC pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Oldest seqno any reader may still use
    pub horizon: SequenceNumber,
    /// Versions removed from chains
    pub versions_pruned: usize,
    /// Keys whose chain became empty and was removed
    pub keys_reclaimed: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    trees: FxHashMap<KvsId, Tree>,
    next_kvs_id: u32,
}

impl StoreInner {
    fn tree(&self, kvs: KvsId) -> KvdbResult<&Tree> {
        self.trees
            .get(&kvs)
            .ok_or_else(|| KvdbError::not_found(format!("keyspace {}", kvs)))
    }

    /// First-committer-wins check against commits newer than `snapshot`
    fn validate(&self, batch: &CommitBatch, snapshot: SequenceNumber) -> KvdbResult<()> {
        let conflict = |key: &Key, committed: SequenceNumber| KvdbError::Conflict {
            key: key.clone(),
            snapshot_seqno: snapshot,
            committed_seqno: committed,
        };

        for (kvs, prefix) in &batch.prefix_deletes {
            for (key, chain) in prefix_range(self.tree(*kvs)?, prefix) {
                if let Some(committed) = chain.latest_seqno().filter(|c| !snapshot.sees(*c)) {
                    return Err(conflict(key, committed));
                }
            }
        }
        for (kvs, key, _) in &batch.mutations {
            let tree = self.tree(*kvs)?;
            if let Some(committed) = tree
                .get(key)
                .and_then(VersionChain::latest_seqno)
                .filter(|c| !snapshot.sees(*c))
            {
                return Err(conflict(key, committed));
            }
        }
        Ok(())
    }

    fn apply(&mut self, batch: &CommitBatch, commit: SequenceNumber) {
        for (kvs, prefix) in &batch.prefix_deletes {
            let Some(tree) = self.trees.get_mut(kvs) else {
                continue;
            };
            for (_, chain) in tree
                .range_mut(Key::from(prefix.as_slice())..)
                .take_while(|(k, _)| k.starts_with(prefix))
            {
                if chain.is_live() {
                    chain.push(commit, None);
                }
            }
        }
        for (kvs, key, mutation) in &batch.mutations {
            let Some(tree) = self.trees.get_mut(kvs) else {
                continue;
            };
            let value = mutation.value().map(<[u8]>::to_vec);
            match tree.get_mut(key) {
                Some(chain) => chain.push(commit, value),
                None => {
                    tree.insert(key.clone(), VersionChain::new(commit, value));
                }
            }
        }
    }
}

fn prefix_range<'a>(
    tree: &'a Tree,
    prefix: &'a [u8],
) -> impl Iterator<Item = (&'a Key, &'a VersionChain)> {
    tree.range(Key::from(prefix)..)
        .take_while(move |(k, _)| k.starts_with(prefix))
}

/// In-memory versioned store
///
/// Thread-safe through `parking_lot::RwLock` and `AtomicU64`. Keyspace ids
/// are never reused, so a dropped and re-created keyspace starts empty.
pub struct MemStore {
    inner: RwLock<StoreInner>,
    /// Highest commit seqno whose batch is fully applied
    latest_committed: AtomicU64,
    registry: SnapshotRegistry,
}

impl MemStore {
    /// Create an empty store with no keyspaces
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            latest_committed: AtomicU64::new(0),
            registry: SnapshotRegistry::new(),
        }
    }

    /// Create a keyspace and return its id
    ///
    /// # Errors
    /// Returns `InvalidState` if the id space is exhausted.
    pub fn create_kvs(&self) -> KvdbResult<KvsId> {
        let mut inner = self.inner.write();
        let id = KvsId::new(inner.next_kvs_id);
        inner.next_kvs_id = inner
            .next_kvs_id
            .checked_add(1)
            .ok_or_else(|| KvdbError::invalid_state("keyspace ids exhausted"))?;
        inner.trees.insert(id, Tree::new());
        debug!(kvs = %id, "created keyspace");
        Ok(id)
    }

    /// Remove a keyspace and every version it holds
    ///
    /// # Errors
    /// Returns `NotFound` if the keyspace does not exist.
    pub fn drop_kvs(&self, kvs: KvsId) -> KvdbResult<()> {
        let removed = self.inner.write().trees.remove(&kvs);
        match removed {
            Some(tree) => {
                debug!(kvs = %kvs, keys = tree.len(), "dropped keyspace");
                Ok(())
            }
            None => Err(KvdbError::not_found(format!("keyspace {}", kvs))),
        }
    }

    /// Check if a keyspace exists
    pub fn contains_kvs(&self, kvs: KvsId) -> bool {
        self.inner.read().trees.contains_key(&kvs)
    }

    /// Number of keyspaces
    pub fn kvs_count(&self) -> usize {
        self.inner.read().trees.len()
    }

    /// Number of keys with at least one stored version (tombstones included)
    pub fn key_count(&self, kvs: KvsId) -> KvdbResult<usize> {
        Ok(self.inner.read().tree(kvs)?.len())
    }

    /// Total number of stored versions across all keyspaces
    pub fn version_count(&self) -> usize {
        self.inner
            .read()
            .trees
            .values()
            .flat_map(|tree| tree.values())
            .map(VersionChain::version_count)
            .sum()
    }

    /// The snapshot registry
    pub fn registry(&self) -> &SnapshotRegistry {
        &self.registry
    }

    /// Lazy ordered scan over `kvs` at `seqno`
    pub fn range_scan(
        &self,
        kvs: KvsId,
        from: Bound<Key>,
        direction: Direction,
        seqno: SequenceNumber,
    ) -> RangeScan<'_> {
        RangeScan::new(self, kvs, from, direction, seqno)
    }

    /// Prune versions that no registered snapshot can observe
    ///
    /// The horizon is the oldest registered seqno, or the latest committed
    /// seqno when nothing is registered. The registry lock is held for the
    /// whole pass, so no snapshot older than the horizon can appear meanwhile.
    pub fn gc(&self) -> GcStats {
        self.registry.with_oldest(|oldest| {
            let latest = self.latest_committed_seqno();
            let horizon = oldest.map_or(latest, |o| o.min(latest));
            let mut stats = GcStats {
                horizon,
                ..GcStats::default()
            };

            let mut inner = self.inner.write();
            for tree in inner.trees.values_mut() {
                tree.retain(|_, chain| {
                    stats.versions_pruned += chain.gc(horizon);
                    if chain.is_empty() {
                        stats.keys_reclaimed += 1;
                        false
                    } else {
                        true
                    }
                });
            }
            debug!(
                horizon = %horizon,
                versions_pruned = stats.versions_pruned,
                keys_reclaimed = stats.keys_reclaimed,
                "version gc"
            );
            stats
        })
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore")
            .field("kvs_count", &self.kvs_count())
            .field("latest_committed", &self.latest_committed_seqno())
            .field("registered_snapshots", &self.registry.total())
            .finish()
    }
}

impl VersionedStore for MemStore {
    fn point_lookup(
        &self,
        kvs: KvsId,
        key: &Key,
        seqno: SequenceNumber,
    ) -> KvdbResult<Option<Vec<u8>>> {
        let inner = self.inner.read();
        Ok(inner
            .tree(kvs)?
            .get(key)
            .and_then(|chain| chain.visible_value(seqno))
            .map(<[u8]>::to_vec))
    }

    fn next_visible(
        &self,
        kvs: KvsId,
        from: Bound<&Key>,
        direction: Direction,
        seqno: SequenceNumber,
    ) -> KvdbResult<Option<(Key, Vec<u8>)>> {
        let inner = self.inner.read();
        let tree = inner.tree(kvs)?;
        let visible = |(k, chain): (&Key, &VersionChain)| {
            chain.visible_value(seqno).map(|v| (k.clone(), v.to_vec()))
        };
        Ok(match direction {
            Direction::Forward => tree.range((from, Bound::Unbounded)).find_map(visible),
            Direction::Reverse => tree.range((Bound::Unbounded, from)).rev().find_map(visible),
        })
    }

    fn publish(&self, batch: &CommitBatch, clock: &SequenceClock) -> KvdbResult<SequenceNumber> {
        let mut inner = self.inner.write();

        for kvs in batch
            .prefix_deletes
            .iter()
            .map(|(kvs, _)| kvs)
            .chain(batch.mutations.iter().map(|(kvs, _, _)| kvs))
        {
            inner.tree(*kvs)?;
        }
        if let Some(snapshot) = batch.snapshot_seqno {
            inner.validate(batch, snapshot)?;
        }

        let commit = clock.next()?;
        inner.apply(batch, commit);
        self.latest_committed.store(commit.as_u64(), Ordering::Release);

        trace!(
            commit_seqno = %commit,
            mutations = batch.mutations.len(),
            prefix_deletes = batch.prefix_deletes.len(),
            "published batch"
        );
        Ok(commit)
    }

    fn latest_committed_seqno(&self) -> SequenceNumber {
        SequenceNumber::new(self.latest_committed.load(Ordering::Acquire))
    }

    fn register_latest(&self) -> SequenceNumber {
        let latest = &self.latest_committed;
        self.registry
            .register_with(|| Ok(SequenceNumber::new(latest.load(Ordering::Acquire))))
            .unwrap_or_else(|_| self.latest_committed_seqno())
    }

    fn register_next(&self, clock: &SequenceClock) -> KvdbResult<SequenceNumber> {
        self.registry.register_with(|| clock.next())
    }

    fn register_snapshot(&self, seqno: SequenceNumber) {
        self.registry.register(seqno);
    }

    fn release_snapshot(&self, seqno: SequenceNumber) {
        self.registry.release(seqno);
    }
}
