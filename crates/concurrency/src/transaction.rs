//! Transaction state machine
//!
//! A `Transaction` object is reusable: `begin()` re-arms a committed or
//! aborted transaction as a brand-new logical transaction with a fresh
//! snapshot seqno and empty write sets. Every `begin()` bumps the
//! `generation`, which is how cursors bound to the object detect that the
//! view they were reading has been replaced.
//!
//! ## State transitions
//!
//! ```text
//! Invalid ──begin──► Active ──commit──► Committed ──begin──► Active ...
//!                      │
//!                      └──abort / conflict──► Aborted ──begin──► Active ...
//! ```
//!
//! ## Locking
//!
//! The inner state sits behind a `parking_lot::RwLock`. Writers (mutations,
//! begin, commit, abort) take the write lock; cursors hold the read lock for
//! the duration of one read. The transaction lock is always taken before any
//! store lock.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use kvdb_core::{
    CommitBatch, Key, KvdbError, KvdbResult, KvsId, SequenceClock, SequenceNumber,
    SnapshotHandle, VersionedStore,
};

use crate::write_set::{PendingOperations, WriteSet};

/// Lifecycle state of a transaction object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Never begun
    Invalid,
    /// Accepting reads and writes
    Active,
    /// Write set published; the frozen write set stays readable
    Committed,
    /// Write set discarded, by request or after a conflict
    Aborted,
}

impl TransactionState {
    /// Whether `begin()` is legal from this state
    pub fn can_begin(&self) -> bool {
        !matches!(self, TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Invalid => "invalid",
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// State of one logical transaction, guarded by the transaction lock
#[derive(Debug)]
pub struct TransactionInner {
    state: TransactionState,
    generation: u64,
    snapshot: Option<SnapshotHandle>,
    commit_seqno: Option<SequenceNumber>,
    write_sets: BTreeMap<KvsId, WriteSet>,
    abort_reason: Option<String>,
}

impl TransactionInner {
    fn new() -> Self {
        TransactionInner {
            state: TransactionState::Invalid,
            generation: 0,
            snapshot: None,
            commit_seqno: None,
            write_sets: BTreeMap::new(),
            abort_reason: None,
        }
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of `begin()` calls so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot seqno of the current (or last) logical transaction
    pub fn snapshot_seqno(&self) -> Option<SequenceNumber> {
        self.snapshot.as_ref().map(SnapshotHandle::seqno)
    }

    /// Commit seqno, if the last commit published anything
    pub fn commit_seqno(&self) -> Option<SequenceNumber> {
        self.commit_seqno
    }

    /// The write set for `kvs`, whatever the state
    pub fn write_set(&self, kvs: KvsId) -> Option<&WriteSet> {
        self.write_sets.get(&kvs)
    }

    /// The write set a cursor should overlay on the store for `kvs`
    ///
    /// Active and committed transactions expose their write set. Aborted and
    /// never-begun transactions expose nothing.
    pub fn overlay(&self, kvs: KvsId) -> Option<&WriteSet> {
        match self.state {
            TransactionState::Active | TransactionState::Committed => self.write_set(kvs),
            TransactionState::Aborted | TransactionState::Invalid => None,
        }
    }

    /// Summary of buffered operations across all keyspaces
    pub fn pending(&self) -> PendingOperations {
        self.write_sets
            .values()
            .map(WriteSet::pending)
            .fold(PendingOperations::default(), |acc, p| acc + p)
    }

    /// Why the last logical transaction aborted
    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    fn commit_batch(&self) -> CommitBatch {
        let mut batch = CommitBatch {
            snapshot_seqno: self.snapshot_seqno(),
            ..CommitBatch::default()
        };
        for (kvs, ws) in &self.write_sets {
            ws.append_to(*kvs, &mut batch);
        }
        batch
    }
}

/// A reusable transaction object
///
/// Shared as `Arc<Transaction>` between its owner and any bound cursors.
pub struct Transaction {
    id: u64,
    inner: RwLock<TransactionInner>,
}

impl Transaction {
    /// Create a transaction in the `Invalid` state
    pub fn new(id: u64) -> Self {
        Transaction {
            id,
            inner: RwLock::new(TransactionInner::new()),
        }
    }

    /// Transaction id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Lock the transaction for reading
    ///
    /// Mutations, commit and abort block until the guard is dropped.
    pub fn read(&self) -> RwLockReadGuard<'_, TransactionInner> {
        self.inner.read()
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.inner.read().state
    }

    /// Number of `begin()` calls so far
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Snapshot seqno of the current (or last) logical transaction
    pub fn snapshot_seqno(&self) -> Option<SequenceNumber> {
        self.inner.read().snapshot_seqno()
    }

    /// Commit seqno of the last successful commit that published anything
    pub fn commit_seqno(&self) -> Option<SequenceNumber> {
        self.inner.read().commit_seqno
    }

    /// Summary of buffered operations
    pub fn pending(&self) -> PendingOperations {
        self.inner.read().pending()
    }

    /// Start a new logical transaction
    ///
    /// Allocates the snapshot seqno from `clock` and pins it in `store`.
    /// The registration is held until the next `begin()` or until the
    /// transaction is dropped, so a committed or aborted transaction keeps
    /// its snapshot readable for bound cursors.
    ///
    /// # Errors
    /// - `InvalidState` if the transaction is `Active`
    /// - `ClockExhausted` if no seqno can be allocated
    pub fn begin(
        &self,
        clock: &SequenceClock,
        store: &Arc<dyn VersionedStore>,
    ) -> KvdbResult<SequenceNumber> {
        let mut inner = self.inner.write();
        if !inner.state.can_begin() {
            return Err(KvdbError::invalid_state(format!(
                "Cannot begin transaction {}: already active",
                self.id
            )));
        }

        let snapshot = SnapshotHandle::next(Arc::clone(store), clock)?;
        let seqno = snapshot.seqno();
        inner.snapshot = Some(snapshot);
        inner.generation += 1;
        inner.state = TransactionState::Active;
        inner.commit_seqno = None;
        inner.abort_reason = None;
        inner.write_sets.clear();

        debug!(
            target: "kvdb::txn",
            txn_id = self.id,
            generation = inner.generation,
            snapshot_seqno = %seqno,
            "transaction begun"
        );
        Ok(seqno)
    }

    /// Buffer a put
    ///
    /// # Errors
    /// Returns `InvalidState` unless the transaction is `Active`.
    pub fn put(&self, kvs: KvsId, key: Key, value: Vec<u8>) -> KvdbResult<()> {
        self.with_write_set(kvs, |ws| ws.put(key, value))
    }

    /// Buffer a delete
    ///
    /// # Errors
    /// Returns `InvalidState` unless the transaction is `Active`.
    pub fn delete(&self, kvs: KvsId, key: Key) -> KvdbResult<()> {
        self.with_write_set(kvs, |ws| ws.delete(key))
    }

    /// Buffer a prefix delete
    ///
    /// # Errors
    /// Returns `InvalidState` unless the transaction is `Active`.
    pub fn prefix_delete(&self, kvs: KvsId, prefix: Vec<u8>) -> KvdbResult<()> {
        self.with_write_set(kvs, |ws| ws.prefix_delete(prefix))
    }

    fn with_write_set(&self, kvs: KvsId, f: impl FnOnce(&mut WriteSet)) -> KvdbResult<()> {
        let mut inner = self.inner.write();
        self.ensure_active(&inner)?;
        f(inner.write_sets.entry(kvs).or_default());
        Ok(())
    }

    fn ensure_active(&self, inner: &TransactionInner) -> KvdbResult<()> {
        if inner.state == TransactionState::Active {
            Ok(())
        } else {
            Err(KvdbError::invalid_state(format!(
                "Transaction {} is not active: {}",
                self.id, inner.state
            )))
        }
    }

    /// Publish the write set atomically
    ///
    /// Returns the commit seqno, or `None` for a transaction with nothing to
    /// publish (no seqno is consumed in that case).
    ///
    /// On any publication failure the transaction is `Aborted`, its write set
    /// is discarded and the store is unchanged.
    ///
    /// # Errors
    /// - `InvalidState` unless the transaction is `Active`
    /// - `Conflict` if another transaction committed a touched key after our snapshot
    /// - `ClockExhausted` if no commit seqno can be allocated
    pub fn commit(
        &self,
        clock: &SequenceClock,
        store: &dyn VersionedStore,
    ) -> KvdbResult<Option<SequenceNumber>> {
        let mut inner = self.inner.write();
        self.ensure_active(&inner)?;

        let batch = inner.commit_batch();
        if batch.is_empty() {
            inner.state = TransactionState::Committed;
            debug!(target: "kvdb::txn", txn_id = self.id, "read-only transaction committed");
            return Ok(None);
        }

        match store.publish(&batch, clock) {
            Ok(commit_seqno) => {
                inner.state = TransactionState::Committed;
                inner.commit_seqno = Some(commit_seqno);
                info!(
                    target: "kvdb::txn",
                    txn_id = self.id,
                    generation = inner.generation,
                    snapshot_seqno = ?inner.snapshot_seqno(),
                    commit_seqno = %commit_seqno,
                    operations = batch.len(),
                    "transaction committed"
                );
                Ok(Some(commit_seqno))
            }
            Err(e) => {
                warn!(
                    target: "kvdb::txn",
                    txn_id = self.id,
                    generation = inner.generation,
                    error = %e,
                    "commit failed, transaction aborted"
                );
                Self::mark_aborted(&mut inner, e.to_string());
                Err(e)
            }
        }
    }

    /// Discard the write set
    ///
    /// # Errors
    /// Returns `InvalidState` unless the transaction is `Active`.
    pub fn abort(&self) -> KvdbResult<()> {
        let mut inner = self.inner.write();
        self.ensure_active(&inner)?;
        warn!(
            target: "kvdb::txn",
            txn_id = self.id,
            generation = inner.generation,
            pending = inner.pending().total(),
            "transaction aborted"
        );
        Self::mark_aborted(&mut inner, "aborted by caller".to_string());
        Ok(())
    }

    fn mark_aborted(inner: &mut TransactionInner, reason: String) {
        inner.state = TransactionState::Aborted;
        inner.write_sets.clear();
        inner.abort_reason = Some(reason);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("snapshot_seqno", &inner.snapshot_seqno())
            .finish()
    }
}
