//! Transaction manager
//!
//! Owns the injected `SequenceClock` and the store handle, allocates
//! transaction ids, and drives the commit protocol:
//!
//! ```text
//! 1. Transaction::commit() takes the transaction write lock
//! 2. The write set is flattened into a CommitBatch
//! 3. VersionedStore::publish() validates (first-committer-wins), allocates
//!    the commit seqno and applies the batch in one critical section
//! 4. Committed on success; Aborted with the write set discarded on failure
//! ```
//!
//! Single-operation writes outside any transaction go through
//! `auto_commit`, which publishes without validation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use kvdb_core::{
    CommitBatch, KvdbResult, SequenceClock, SequenceNumber, SnapshotHandle, VersionedStore,
};

use crate::transaction::{Transaction, TransactionState};

/// Coordinates transaction lifecycle against one store and one clock
pub struct TransactionManager {
    clock: Arc<SequenceClock>,
    store: Arc<dyn VersionedStore>,
    /// Next transaction ID
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Create a manager over `store`, drawing seqnos from `clock`
    pub fn new(clock: Arc<SequenceClock>, store: Arc<dyn VersionedStore>) -> Self {
        Self::with_txn_id(clock, store, 0)
    }

    /// Create a manager whose first transaction id is `max_txn_id + 1`
    pub fn with_txn_id(
        clock: Arc<SequenceClock>,
        store: Arc<dyn VersionedStore>,
        max_txn_id: u64,
    ) -> Self {
        TransactionManager {
            clock,
            store,
            next_txn_id: AtomicU64::new(max_txn_id + 1),
        }
    }

    /// The sequence clock
    pub fn clock(&self) -> &Arc<SequenceClock> {
        &self.clock
    }

    /// The store transactions publish into
    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    /// Allocate the next transaction id
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Create a transaction object in the `Invalid` state
    pub fn new_transaction(&self) -> Arc<Transaction> {
        Arc::new(Transaction::new(self.next_txn_id()))
    }

    /// Begin (or re-begin) `txn`
    pub fn begin(&self, txn: &Transaction) -> KvdbResult<SequenceNumber> {
        txn.begin(&self.clock, &self.store)
    }

    /// Commit `txn`
    ///
    /// See [`Transaction::commit`].
    pub fn commit(&self, txn: &Transaction) -> KvdbResult<Option<SequenceNumber>> {
        txn.commit(&self.clock, self.store.as_ref())
    }

    /// Abort `txn`
    pub fn abort(&self, txn: &Transaction) -> KvdbResult<()> {
        txn.abort()
    }

    /// Commit, making sure the transaction ends up aborted if commit fails
    ///
    /// `Transaction::commit` already aborts on publication failure. This also
    /// covers a commit rejected before publication while still `Active`.
    pub fn commit_or_rollback(&self, txn: &Transaction) -> KvdbResult<Option<SequenceNumber>> {
        match self.commit(txn) {
            Ok(seqno) => Ok(seqno),
            Err(e) => {
                if txn.state() == TransactionState::Active {
                    let _ = txn.abort();
                }
                Err(e)
            }
        }
    }

    /// Publish a batch outside any transaction
    ///
    /// No conflict validation is performed.
    pub fn auto_commit(&self, mut batch: CommitBatch) -> KvdbResult<SequenceNumber> {
        batch.snapshot_seqno = None;
        let seqno = self.store.publish(&batch, &self.clock)?;
        debug!(
            target: "kvdb::txn",
            commit_seqno = %seqno,
            operations = batch.len(),
            "auto-commit"
        );
        Ok(seqno)
    }

    /// Pin the latest committed seqno
    pub fn snapshot(&self) -> SnapshotHandle {
        SnapshotHandle::latest(Arc::clone(&self.store))
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("clock", &self.clock.current())
            .field("latest_committed", &self.store.latest_committed_seqno())
            .field("next_txn_id", &self.next_txn_id.load(Ordering::Relaxed))
            .finish()
    }
}
