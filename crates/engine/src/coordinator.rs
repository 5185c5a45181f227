//! Lifecycle bookkeeping around the transaction manager
//!
//! Every begin, commit and abort issued by the engine goes through here, so
//! the counters reflect what callers did. The publication counter also
//! covers auto-commit writes and is what schedules periodic version GC.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kvdb_concurrency::{Transaction, TransactionManager, TransactionState};
use kvdb_core::{CommitBatch, KvdbResult, SequenceClock, SequenceNumber, VersionedStore};
use tracing::debug;

/// Counts transactions in flight and their outcomes
///
/// Counters are Relaxed; nothing synchronizes through them.
pub struct TransactionCoordinator {
    manager: TransactionManager,
    /// Begun and not yet committed or aborted
    active_count: AtomicU64,
    /// Total transactions begun (re-begins included)
    total_started: AtomicU64,
    total_committed: AtomicU64,
    /// Total transactions aborted, by caller or by failed commit
    total_aborted: AtomicU64,
    /// Batches published, transactional and auto-commit
    publications: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a coordinator over `store`, drawing seqnos from `clock`
    pub fn new(clock: Arc<SequenceClock>, store: Arc<dyn VersionedStore>) -> Self {
        Self {
            manager: TransactionManager::new(clock, store),
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
            publications: AtomicU64::new(0),
        }
    }

    /// Create a transaction object in the `Invalid` state
    pub fn new_transaction(&self) -> Arc<Transaction> {
        self.manager.new_transaction()
    }

    /// Begin (or re-begin) `txn`
    pub fn begin(&self, txn: &Transaction) -> KvdbResult<SequenceNumber> {
        let seqno = self.manager.begin(txn)?;
        self.record_start();
        Ok(seqno)
    }

    /// Commit `txn`, recording the outcome
    ///
    /// Returns the commit seqno, or `None` when there was nothing to publish.
    pub fn commit(&self, txn: &Transaction) -> KvdbResult<Option<SequenceNumber>> {
        let was_active = txn.state() == TransactionState::Active;
        match self.manager.commit(txn) {
            Ok(seqno) => {
                self.record_commit();
                if seqno.is_some() {
                    self.publications.fetch_add(1, Ordering::Relaxed);
                }
                Ok(seqno)
            }
            Err(e) => {
                // Only a conflict moves an active transaction to aborted
                if was_active && txn.state() == TransactionState::Aborted {
                    self.record_abort();
                }
                Err(e)
            }
        }
    }

    /// Abort `txn`, recording the outcome
    pub fn abort(&self, txn: &Transaction) -> KvdbResult<()> {
        self.manager.abort(txn)?;
        self.record_abort();
        Ok(())
    }

    /// Publish a single-operation batch outside any transaction
    pub fn auto_commit(&self, batch: CommitBatch) -> KvdbResult<SequenceNumber> {
        let seqno = self.manager.auto_commit(batch)?;
        self.publications.fetch_add(1, Ordering::Relaxed);
        Ok(seqno)
    }

    /// Batches published so far
    pub fn publications(&self) -> u64 {
        self.publications.load(Ordering::Relaxed)
    }

    /// Count a begin
    pub fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "kvdb::txn",
            active = self.active_count.load(Ordering::Relaxed),
            "transaction started"
        );
    }

    /// Count a successful commit
    pub fn record_commit(&self) {
        self.decrement_active();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an abort
    pub fn record_abort(&self) {
        self.decrement_active();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement_active(&self) {
        // Stays at zero rather than wrapping
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Latest committed seqno of the store
    pub fn latest_committed_seqno(&self) -> SequenceNumber {
        self.manager.store().latest_committed_seqno()
    }

    /// Number of transactions currently active
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters
    pub fn metrics(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);
        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            commit_rate: ratio(committed, started),
        }
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("manager", &self.manager)
            .field("metrics", &self.metrics())
            .finish()
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Transaction counters at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// In flight right now
    pub active_count: u64,
    /// Begins, re-begins included
    pub total_started: u64,
    /// Commits that succeeded, read-only ones included
    pub total_committed: u64,
    /// Caller aborts, drop aborts and failed commits
    pub total_aborted: u64,
    /// `total_committed / total_started`
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Begins that reached an outcome
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// `total_aborted / total_started`
    pub fn abort_rate(&self) -> f64 {
        ratio(self.total_aborted, self.total_started)
    }
}
