//! User-facing transaction handle
//!
//! `KvdbTransaction` wraps a reusable `Transaction` and routes its lifecycle
//! through the database's coordinator so metrics and periodic version GC
//! stay accurate. The same handle can be begun again after it commits or
//! aborts; each begin starts a new generation.

use std::sync::Arc;

use tracing::debug;

use kvdb_concurrency::{PendingOperations, Transaction, TransactionState};
use kvdb_core::{KvdbResult, SequenceNumber};

use crate::database::Kvdb;

/// A transaction on one database
///
/// Dropping the handle while `Active` aborts the transaction. Cursors bound
/// to it keep reading, base-only, at its last snapshot.
pub struct KvdbTransaction {
    db: Arc<Kvdb>,
    txn: Arc<Transaction>,
}

impl KvdbTransaction {
    pub(crate) fn new(db: Arc<Kvdb>) -> Self {
        let txn = db.coordinator().new_transaction();
        KvdbTransaction { db, txn }
    }

    /// Transaction id, stable across generations
    pub fn id(&self) -> u64 {
        self.txn.id()
    }

    /// Begin a new generation
    ///
    /// Returns the snapshot seqno. Allowed in every state but `Active`.
    pub fn begin(&self) -> KvdbResult<SequenceNumber> {
        self.db.coordinator().begin(&self.txn)
    }

    /// Publish the pending writes atomically
    ///
    /// Returns the commit seqno, or `None` when nothing was written.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless `Active`
    /// - `Conflict` if another transaction committed a touched key after
    ///   this one's snapshot; the transaction is aborted
    pub fn commit(&self) -> KvdbResult<Option<SequenceNumber>> {
        let seqno = self.db.coordinator().commit(&self.txn)?;
        if seqno.is_some() {
            self.db.after_publish();
        }
        Ok(seqno)
    }

    /// Discard the pending writes
    pub fn abort(&self) -> KvdbResult<()> {
        self.db.coordinator().abort(&self.txn)
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.txn.state()
    }

    /// Number of times the transaction has begun
    pub fn generation(&self) -> u64 {
        self.txn.generation()
    }

    /// Snapshot seqno of the current or last generation
    pub fn snapshot_seqno(&self) -> Option<SequenceNumber> {
        self.txn.snapshot_seqno()
    }

    /// Commit seqno of the last generation, if it committed writes
    pub fn commit_seqno(&self) -> Option<SequenceNumber> {
        self.txn.commit_seqno()
    }

    /// Buffered operations of the current generation
    pub fn pending(&self) -> PendingOperations {
        self.txn.pending()
    }

    /// Why the last generation aborted
    pub fn abort_reason(&self) -> Option<String> {
        self.txn.read().abort_reason().map(str::to_string)
    }

    pub(crate) fn inner(&self) -> &Arc<Transaction> {
        &self.txn
    }

    pub(crate) fn belongs_to(&self, db: &Arc<Kvdb>) -> bool {
        Arc::ptr_eq(&self.db, db)
    }
}

impl Drop for KvdbTransaction {
    fn drop(&mut self) {
        if self.txn.state() == TransactionState::Active {
            debug!(
                target: "kvdb::txn",
                txn_id = self.txn.id(),
                generation = self.txn.generation(),
                "active transaction dropped, aborting"
            );
            let _ = self.db.coordinator().abort(&self.txn);
        }
    }
}

impl std::fmt::Debug for KvdbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvdbTransaction")
            .field("txn", &self.txn)
            .finish()
    }
}
