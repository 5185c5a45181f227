//! Keyspace handle
//!
//! Every operation takes an optional transaction. With a transaction, writes
//! buffer in its write set and reads see its pending writes; without one,
//! writes are published immediately and reads see the latest commit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kvdb_concurrency::Lookup;
use kvdb_core::{
    CommitBatch, Key, KvdbError, KvdbResult, KvsId, KvsName, Mutation, SnapshotHandle,
    VersionedStore,
};

use crate::cursor::{CursorOptions, KvsCursor};
use crate::database::Kvdb;
use crate::transaction::KvdbTransaction;

/// Per-keyspace parameters fixed at creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvsParams {
    /// Writes must carry a transaction; transactional writes are rejected
    /// on keyspaces without this flag.
    pub transactions_enabled: bool,
}

impl KvsParams {
    /// Parameters for a keyspace that requires transactions
    pub fn transactional() -> Self {
        KvsParams {
            transactions_enabled: true,
        }
    }
}

/// Handle to a named keyspace
#[derive(Clone)]
pub struct Kvs {
    db: Arc<Kvdb>,
    name: KvsName,
    id: KvsId,
    params: KvsParams,
}

impl Kvs {
    pub(crate) fn new(db: Arc<Kvdb>, name: KvsName, id: KvsId, params: KvsParams) -> Self {
        Kvs {
            db,
            name,
            id,
            params,
        }
    }

    /// Keyspace name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Store identity of the keyspace
    pub fn id(&self) -> KvsId {
        self.id
    }

    /// Parameters fixed at creation
    pub fn params(&self) -> KvsParams {
        self.params
    }

    /// The owning database
    pub fn db(&self) -> &Arc<Kvdb> {
        &self.db
    }

    /// Set `key` to `value`
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the key or value violates a limit, or the
    ///   transaction requirement of the keyspace is not met
    /// - `InvalidState` if `txn` is not active
    /// - `NotFound` if the keyspace was dropped
    pub fn put(&self, txn: Option<&KvdbTransaction>, key: &[u8], value: &[u8]) -> KvdbResult<()> {
        let limits = self.db.limits();
        limits.validate_key(key)?;
        limits.validate_value(value)?;

        match self.writer(txn)? {
            Some(txn) => txn.inner().put(self.id, Key::from(key), value.to_vec()),
            None => self.publish_one(Key::from(key), Mutation::Put(value.to_vec())),
        }
    }

    /// Delete `key`
    ///
    /// Deleting an absent key is not an error.
    pub fn delete(&self, txn: Option<&KvdbTransaction>, key: &[u8]) -> KvdbResult<()> {
        self.db.limits().validate_key(key)?;

        match self.writer(txn)? {
            Some(txn) => txn.inner().delete(self.id, Key::from(key)),
            None => self.publish_one(Key::from(key), Mutation::Delete),
        }
    }

    /// Delete every key starting with `prefix`
    pub fn prefix_delete(&self, txn: Option<&KvdbTransaction>, prefix: &[u8]) -> KvdbResult<()> {
        self.db.limits().validate_prefix(prefix)?;

        match self.writer(txn)? {
            Some(txn) => txn.inner().prefix_delete(self.id, prefix.to_vec()),
            None => {
                let batch = CommitBatch {
                    prefix_deletes: vec![(self.id, prefix.to_vec())],
                    ..CommitBatch::default()
                };
                self.db.auto_commit(batch).map(|_| ())
            }
        }
    }

    /// Get the value of `key`
    ///
    /// With a transaction, its pending writes win over the store, which is
    /// read at the transaction's snapshot. Without one, the latest commit is
    /// read.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if `txn` has never begun
    /// - `NotFound` if the keyspace was dropped
    pub fn get(&self, txn: Option<&KvdbTransaction>, key: &[u8]) -> KvdbResult<Option<Vec<u8>>> {
        self.db.limits().validate_key(key)?;
        self.ensure_open()?;
        let key = Key::from(key);

        match txn {
            Some(txn) => {
                self.ensure_same_db(txn)?;
                let inner = txn.inner().read();
                let seqno = inner.snapshot_seqno().ok_or_else(|| {
                    KvdbError::invalid_state(format!(
                        "Transaction {} has never begun",
                        txn.id()
                    ))
                })?;
                if let Some(ws) = inner.overlay(self.id) {
                    match ws.lookup(&key) {
                        Lookup::Put(value) => return Ok(Some(value.to_vec())),
                        Lookup::Delete => return Ok(None),
                        Lookup::Absent => {}
                    }
                }
                self.db.store().point_lookup(self.id, &key, seqno)
            }
            None => {
                let snapshot = SnapshotHandle::latest(self.db.shared_store());
                self.db.store().point_lookup(self.id, &key, snapshot.seqno())
            }
        }
    }

    /// Create a cursor over this keyspace
    pub fn cursor(&self, options: CursorOptions<'_>) -> KvdbResult<KvsCursor> {
        KvsCursor::new(self.clone(), options)
    }

    /// Check the transaction requirement and pick the write path
    fn writer<'t>(
        &self,
        txn: Option<&'t KvdbTransaction>,
    ) -> KvdbResult<Option<&'t KvdbTransaction>> {
        self.ensure_open()?;
        match txn {
            Some(txn) if !self.params.transactions_enabled => Err(KvdbError::invalid_input(
                format!(
                    "KVS '{}' is not transactional; transaction {} cannot write to it",
                    self.name,
                    txn.id()
                ),
            )),
            Some(txn) => {
                self.ensure_same_db(txn)?;
                Ok(Some(txn))
            }
            None if self.params.transactions_enabled => Err(KvdbError::invalid_input(format!(
                "KVS '{}' requires a transaction for writes",
                self.name
            ))),
            None => Ok(None),
        }
    }

    fn publish_one(&self, key: Key, mutation: Mutation) -> KvdbResult<()> {
        let batch = CommitBatch {
            mutations: vec![(self.id, key, mutation)],
            ..CommitBatch::default()
        };
        self.db.auto_commit(batch).map(|_| ())
    }

    pub(crate) fn ensure_open(&self) -> KvdbResult<()> {
        self.db.ensure_kvs(&self.name, self.id)
    }

    pub(crate) fn ensure_same_db(&self, txn: &KvdbTransaction) -> KvdbResult<()> {
        if txn.belongs_to(&self.db) {
            Ok(())
        } else {
            Err(KvdbError::invalid_input(format!(
                "Transaction {} belongs to another database",
                txn.id()
            )))
        }
    }

    pub(crate) fn store(&self) -> &dyn VersionedStore {
        self.db.store()
    }
}

impl std::fmt::Debug for Kvs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kvs")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("params", &self.params)
            .finish()
    }
}
