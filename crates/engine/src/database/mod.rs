//! Kvdb struct and open logic
//!
//! A `Kvdb` owns the versioned store, the sequence clock (through the
//! transaction coordinator) and the registry of named keyspaces. Handles
//! returned from it (`Kvs`, `KvdbTransaction`, `KvsCursor`) keep the
//! `Arc<Kvdb>` alive.
//!
//! ## Transaction API
//!
//! 1. **Closure API**: `db.with_transaction(|txn| { ... })`
//!    - Commit on success, abort on error
//!
//! 2. **Manual API**: `db.transaction()` + `begin()` / `commit()` / `abort()`
//!    - Required for bound cursors and transaction re-use
//!
//! Writes passed no transaction are auto-committed one at a time.

pub mod config;

pub use config::{KvdbConfig, CONFIG_FILE_NAME};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use kvdb_core::{
    CommitBatch, KvdbError, KvdbResult, KvsId, KvsName, Limits, SequenceClock, SequenceNumber,
    VersionedStore,
};
use kvdb_concurrency::TransactionState;
use kvdb_storage::{GcStats, MemStore};

use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use crate::kvs::{Kvs, KvsParams};
use crate::transaction::KvdbTransaction;

/// Registry entry of one open keyspace
#[derive(Debug, Clone, Copy)]
struct KvsEntry {
    id: KvsId,
    params: KvsParams,
}

/// An embedded transactional key-value database
pub struct Kvdb {
    /// Data directory holding `kvdb.toml`; `None` for ephemeral databases
    data_dir: Option<PathBuf>,

    /// Configuration (mirrors kvdb.toml)
    config: KvdbConfig,

    /// Limits derived from `config`
    limits: Limits,

    /// Versioned key-value storage
    store: Arc<MemStore>,

    /// Transaction lifecycle, seqno allocation and metrics
    coordinator: TransactionCoordinator,

    /// Keyspaces by name
    keyspaces: DashMap<KvsName, KvsEntry>,

    /// Serializes create and drop so the keyspace count limit holds
    ddl_lock: Mutex<()>,
}

impl Kvdb {
    /// Open a database in `path`
    ///
    /// Reads `kvdb.toml` from the data directory, creating one with defaults
    /// if missing. Data lives in memory for the lifetime of the returned
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or config file cannot be created or
    /// read, or if the config is invalid.
    pub fn open<P: AsRef<Path>>(path: P) -> KvdbResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        KvdbConfig::write_default_if_missing(&config_path)?;
        let cfg = KvdbConfig::from_file(&config_path)?;

        Ok(Self::build(Some(data_dir), cfg))
    }

    /// Open a database in `path` with an explicit configuration
    ///
    /// The supplied config is written to `kvdb.toml` so that a later
    /// `Kvdb::open()` picks up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: KvdbConfig) -> KvdbResult<Arc<Self>> {
        cfg.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        cfg.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        Ok(Self::build(Some(data_dir), cfg))
    }

    /// Create an ephemeral database with default configuration
    pub fn ephemeral() -> KvdbResult<Arc<Self>> {
        Self::with_config(KvdbConfig::default())
    }

    /// Create an ephemeral database with `cfg`
    ///
    /// # Errors
    ///
    /// Returns `KvdbError::Config` if `cfg` fails validation.
    pub fn with_config(cfg: KvdbConfig) -> KvdbResult<Arc<Self>> {
        cfg.validate()?;
        Ok(Self::build(None, cfg))
    }

    fn build(data_dir: Option<PathBuf>, config: KvdbConfig) -> Arc<Self> {
        let store = Arc::new(MemStore::new());
        let coordinator =
            TransactionCoordinator::new(Arc::new(SequenceClock::default()), store.clone());

        info!(
            target: "kvdb::db",
            data_dir = ?data_dir,
            max_kvs_count = config.max_kvs_count,
            gc_interval_commits = config.gc_interval_commits,
            "database opened"
        );

        Arc::new(Self {
            data_dir,
            limits: config.limits(),
            config,
            store,
            coordinator,
            keyspaces: DashMap::new(),
            ddl_lock: Mutex::new(()),
        })
    }

    // ========================================================================
    // Keyspaces
    // ========================================================================

    /// Default keyspace parameters from the configuration
    pub fn kvs_params(&self) -> KvsParams {
        KvsParams {
            transactions_enabled: self.config.default_transactions_enabled,
        }
    }

    /// Create keyspace `name`
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the name is malformed or the keyspace limit is reached
    /// - `AlreadyExists` if a keyspace of that name exists
    pub fn kvs_create(self: &Arc<Self>, name: &str, params: KvsParams) -> KvdbResult<Kvs> {
        let name = KvsName::new(name)?;
        let _ddl = self.ddl_lock.lock();

        if self.keyspaces.contains_key(&name) {
            return Err(KvdbError::already_exists(format!("KVS '{}'", name)));
        }
        if self.keyspaces.len() >= self.limits.max_kvs_count {
            return Err(KvdbError::invalid_input(format!(
                "Cannot create KVS '{}': limit of {} keyspaces reached",
                name, self.limits.max_kvs_count
            )));
        }

        let id = self.store.create_kvs()?;
        self.keyspaces.insert(name.clone(), KvsEntry { id, params });
        info!(
            target: "kvdb::db",
            kvs = %name,
            kvs_id = %id,
            transactions_enabled = params.transactions_enabled,
            "keyspace created"
        );
        Ok(Kvs::new(Arc::clone(self), name, id, params))
    }

    /// Open existing keyspace `name`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such keyspace exists.
    pub fn kvs_open(self: &Arc<Self>, name: &str) -> KvdbResult<Kvs> {
        let name = KvsName::new(name)?;
        let entry = self
            .keyspaces
            .get(&name)
            .map(|e| *e.value())
            .ok_or_else(|| KvdbError::not_found(format!("KVS '{}'", name)))?;
        Ok(Kvs::new(Arc::clone(self), name, entry.id, entry.params))
    }

    /// Drop keyspace `name` and all its data
    ///
    /// Outstanding handles to the keyspace fail with `NotFound` afterwards.
    /// Transactions holding writes to it fail at commit.
    pub fn kvs_drop(&self, name: &str) -> KvdbResult<()> {
        let name = KvsName::new(name)?;
        let _ddl = self.ddl_lock.lock();

        let (_, entry) = self
            .keyspaces
            .remove(&name)
            .ok_or_else(|| KvdbError::not_found(format!("KVS '{}'", name)))?;
        self.store.drop_kvs(entry.id)?;
        info!(target: "kvdb::db", kvs = %name, kvs_id = %entry.id, "keyspace dropped");
        Ok(())
    }

    /// Names of all keyspaces, sorted
    pub fn kvs_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .keyspaces
            .iter()
            .map(|e| e.key().as_str().to_string())
            .collect();
        names.sort();
        names
    }

    /// Fail unless `name` still refers to keyspace `id`
    pub(crate) fn ensure_kvs(&self, name: &KvsName, id: KvsId) -> KvdbResult<()> {
        match self.keyspaces.get(name) {
            Some(entry) if entry.id == id => Ok(()),
            _ => Err(KvdbError::not_found(format!("KVS '{}'", name))),
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Allocate a transaction handle in the `Invalid` state
    pub fn transaction(self: &Arc<Self>) -> KvdbTransaction {
        KvdbTransaction::new(Arc::clone(self))
    }

    /// Run `f` inside a fresh transaction
    ///
    /// Commits if `f` returns `Ok`, aborts otherwise. A conflict at commit
    /// is returned to the caller; nothing is retried.
    pub fn with_transaction<F, T>(self: &Arc<Self>, f: F) -> KvdbResult<T>
    where
        F: FnOnce(&KvdbTransaction) -> KvdbResult<T>,
    {
        let txn = self.transaction();
        txn.begin()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                // The closure may have ended the transaction itself
                if txn.state() == TransactionState::Active {
                    txn.abort()?;
                }
                Err(e)
            }
        }
    }

    /// Publish a batch outside any transaction
    pub(crate) fn auto_commit(&self, batch: CommitBatch) -> KvdbResult<SequenceNumber> {
        let seqno = self.coordinator.auto_commit(batch)?;
        self.after_publish();
        Ok(seqno)
    }

    /// Periodic version GC, driven by the publication count
    pub(crate) fn after_publish(&self) {
        let interval = self.config.gc_interval_commits;
        if interval > 0 && self.coordinator.publications() % interval == 0 {
            let stats = self.store.gc();
            debug!(
                target: "kvdb::db",
                horizon = %stats.horizon,
                versions_pruned = stats.versions_pruned,
                keys_reclaimed = stats.keys_reclaimed,
                "periodic version gc"
            );
        }
    }

    // ========================================================================
    // Maintenance and introspection
    // ========================================================================

    /// Prune versions no live snapshot can observe
    pub fn compact_versions(&self) -> GcStats {
        let stats = self.store.gc();
        info!(
            target: "kvdb::db",
            horizon = %stats.horizon,
            versions_pruned = stats.versions_pruned,
            keys_reclaimed = stats.keys_reclaimed,
            "version compaction"
        );
        stats
    }

    /// Transaction metrics
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    /// Highest seqno whose commit is fully visible
    pub fn latest_committed_seqno(&self) -> SequenceNumber {
        self.store.latest_committed_seqno()
    }

    /// Total stored versions, tombstones included
    pub fn version_count(&self) -> usize {
        self.store.version_count()
    }

    /// Number of live snapshot registrations
    pub fn snapshot_count(&self) -> usize {
        self.store.registry().total()
    }

    /// The configuration in effect
    pub fn config(&self) -> &KvdbConfig {
        &self.config
    }

    /// Size limits in effect
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Data directory, `None` for ephemeral databases
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub(crate) fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub(crate) fn store(&self) -> &MemStore {
        &self.store
    }

    pub(crate) fn shared_store(&self) -> Arc<dyn VersionedStore> {
        self.store.clone()
    }
}

impl std::fmt::Debug for Kvdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kvdb")
            .field("data_dir", &self.data_dir)
            .field("keyspaces", &self.keyspaces.len())
            .field("latest_committed", &self.latest_committed_seqno())
            .finish()
    }
}
