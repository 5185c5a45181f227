//! Database engine for kvdb
//!
//! This crate ties the lower layers together:
//! - Kvdb: database handle with open/config and the keyspace registry
//! - Kvs: keyspace handle for point reads and writes
//! - KvdbTransaction: reusable transaction handle
//! - KvsCursor: snapshot cursors merging committed data with pending writes
//! - Transaction coordination and metrics
//!
//! The engine is the only component that knows about keyspace names,
//! configuration and the mapping of handles onto one shared store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod cursor;
pub mod database;
pub mod kvs;
pub mod transaction;

pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use cursor::{CursorOptions, KvsCursor};
pub use database::{Kvdb, KvdbConfig, CONFIG_FILE_NAME};
pub use kvs::{Kvs, KvsParams};
pub use transaction::KvdbTransaction;

pub use kvdb_concurrency::{PendingOperations, TransactionState};
pub use kvdb_storage::GcStats;
