//! kvdb - embedded transactional key-value store with snapshot cursors
//!
//! A `Kvdb` holds named keyspaces (`Kvs`). Writes either auto-commit or
//! buffer in a `KvdbTransaction` until commit, which publishes them
//! atomically under first-committer-wins conflict detection. Cursors read a
//! consistent snapshot, optionally overlaid with a transaction's pending
//! writes, and can be re-bound to another transaction without losing their
//! position.
//!
//! # Quick Start
//!
//! ```ignore
//! use kvdb::{CursorOptions, Kvdb, KvsParams};
//!
//! let db = Kvdb::ephemeral()?;
//! let kvs = db.kvs_create("users", KvsParams::transactional())?;
//!
//! let txn = db.transaction();
//! txn.begin()?;
//! kvs.put(Some(&txn), b"user:1", b"alice")?;
//!
//! // Sees the pending write
//! let mut cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true))?;
//! assert_eq!(cursor.read()?.unwrap().1, b"alice");
//!
//! txn.commit()?;
//! ```

pub use kvdb_core::{
    Direction, Key, KvdbError, KvdbResult, KvsId, Limits, SequenceNumber,
};
pub use kvdb_engine::*;
