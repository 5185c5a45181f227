//! Concurrency layer for kvdb
//!
//! This crate implements snapshot-isolated transactions with:
//! - WriteSet: ordered per-keyspace buffer of puts, deletes and prefix deletes
//! - Transaction: reusable state machine with a generation counter
//! - TransactionManager: clock and store injection, commit protocol
//!
//! Conflict detection is first-committer-wins on the write set: a commit
//! fails if any key it touches was committed by someone else after its
//! snapshot. Validation runs inside the store's publish critical section.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod write_set;

pub use manager::TransactionManager;
pub use transaction::{Transaction, TransactionInner, TransactionState};
pub use write_set::{Lookup, PendingOperations, WriteSet, WriteSetScan};
