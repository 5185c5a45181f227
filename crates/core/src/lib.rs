//! Core types and traits for kvdb
//!
//! This crate defines the foundational types used throughout the system:
//! - SequenceNumber: Total order over commits and snapshots
//! - SequenceClock: Injected monotonic sequence number service
//! - Key: Byte-string key with lexicographic order
//! - Mutation: Buffered put/delete carried by a write set
//! - KvsName / KvsId: Naming and identity of keyspaces
//! - Limits: Key, value and keyspace count limits
//! - Error: Error taxonomy (InvalidState, Conflict, ClockExhausted, ...)
//! - Traits: The `VersionedStore` contract consumed by transactions and cursors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod limits;
pub mod traits;
pub mod types;

pub use clock::SequenceClock;
pub use error::{KvdbError, KvdbResult};
pub use limits::{LimitError, Limits};
pub use traits::{CommitBatch, RangeScan, SnapshotHandle, VersionedStore};
pub use types::{
    prefix_successor, Direction, Key, KvsId, KvsName, Mutation, SequenceNumber,
};
