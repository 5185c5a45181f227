//! Storage layer for kvdb
//!
//! This crate implements the committed side of the keyspace:
//! - MemStore: in-memory `VersionedStore` with per-keyspace BTreeMaps
//! - VersionChain: newest-first MVCC version lists with tombstones
//! - SnapshotRegistry: refcounted snapshot pins consulted by version GC
//!
//! A persistent engine would implement `VersionedStore` over its own tree;
//! nothing above this crate depends on `MemStore` directly except for
//! construction and maintenance (`gc`, keyspace creation).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod mem;
pub mod registry;

pub use chain::{StoredVersion, VersionChain};
pub use mem::{GcStats, MemStore};
pub use registry::SnapshotRegistry;
