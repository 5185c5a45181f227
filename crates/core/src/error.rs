//! Error types for kvdb
//!
//! This module defines the error taxonomy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - `InvalidState`: operation illegal for the current transaction or cursor state
//! - `Conflict`: commit-time write-write conflict (the transaction is aborted)
//! - `ClockExhausted`: the sequence clock overflowed (fatal)
//! - `NotFound` / `AlreadyExists`: keyspace registry lookups
//! - `InvalidInput`: limits, names, malformed arguments
//! - `Config` / `Io`: configuration loading
//!
//! End of iteration and missing keys are NOT errors: they are reported as `None`.

use crate::types::{Key, SequenceNumber};
use std::io;
use thiserror::Error;

/// Result type alias for kvdb operations
pub type KvdbResult<T> = std::result::Result<T, KvdbError>;

/// Error types for kvdb
#[derive(Debug, Error)]
pub enum KvdbError {
    /// Operation is not legal in the current transaction or cursor state
    #[error("Invalid state: {reason}")]
    InvalidState {
        /// What was attempted and the state that rejected it
        reason: String,
    },

    /// Write-write conflict detected at commit (first-committer-wins)
    ///
    /// The transaction has been aborted as a side effect.
    #[error(
        "Commit conflict on key {key}: committed at {committed_seqno} after snapshot {snapshot_seqno}"
    )]
    Conflict {
        /// First conflicting key found during validation
        key: Key,
        /// Snapshot seqno of the transaction that lost
        snapshot_seqno: SequenceNumber,
        /// Seqno of the competing commit
        committed_seqno: SequenceNumber,
    },

    /// The sequence clock overflowed; the engine cannot continue
    #[error("Sequence clock exhausted")]
    ClockExhausted,

    /// Named entity does not exist
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing entity
        what: String,
    },

    /// Named entity already exists
    #[error("Already exists: {what}")]
    AlreadyExists {
        /// Description of the duplicate entity
        what: String,
    },

    /// Caller supplied an argument that violates a limit or format rule
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Why the input was rejected
        reason: String,
    },

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// Parser or validation message
        message: String,
    },

    /// I/O error (config file access)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl KvdbError {
    /// Create an `InvalidState` error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        KvdbError::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        KvdbError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create a `NotFound` error
    pub fn not_found(what: impl Into<String>) -> Self {
        KvdbError::NotFound { what: what.into() }
    }

    /// Create an `AlreadyExists` error
    pub fn already_exists(what: impl Into<String>) -> Self {
        KvdbError::AlreadyExists { what: what.into() }
    }

    /// Create a `Config` error
    pub fn config(message: impl Into<String>) -> Self {
        KvdbError::Config {
            message: message.into(),
        }
    }

    /// Check if this error is a commit conflict
    ///
    /// Retry policy is a caller decision; this predicate is what callers key on.
    pub fn is_conflict(&self) -> bool {
        matches!(self, KvdbError::Conflict { .. })
    }

    /// Check if this error is an invalid-state error
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, KvdbError::InvalidState { .. })
    }

    /// Check if this error is unrecoverable for the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, KvdbError::ClockExhausted)
    }
}
