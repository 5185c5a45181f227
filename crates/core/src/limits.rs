//! Size limits for keys, values and keyspaces
//!
//! This module defines configurable size limits that are enforced by the engine
//! before any mutation reaches a write set or the store. Violations surface as
//! `KvdbError::InvalidInput`.
//!
//! ## Defaults
//!
//! - keys: 1..=1344 bytes
//! - values: 0..=1 MiB
//! - keyspace names: 1..=31 bytes
//! - keyspaces per KVDB: 256

use crate::error::KvdbError;
use thiserror::Error;

/// Size limits for keys, values and keyspaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum key length in bytes (default: 1344)
    pub max_key_bytes: usize,

    /// Maximum value length in bytes (default: 1 MiB)
    pub max_value_bytes: usize,

    /// Maximum keyspace name length in bytes (default: 31)
    pub max_kvs_name_bytes: usize,

    /// Maximum number of keyspaces per KVDB (default: 256)
    pub max_kvs_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: 1344,
            max_value_bytes: 1024 * 1024,
            max_kvs_name_bytes: 31,
            max_kvs_count: 256,
        }
    }
}

impl Limits {
    /// 16-byte keys, 64-byte values and 4 keyspaces
    pub fn with_small_limits() -> Self {
        Limits {
            max_key_bytes: 16,
            max_value_bytes: 64,
            max_kvs_name_bytes: 31,
            max_kvs_count: 4,
        }
    }

    /// Validate a key length
    ///
    /// Empty keys are rejected: the empty string is reserved as the lowest
    /// possible seek target.
    pub fn validate_key(&self, key: &[u8]) -> Result<(), LimitError> {
        if key.is_empty() {
            return Err(LimitError::EmptyKey);
        }
        if key.len() > self.max_key_bytes {
            return Err(LimitError::KeyTooLong {
                actual: key.len(),
                max: self.max_key_bytes,
            });
        }
        Ok(())
    }

    /// Validate a value length
    pub fn validate_value(&self, value: &[u8]) -> Result<(), LimitError> {
        if value.len() > self.max_value_bytes {
            return Err(LimitError::ValueTooLarge {
                actual: value.len(),
                max: self.max_value_bytes,
            });
        }
        Ok(())
    }

    /// Validate a filter or prefix-delete prefix
    ///
    /// Prefixes share the key length limit but may not be empty.
    pub fn validate_prefix(&self, prefix: &[u8]) -> Result<(), LimitError> {
        self.validate_key(prefix)
    }
}

/// Limit validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitError {
    /// Key has zero length
    #[error("Key must not be empty")]
    EmptyKey,

    /// Key exceeds maximum length
    #[error("Key too long: {actual} bytes exceeds maximum {max}")]
    KeyTooLong {
        /// Actual key length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Value exceeds maximum length
    #[error("Value too large: {actual} bytes exceeds maximum {max}")]
    ValueTooLarge {
        /// Actual value length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },
}

impl From<LimitError> for KvdbError {
    fn from(e: LimitError) -> Self {
        KvdbError::invalid_input(e.to_string())
    }
}
