//! Core types for kvdb
//!
//! Defines the value types shared by the storage, concurrency and engine layers:
//! - SequenceNumber: position in the global commit order
//! - Key: byte-string key, ordered bytewise
//! - Direction: iteration order of a cursor or range scan
//! - Mutation: a buffered put or delete
//! - KvsName / KvsId: keyspace naming and identity

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KvdbError, KvdbResult};
use crate::limits::Limits;

// ============================================================================
// SequenceNumber
// ============================================================================

/// Position in the global commit order
///
/// Visibility is decided purely by sequence number: a commit at `c` is
/// visible to a snapshot at `s` iff `c <= s`.
///
/// `SequenceNumber::ZERO` is reserved as "before all commits".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Sequence number preceding every commit
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    /// Wrap a raw sequence number
    pub const fn new(value: u64) -> Self {
        SequenceNumber(value)
    }

    /// Get the raw value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether a commit at `commit` is visible to a snapshot at `self`
    #[inline]
    pub fn sees(&self, commit: SequenceNumber) -> bool {
        commit <= *self
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        SequenceNumber(value)
    }
}

// ============================================================================
// Key
// ============================================================================

/// Byte-string key
///
/// Keys are compared bytewise (lexicographically), which is the iteration
/// order of every forward cursor. Reverse cursors use the opposite order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// Borrow the key bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the key, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for the empty key
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if this key begins with `prefix`
    #[inline]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key(bytes)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(bytes: &[u8; N]) -> Self {
        Key(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            for c in std::ascii::escape_default(b) {
                write!(f, "{}", c as char)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(\"{}\")", self)
    }
}

/// Smallest byte string greater than every string starting with `prefix`
///
/// Returns `None` when no such bound exists (empty prefix or all `0xff`).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}

// ============================================================================
// Direction
// ============================================================================

/// Iteration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending bytewise order
    #[default]
    Forward,
    /// Descending bytewise order
    Reverse,
}

impl Direction {
    /// Whether `a` comes strictly before `b` in this direction
    #[inline]
    pub fn precedes(&self, a: &Key, b: &Key) -> bool {
        match self {
            Direction::Forward => a < b,
            Direction::Reverse => a > b,
        }
    }

    /// Check for reverse order
    #[inline]
    pub fn is_reverse(&self) -> bool {
        matches!(self, Direction::Reverse)
    }
}

// ============================================================================
// Mutation
// ============================================================================

/// A buffered mutation of a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Set the key to a value
    Put(Vec<u8>),
    /// Remove the key
    Delete,
}

impl Mutation {
    /// The value if this is a put
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Mutation::Put(v) => Some(v),
            Mutation::Delete => None,
        }
    }

    /// Check for a delete
    pub fn is_delete(&self) -> bool {
        matches!(self, Mutation::Delete)
    }
}

// ============================================================================
// Keyspaces
// ============================================================================

/// Internal identity of a keyspace inside a store
///
/// Names can be dropped and re-created; ids are never reused by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KvsId(u32);

impl KvsId {
    /// Wrap a raw id
    pub const fn new(id: u32) -> Self {
        KvsId(id)
    }

    /// Get the raw id
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for KvsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kvs#{}", self.0)
    }
}

/// Validated keyspace name
///
/// Names are 1..=`Limits::max_kvs_name_bytes` bytes of `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KvsName(String);

impl KvsName {
    /// Validate and wrap a keyspace name
    ///
    /// # Errors
    /// Returns `InvalidInput` if the name is empty, too long, or uses
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn new(name: impl Into<String>) -> KvdbResult<Self> {
        let name = name.into();
        let max = Limits::default().max_kvs_name_bytes;
        if name.is_empty() {
            return Err(KvdbError::invalid_input("KVS name must not be empty"));
        }
        if name.len() > max {
            return Err(KvdbError::invalid_input(format!(
                "KVS name '{}' exceeds {} bytes",
                name, max
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(KvdbError::invalid_input(format!(
                "KVS name '{}' contains invalid character {:?}",
                name, c
            )));
        }
        Ok(KvsName(name))
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KvsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
