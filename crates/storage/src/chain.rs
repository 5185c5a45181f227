//! Version chains for MVCC
//!
//! Every key in a keyspace owns a chain of committed versions, newest first.
//! A delete is stored as a tombstone version so that older snapshots keep
//! seeing the value it replaced.

use std::collections::VecDeque;

use kvdb_core::SequenceNumber;

/// One committed version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    seqno: SequenceNumber,
    /// `None` marks a tombstone
    value: Option<Vec<u8>>,
}

impl StoredVersion {
    /// Commit seqno of this version
    #[inline]
    pub fn seqno(&self) -> SequenceNumber {
        self.seqno
    }

    /// Value, or `None` for a tombstone
    #[inline]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Check for a tombstone
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Version chain for MVCC
///
/// Versions are stored in descending seqno order (newest first): snapshot
/// reads want the most recent version at or before their seqno, and commits
/// always add a version newer than every existing one.
///
/// VecDeque gives O(1) push_front for keys that are rewritten repeatedly.
#[derive(Debug, Clone)]
pub struct VersionChain {
    versions: VecDeque<StoredVersion>,
}

impl VersionChain {
    /// Create a chain holding a single version
    pub fn new(seqno: SequenceNumber, value: Option<Vec<u8>>) -> Self {
        let mut versions = VecDeque::with_capacity(4);
        versions.push_front(StoredVersion { seqno, value });
        Self { versions }
    }

    /// Add a version
    ///
    /// `seqno` must not be older than the newest version. A second version at
    /// the same seqno replaces the first: within one commit, a put that
    /// follows a prefix delete wins.
    pub fn push(&mut self, seqno: SequenceNumber, value: Option<Vec<u8>>) {
        match self.versions.front_mut() {
            Some(front) if front.seqno == seqno => front.value = value,
            front => {
                debug_assert!(
                    front.map_or(true, |f| f.seqno < seqno),
                    "versions must be pushed in commit order"
                );
                self.versions.push_front(StoredVersion { seqno, value });
            }
        }
    }

    /// Newest version at or before `seqno`
    pub fn get_at(&self, seqno: SequenceNumber) -> Option<&StoredVersion> {
        self.versions.iter().find(|v| seqno.sees(v.seqno))
    }

    /// Value visible at `seqno`, `None` if absent or deleted
    #[inline]
    pub fn visible_value(&self, seqno: SequenceNumber) -> Option<&[u8]> {
        self.get_at(seqno).and_then(StoredVersion::value)
    }

    /// Newest version
    #[inline]
    pub fn latest(&self) -> Option<&StoredVersion> {
        self.versions.front()
    }

    /// Seqno of the newest version
    #[inline]
    pub fn latest_seqno(&self) -> Option<SequenceNumber> {
        self.latest().map(StoredVersion::seqno)
    }

    /// Whether the newest version is a put
    pub fn is_live(&self) -> bool {
        self.latest().map_or(false, |v| !v.is_tombstone())
    }

    /// Drop versions no reader at or after `horizon` can observe
    ///
    /// Keeps every version newer than `horizon` plus the newest version at or
    /// before it. If that survivor is a tombstone it is dropped as well, since
    /// nothing older remains for it to hide. Returns the number of versions
    /// removed; the chain may end up empty.
    pub fn gc(&mut self, horizon: SequenceNumber) -> usize {
        let before = self.versions.len();
        if let Some(idx) = self.versions.iter().position(|v| horizon.sees(v.seqno)) {
            self.versions.truncate(idx + 1);
            if self.versions.back().map_or(false, StoredVersion::is_tombstone) {
                self.versions.pop_back();
            }
        }
        before - self.versions.len()
    }

    /// Number of versions stored
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Check if the chain holds no versions
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
