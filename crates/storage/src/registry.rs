//! Snapshot registry
//!
//! Tracks which snapshot seqnos are still in use by transactions and cursors.
//! Registrations are reference counted per seqno. Version garbage collection
//! never removes a version that a registered seqno can observe.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let seqno = registry.register_with(|| Ok(store.latest_committed_seqno()))?;
//! // ... snapshot reads at `seqno` ...
//! registry.release(seqno);
//! ```

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::warn;

use kvdb_core::{KvdbResult, SequenceNumber};

/// Reference-counted set of live snapshot seqnos
#[derive(Debug, Default)]
pub struct SnapshotRegistry {
    pins: Mutex<BTreeMap<SequenceNumber, usize>>,
}

impl SnapshotRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose a seqno and register it in one step
    ///
    /// `choose` runs under the registry lock, so a concurrent horizon
    /// computation either sees the registration or ran entirely before the
    /// seqno was chosen.
    pub fn register_with<F>(&self, choose: F) -> KvdbResult<SequenceNumber>
    where
        F: FnOnce() -> KvdbResult<SequenceNumber>,
    {
        let mut pins = self.pins.lock();
        let seqno = choose()?;
        *pins.entry(seqno).or_insert(0) += 1;
        Ok(seqno)
    }

    /// Add one registration of `seqno`
    pub fn register(&self, seqno: SequenceNumber) {
        *self.pins.lock().entry(seqno).or_insert(0) += 1;
    }

    /// Drop one registration of `seqno`
    ///
    /// Releasing a seqno that is not registered is logged and ignored.
    pub fn release(&self, seqno: SequenceNumber) {
        let mut pins = self.pins.lock();
        match pins.get_mut(&seqno) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                pins.remove(&seqno);
            }
            None => warn!(%seqno, "release of unregistered snapshot"),
        }
    }

    /// Run `f` with the oldest registered seqno while holding the registry lock
    ///
    /// No registration can be added while `f` runs.
    pub fn with_oldest<R>(&self, f: impl FnOnce(Option<SequenceNumber>) -> R) -> R {
        let pins = self.pins.lock();
        f(pins.keys().next().copied())
    }

    /// Oldest registered seqno
    pub fn oldest(&self) -> Option<SequenceNumber> {
        self.with_oldest(|oldest| oldest)
    }

    /// Number of registrations of `seqno`
    pub fn count(&self, seqno: SequenceNumber) -> usize {
        self.pins.lock().get(&seqno).copied().unwrap_or(0)
    }

    /// Total number of live registrations
    pub fn total(&self) -> usize {
        self.pins.lock().values().sum()
    }
}
