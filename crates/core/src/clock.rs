//! Sequence clock
//!
//! Single monotonic counter for the entire database. Both transaction begins
//! (snapshot seqnos) and commits (commit seqnos) draw from it, so every
//! visibility decision reduces to a comparison of two sequence numbers.
//!
//! The clock is an injected service: whoever needs it holds an
//! `Arc<SequenceClock>`. Tests construct clocks at any starting point.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{KvdbError, KvdbResult};
use crate::types::SequenceNumber;

/// Monotonic, thread-safe sequence number source
///
/// `next()` is strictly increasing across all threads. There is no rollback:
/// a number allocated for a commit that later fails is simply skipped.
#[derive(Debug)]
pub struct SequenceClock {
    /// Last issued value
    last: AtomicU64,
}

impl SequenceClock {
    /// Create a clock whose first `next()` returns `initial + 1`
    pub fn new(initial: SequenceNumber) -> Self {
        SequenceClock {
            last: AtomicU64::new(initial.as_u64()),
        }
    }

    /// Allocate the next sequence number
    ///
    /// # Errors
    /// Returns `ClockExhausted` once `u64::MAX` has been issued. This is fatal:
    /// the clock stays exhausted.
    pub fn next(&self) -> KvdbResult<SequenceNumber> {
        self.last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_add(1))
            .map(|prev| SequenceNumber::new(prev + 1))
            .map_err(|_| KvdbError::ClockExhausted)
    }

    /// Last issued sequence number
    pub fn current(&self) -> SequenceNumber {
        SequenceNumber::new(self.last.load(Ordering::Acquire))
    }
}

impl Default for SequenceClock {
    fn default() -> Self {
        Self::new(SequenceNumber::ZERO)
    }
}
