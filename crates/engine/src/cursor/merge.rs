//! Merge step over a store snapshot and a pending write set
//!
//! Each call produces the single next visible key from two lazy ordered
//! sources:
//!
//! ```text
//! store:    next_visible(kvs, from, direction, seqno)   committed versions
//! overlay:  WriteSet::next_entry(from, direction)        pending mutations
//! ```
//!
//! The source whose key comes first in the iteration direction wins; on
//! equal keys the overlay wins. Overlay deletes and base keys under an
//! overlay prefix tombstone are stepped over. Nothing is materialized.

use std::ops::Bound;

use kvdb_concurrency::WriteSet;
use kvdb_core::{
    prefix_successor, Direction, Key, KvdbResult, KvsId, Mutation, SequenceNumber,
    VersionedStore,
};

/// Where the iteration ends
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bounds<'a> {
    pub direction: Direction,
    /// Keys must start with this prefix
    pub filter: Option<&'a [u8]>,
    /// Last key (inclusive) in the iteration direction
    pub limit: Option<&'a Key>,
}

impl Bounds<'_> {
    /// Whether `key` lies past the end of the iteration
    ///
    /// Assumes the scan started inside the filter range, see `clamp_start`.
    fn exhausted_at(&self, key: &Key) -> bool {
        if let Some(prefix) = self.filter {
            if !key.starts_with(prefix) {
                return true;
            }
        }
        match self.limit {
            Some(limit) => self.direction.precedes(limit, key),
            None => false,
        }
    }
}

/// Move a start bound that lies before the filter range onto its edge
pub(crate) fn clamp_start(from: Bound<Key>, prefix: &[u8], direction: Direction) -> Bound<Key> {
    match direction {
        Direction::Forward => {
            let floor = Key::from(prefix);
            let inside = match &from {
                Bound::Included(k) | Bound::Excluded(k) => *k >= floor,
                Bound::Unbounded => false,
            };
            if inside {
                from
            } else {
                Bound::Included(floor)
            }
        }
        Direction::Reverse => {
            // A prefix of all 0xff bytes extends to the end of the keyspace
            let Some(ceiling) = prefix_successor(prefix).map(Key::from) else {
                return from;
            };
            let inside = match &from {
                Bound::Included(k) | Bound::Excluded(k) => *k < ceiling,
                Bound::Unbounded => false,
            };
            if inside {
                from
            } else {
                Bound::Excluded(ceiling)
            }
        }
    }
}

enum Step<'w> {
    Base(Key, Vec<u8>),
    Pending(&'w Key, &'w Mutation),
}

impl Step<'_> {
    fn key(&self) -> &Key {
        match self {
            Step::Base(key, _) => key,
            Step::Pending(key, _) => key,
        }
    }
}

/// The next visible entry at or past `from`
///
/// Returns `None` when both sources are exhausted or the next key lies
/// outside `bounds`.
pub(crate) fn next_merged(
    store: &dyn VersionedStore,
    kvs: KvsId,
    seqno: SequenceNumber,
    overlay: Option<&WriteSet>,
    mut from: Bound<Key>,
    bounds: &Bounds<'_>,
) -> KvdbResult<Option<(Key, Vec<u8>)>> {
    let direction = bounds.direction;
    loop {
        let base = store.next_visible(kvs, from.as_ref(), direction, seqno)?;
        let pending = overlay.and_then(|ws| ws.next_entry(from.as_ref(), direction));

        let step = match (base, pending) {
            (None, None) => return Ok(None),
            (Some((key, value)), None) => Step::Base(key, value),
            (None, Some((key, mutation))) => Step::Pending(key, mutation),
            (Some((bkey, value)), Some((pkey, mutation))) => {
                if direction.precedes(&bkey, pkey) {
                    Step::Base(bkey, value)
                } else {
                    Step::Pending(pkey, mutation)
                }
            }
        };

        if bounds.exhausted_at(step.key()) {
            return Ok(None);
        }

        match step {
            Step::Base(key, value) => {
                let shadowed =
                    overlay.map_or(false, |ws| ws.covered_by_prefix_tombstone(key.as_bytes()));
                if !shadowed {
                    return Ok(Some((key, value)));
                }
                from = Bound::Excluded(key);
            }
            Step::Pending(key, Mutation::Put(value)) => {
                return Ok(Some((key.clone(), value.clone())));
            }
            Step::Pending(key, Mutation::Delete) => {
                from = Bound::Excluded(key.clone());
            }
        }
    }
}
