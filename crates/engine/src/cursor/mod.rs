//! Snapshot cursors
//!
//! A cursor iterates one keyspace in key order (or reverse order) through
//! one of three views:
//!
//! | Created with          | View                                                |
//! |-----------------------|-----------------------------------------------------|
//! | no transaction        | latest committed data, pinned at creation           |
//! | transaction, unbound  | copy of the transaction's snapshot and write set    |
//! | transaction, bound    | the transaction's current snapshot and write set,   |
//! |                       | re-read on every step                               |
//!
//! A bound cursor follows its transaction through commit, abort and
//! re-begin. A committed generation stays visible as overlay until the
//! transaction begins again; an aborted one reads base-only.
//!
//! `update()` swaps the view and keeps the position, so iteration resumes
//! after the last returned key under the new view. `seek()` moves the
//! position and keeps the view.

mod merge;
mod options;

pub use options::CursorOptions;

use std::ops::Bound;
use std::sync::Arc;

use tracing::debug;

use kvdb_concurrency::{Transaction, TransactionState, WriteSet};
use kvdb_core::{
    Direction, Key, KvdbError, KvdbResult, LimitError, SequenceNumber, SnapshotHandle,
};

use crate::kvs::Kvs;
use crate::transaction::KvdbTransaction;

use self::merge::Bounds;

/// Where the next read starts
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// Before the first key in the iteration direction
    Start,
    /// Just before `key`: the next read may return `key` itself
    Seek(Key),
    /// Just past the last returned key
    After(Key),
}

impl Position {
    fn bound(&self) -> Bound<Key> {
        match self {
            Position::Start => Bound::Unbounded,
            Position::Seek(key) => Bound::Included(key.clone()),
            Position::After(key) => Bound::Excluded(key.clone()),
        }
    }
}

enum View {
    /// Store only, at a pinned seqno
    Snapshot(SnapshotHandle),
    /// Frozen copy of a transaction's view
    Static {
        snapshot: SnapshotHandle,
        overlay: WriteSet,
    },
    /// Live reference; `generation` is the last one observed
    Bound {
        txn: Arc<Transaction>,
        generation: u64,
    },
}

impl View {
    fn mode(&self) -> &'static str {
        match self {
            View::Snapshot(_) => "snapshot",
            View::Static { .. } => "static",
            View::Bound { .. } => "bound",
        }
    }
}

/// Cursor over one keyspace
pub struct KvsCursor {
    kvs: Kvs,
    direction: Direction,
    filter: Option<Vec<u8>>,
    /// Inclusive end key set by `seek_range`
    limit: Option<Key>,
    position: Position,
    eof: bool,
    /// The view changed after EOF; the next read looks again
    rearmed: bool,
    /// `None` once destroyed
    view: Option<View>,
}

impl KvsCursor {
    pub(crate) fn new(kvs: Kvs, options: CursorOptions<'_>) -> KvdbResult<Self> {
        kvs.ensure_open()?;
        let direction = options.direction();
        let filter = match options.filter {
            Some(prefix) if !prefix.is_empty() => {
                kvs.db().limits().validate_prefix(&prefix)?;
                Some(prefix)
            }
            _ => None,
        };
        let view = Self::make_view(&kvs, options.txn, options.bind)?;

        debug!(
            target: "kvdb::cursor",
            kvs = kvs.name(),
            mode = view.mode(),
            reverse = direction.is_reverse(),
            filtered = filter.is_some(),
            "cursor created"
        );

        Ok(KvsCursor {
            kvs,
            direction,
            filter,
            limit: None,
            position: Position::Start,
            eof: false,
            rearmed: false,
            view: Some(view),
        })
    }

    fn make_view(kvs: &Kvs, txn: Option<&KvdbTransaction>, bind: bool) -> KvdbResult<View> {
        let Some(handle) = txn else {
            return Ok(View::Snapshot(SnapshotHandle::latest(
                kvs.db().shared_store(),
            )));
        };
        kvs.ensure_same_db(handle)?;

        let txn = handle.inner();
        let inner = txn.read();
        if bind {
            if inner.state() == TransactionState::Invalid {
                return Err(KvdbError::invalid_state(format!(
                    "Cannot bind cursor to transaction {}: never begun",
                    txn.id()
                )));
            }
            return Ok(View::Bound {
                txn: Arc::clone(txn),
                generation: inner.generation(),
            });
        }

        match (inner.state(), inner.snapshot_seqno()) {
            (TransactionState::Active, Some(seqno)) => Ok(View::Static {
                snapshot: SnapshotHandle::pin(kvs.db().shared_store(), seqno),
                overlay: inner.write_set(kvs.id()).cloned().unwrap_or_default(),
            }),
            (state, _) => Err(KvdbError::invalid_state(format!(
                "Cannot create static cursor from transaction {}: {}",
                txn.id(),
                state
            ))),
        }
    }

    /// Return the next entry, or `None` at EOF
    ///
    /// EOF is sticky: once reached, reads keep returning `None` until
    /// `seek`, `seek_range` or `update`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` after `destroy`
    /// - `NotFound` if the keyspace was dropped
    pub fn read(&mut self) -> KvdbResult<Option<(Key, Vec<u8>)>> {
        self.ensure_live()?;
        if self.eof && !self.rearmed {
            return Ok(None);
        }

        let next = self.step()?;
        self.rearmed = false;
        match next {
            Some((key, value)) => {
                self.eof = false;
                self.position = Position::After(key.clone());
                Ok(Some((key, value)))
            }
            None => {
                self.eof = true;
                Ok(None)
            }
        }
    }

    /// Position just before `key`
    ///
    /// Returns the key the next `read` will yield, if any. Clears EOF and any
    /// `seek_range` limit. The view is unchanged.
    pub fn seek(&mut self, key: &[u8]) -> KvdbResult<Option<Key>> {
        self.ensure_live()?;
        self.check_seek_key(key)?;
        self.reposition(Key::from(key), None)
    }

    /// Restrict iteration to `[min, max]` and seek to its first key
    ///
    /// Forward cursors start at `min` and stop after `max`; reverse cursors
    /// start at `max` and stop before `min`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `min > max`.
    pub fn seek_range(&mut self, min: &[u8], max: &[u8]) -> KvdbResult<Option<Key>> {
        self.ensure_live()?;
        self.check_seek_key(min)?;
        self.check_seek_key(max)?;
        if min > max {
            return Err(KvdbError::invalid_input(format!(
                "Seek range start {} is past its end {}",
                Key::from(min),
                Key::from(max)
            )));
        }

        let (start, end) = match self.direction {
            Direction::Forward => (min, max),
            Direction::Reverse => (max, min),
        };
        self.reposition(Key::from(start), Some(Key::from(end)))
    }

    fn reposition(&mut self, start: Key, limit: Option<Key>) -> KvdbResult<Option<Key>> {
        self.position = Position::Seek(start);
        self.limit = limit;
        self.eof = false;
        self.rearmed = false;
        Ok(self.step()?.map(|(key, _)| key))
    }

    /// Replace the cursor's view, keeping its position
    ///
    /// With no transaction the cursor moves to the latest committed data.
    /// The previous view's snapshot registration is released.
    ///
    /// # Errors
    ///
    /// - `InvalidState` after `destroy`, when binding to a transaction that
    ///   never began, or when copying a transaction that is not active
    pub fn update(&mut self, txn: Option<&KvdbTransaction>, bind: bool) -> KvdbResult<()> {
        self.ensure_live()?;
        let view = Self::make_view(&self.kvs, txn, bind)?;

        debug!(
            target: "kvdb::cursor",
            kvs = self.kvs.name(),
            mode = view.mode(),
            txn_id = ?txn.map(KvdbTransaction::id),
            eof = self.eof,
            "cursor view updated"
        );

        self.view = Some(view);
        self.rearmed = true;
        Ok(())
    }

    /// Release the cursor's snapshot
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if already destroyed.
    pub fn destroy(&mut self) -> KvdbResult<()> {
        match self.view.take() {
            Some(view) => {
                debug!(target: "kvdb::cursor", kvs = self.kvs.name(), mode = view.mode(), "cursor destroyed");
                Ok(())
            }
            None => Err(Self::destroyed()),
        }
    }

    /// Whether the last read hit the end
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Iteration order
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the cursor tracks a transaction live
    pub fn is_bound(&self) -> bool {
        matches!(self.view, Some(View::Bound { .. }))
    }

    /// Seqno the next read observes
    pub fn snapshot_seqno(&self) -> Option<SequenceNumber> {
        match self.view.as_ref()? {
            View::Snapshot(snapshot) | View::Static { snapshot, .. } => Some(snapshot.seqno()),
            View::Bound { txn, .. } => txn.snapshot_seqno(),
        }
    }

    /// The keyspace this cursor reads
    pub fn kvs(&self) -> &Kvs {
        &self.kvs
    }

    fn step(&mut self) -> KvdbResult<Option<(Key, Vec<u8>)>> {
        let from = self.start_bound();
        let bounds = Bounds {
            direction: self.direction,
            filter: self.filter.as_deref(),
            limit: self.limit.as_ref(),
        };
        let kvs_id = self.kvs.id();
        let store = self.kvs.store();

        match self.view.as_mut().ok_or_else(Self::destroyed)? {
            View::Snapshot(snapshot) => {
                merge::next_merged(store, kvs_id, snapshot.seqno(), None, from, &bounds)
            }
            View::Static { snapshot, overlay } => {
                merge::next_merged(store, kvs_id, snapshot.seqno(), Some(overlay), from, &bounds)
            }
            View::Bound { txn, generation } => {
                let inner = txn.read();
                if inner.generation() != *generation {
                    debug!(
                        target: "kvdb::cursor",
                        txn_id = txn.id(),
                        previous = *generation,
                        generation = inner.generation(),
                        state = %inner.state(),
                        "bound transaction moved to a new generation"
                    );
                    *generation = inner.generation();
                }
                let seqno = inner.snapshot_seqno().ok_or_else(|| {
                    KvdbError::invalid_state(format!("Transaction {} has no snapshot", txn.id()))
                })?;
                merge::next_merged(store, kvs_id, seqno, inner.overlay(kvs_id), from, &bounds)
            }
        }
    }

    fn start_bound(&self) -> Bound<Key> {
        let from = self.position.bound();
        match &self.filter {
            Some(prefix) => merge::clamp_start(from, prefix, self.direction),
            None => from,
        }
    }

    /// Seek targets may be empty, which sorts before every key
    fn check_seek_key(&self, key: &[u8]) -> KvdbResult<()> {
        let max = self.kvs.db().limits().max_key_bytes;
        if key.len() > max {
            return Err(LimitError::KeyTooLong {
                actual: key.len(),
                max,
            }
            .into());
        }
        Ok(())
    }

    fn ensure_live(&self) -> KvdbResult<()> {
        if self.view.is_some() {
            Ok(())
        } else {
            Err(Self::destroyed())
        }
    }

    fn destroyed() -> KvdbError {
        KvdbError::invalid_state("Cursor has been destroyed")
    }
}

impl std::fmt::Debug for KvsCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvsCursor")
            .field("kvs", &self.kvs.name())
            .field("mode", &self.view.as_ref().map(View::mode))
            .field("direction", &self.direction)
            .field("position", &self.position)
            .field("eof", &self.eof)
            .finish()
    }
}
