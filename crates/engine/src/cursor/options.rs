//! Cursor creation options

use kvdb_core::Direction;

use crate::transaction::KvdbTransaction;

/// How a cursor is created
///
/// ```text
/// let cursor = kvs.cursor(CursorOptions::new().txn(&txn).bind(true).reverse())?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CursorOptions<'a> {
    /// Transaction whose view the cursor reads
    pub txn: Option<&'a KvdbTransaction>,
    /// Track the transaction live instead of copying its view once
    pub bind: bool,
    /// Iterate in descending key order
    pub reverse: bool,
    /// Only visit keys starting with this prefix
    pub filter: Option<Vec<u8>>,
}

impl<'a> CursorOptions<'a> {
    /// Forward cursor over the latest committed data
    pub fn new() -> Self {
        Self::default()
    }

    /// Read through `txn`
    pub fn txn(mut self, txn: &'a KvdbTransaction) -> Self {
        self.txn = Some(txn);
        self
    }

    /// Bind to the transaction instead of taking a static copy
    pub fn bind(mut self, bind: bool) -> Self {
        self.bind = bind;
        self
    }

    /// Iterate in descending order
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Restrict to keys starting with `prefix`
    pub fn filter(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.filter = Some(prefix.into());
        self
    }

    pub(crate) fn direction(&self) -> Direction {
        if self.reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }
}
