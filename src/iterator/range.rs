use std::cmp::Ordering;

use crate::error::Result;
use crate::iterator::{MergeIterator, StorageIterator};
use crate::order::OrderRef;
use crate::types::{Key, Value};

/// Where a range lookup stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpperBound {
    /// Run to the end of the index.
    Unbounded,
    /// Stop before the first key >= this one.
    Excluded(Key),
    /// Stop at the first key that does not start with this prefix.
    Prefix(Key),
}

/// Lazy, ascending `(key, value)` sequence over a merged view.
///
/// Nothing is materialized up front: each `next` pulls one entry through
/// the underlying `MergeIterator`. `rewind` restarts the sequence from its
/// lower bound.
pub struct RangeIter {
    inner: MergeIterator,
    start: Option<Key>,
    upper: UpperBound,
    order: OrderRef,
    finished: bool,
}

impl RangeIter {
    /// Wrap a merge iterator and position it at `start` (or the first key).
    pub fn new(
        mut inner: MergeIterator,
        start: Option<Key>,
        upper: UpperBound,
        order: OrderRef,
    ) -> Result<Self> {
        match &start {
            Some(key) => inner.seek(key)?,
            None => inner.seek_to_first()?,
        }
        Ok(RangeIter {
            inner,
            start,
            upper,
            order,
            finished: false,
        })
    }

    /// Restart from the lower bound. Entries written since creation are
    /// visible to the restarted sequence if they sort ahead of the cursor
    /// of the source they landed in.
    pub fn rewind(&mut self) -> Result<()> {
        match &self.start {
            Some(key) => self.inner.seek(key)?,
            None => self.inner.seek_to_first()?,
        }
        self.finished = false;
        Ok(())
    }

    fn in_range(&self, key: &[u8]) -> bool {
        match &self.upper {
            UpperBound::Unbounded => true,
            UpperBound::Excluded(high) => self.order.compare(key, high) == Ordering::Less,
            UpperBound::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

impl Iterator for RangeIter {
    type Item = Result<(Key, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || !self.inner.is_valid() {
            return None;
        }

        let key = self.inner.key();
        if !self.in_range(key) {
            self.finished = true;
            return None;
        }

        let entry = (key.to_vec(), self.inner.value().unwrap_or_default().to_vec());
        if let Err(e) = self.inner.next() {
            self.finished = true;
            return Some(Err(e));
        }
        Some(Ok(entry))
    }
}
