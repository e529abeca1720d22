pub mod merge;
pub mod range;

pub use merge::MergeIterator;
pub use range::{RangeIter, UpperBound};

use crate::error::Result;
use crate::types::{Key, Slot};

/// The central iteration abstraction for the storage engine.
///
/// Every sorted data source (overlay, block, table, compaction batch,
/// merged view) implements this trait, so `MergeIterator` can combine
/// any mix of them as `Vec<Box<dyn StorageIterator>>`.
pub trait StorageIterator: Send {
    /// Returns the current key. Only valid when is_valid() is true.
    fn key(&self) -> &[u8];

    /// Returns the current value, or `None` if the entry is a tombstone.
    /// Only valid when is_valid() is true.
    fn value(&self) -> Option<&[u8]>;

    /// Returns true if the iterator is positioned at a valid entry.
    fn is_valid(&self) -> bool;

    /// Advances to the next entry. Returns error on IO failure.
    fn next(&mut self) -> Result<()>;

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, key: &[u8]) -> Result<()>;

    /// Positions the iterator at the smallest entry.
    fn seek_to_first(&mut self) -> Result<()>;
}

/// Iterator over an owned, already sorted and de-duplicated batch.
///
/// Compaction collects log entries into one of these before merging them
/// with the current immutable index.
pub struct VecIterator {
    entries: Vec<(Key, Slot)>,
    order: crate::order::OrderRef,
    position: usize,
}

impl VecIterator {
    /// `entries` must be sorted by `order` and hold each key once.
    pub fn new(entries: Vec<(Key, Slot)>, order: crate::order::OrderRef) -> Self {
        VecIterator {
            entries,
            order,
            position: 0,
        }
    }
}

impl StorageIterator for VecIterator {
    fn key(&self) -> &[u8] {
        &self.entries[self.position].0
    }

    fn value(&self) -> Option<&[u8]> {
        self.entries[self.position].1.as_value()
    }

    fn is_valid(&self) -> bool {
        self.position < self.entries.len()
    }

    fn next(&mut self) -> Result<()> {
        if self.position < self.entries.len() {
            self.position += 1;
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.position = self
            .entries
            .partition_point(|(k, _)| self.order.compare(k, key) == std::cmp::Ordering::Less);
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}
