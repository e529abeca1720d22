use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::iterator::{StorageIterator, VecIterator};
use crate::order::OrderRef;
use crate::sstable::SSTable;
use crate::types::{Lsn, Value};

/// Read-only sorted mapping produced by compaction.
///
/// Holds at most one table plus the watermark it reflects. The watermark
/// comes from the index pointer, not the table: a compaction with nothing
/// to add keeps the old table and only moves the watermark forward.
///
/// Never mutated after construction. Publishing a compaction swaps in a
/// whole new `ImmutableIndex`; readers holding the old `Arc` keep a valid,
/// stale view.
pub struct ImmutableIndex {
    table: Option<Arc<SSTable>>,
    watermark: Lsn,
    order: OrderRef,
}

impl ImmutableIndex {
    /// The index of a store that has never compacted.
    pub fn empty(order: OrderRef) -> Self {
        ImmutableIndex {
            table: None,
            watermark: 0,
            order,
        }
    }

    pub fn new(table: Option<Arc<SSTable>>, watermark: Lsn, order: OrderRef) -> Self {
        ImmutableIndex {
            table,
            watermark,
            order,
        }
    }

    /// Open the table at `path` as the state at `watermark`.
    pub fn open(path: &Path, watermark: Lsn, order: OrderRef) -> Result<Self> {
        let table = SSTable::open(path, order.clone())?;
        Ok(Self::new(Some(Arc::new(table)), watermark, order))
    }

    pub fn lookup(&self, key: &[u8]) -> Result<Option<Value>> {
        match &self.table {
            Some(table) => table.get(key),
            None => Ok(None),
        }
    }

    /// Ordered cursor over every entry, positioned at the first.
    pub fn iter(&self) -> Result<Box<dyn StorageIterator>> {
        match &self.table {
            Some(table) => Ok(Box::new(table.iter()?)),
            None => Ok(Box::new(VecIterator::new(Vec::new(), self.order.clone()))),
        }
    }

    /// Highest LSN whose effects this index captures.
    pub fn last_persistent_lsn(&self) -> Lsn {
        self.watermark
    }

    pub fn table(&self) -> Option<&Arc<SSTable>> {
        self.table.as_ref()
    }

    pub fn table_path(&self) -> Option<&Path> {
        self.table.as_ref().map(|t| t.path())
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.table.as_ref().map_or(0, |t| t.meta().entry_count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn order(&self) -> &OrderRef {
        &self.order
    }
}
