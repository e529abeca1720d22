pub mod skiplist;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::order::OrderRef;
use crate::types::{Key, Lsn, Slot};
use skiplist::SkipList;

/// In-memory ordered overlay built from log entries that no immutable index
/// has captured yet.
///
/// Every write to a merged index lands in its tail overlay. Deletes are
/// tombstones: the key can't just be removed because older versions may
/// live in older overlays or the immutable index.
///
/// The overlay has no durability of its own. Replaying the log above the
/// persisted watermark rebuilds it exactly.
pub struct Overlay {
    data: RwLock<SkipList>,
    order: OrderRef,
    max_lsn: AtomicU64,
}

impl Overlay {
    /// Create a new empty overlay ordered by `order`.
    pub fn new(order: OrderRef) -> Self {
        Overlay {
            data: RwLock::new(SkipList::new(order.clone())),
            order,
            max_lsn: AtomicU64::new(0),
        }
    }

    /// Insert or overwrite. The last put in append order wins.
    pub fn put(&self, lsn: Lsn, key: Key, slot: Slot) {
        self.data.write().insert(key, slot);
        self.max_lsn.fetch_max(lsn, AtomicOrdering::AcqRel);
    }

    /// Look up a key. `Some(Slot::Tombstone)` means deleted here, `None`
    /// means this overlay knows nothing about the key.
    pub fn lookup(&self, key: &[u8]) -> Option<Slot> {
        self.data.read().get(key).cloned()
    }

    /// Highest LSN applied to this overlay (0 when empty).
    pub fn max_lsn(&self) -> Lsn {
        self.max_lsn.load(AtomicOrdering::Acquire)
    }

    /// Entries, tombstones included.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Current memory usage in bytes.
    pub fn size(&self) -> usize {
        self.data.read().size_bytes()
    }

    pub fn order(&self) -> &OrderRef {
        &self.order
    }

    /// A cursor over this overlay, positioned at the first entry.
    pub fn iter(self: &Arc<Self>) -> OverlayIterator {
        let mut iter = OverlayIterator {
            overlay: Arc::clone(self),
            current: None,
        };
        iter.current = self.data.read().first().map(clone_entry);
        iter
    }

    /// A cursor positioned at the first entry with key >= `key`.
    pub fn iter_from(self: &Arc<Self>, key: &[u8]) -> OverlayIterator {
        OverlayIterator {
            overlay: Arc::clone(self),
            current: self.data.read().lower_bound(key).map(clone_entry),
        }
    }
}

fn clone_entry((key, slot): (&[u8], &Slot)) -> (Key, Slot) {
    (key.to_vec(), slot.clone())
}

/// Cursor over an overlay.
///
/// Holds the current entry by value and re-seeks past it on `next`, so the
/// overlay lock is only held for the duration of one step. Writes made
/// between steps are seen if they sort after the cursor.
pub struct OverlayIterator {
    overlay: Arc<Overlay>,
    current: Option<(Key, Slot)>,
}

impl StorageIterator for OverlayIterator {
    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or_default()
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().and_then(|(_, slot)| slot.as_value())
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        if let Some((key, _)) = self.current.take() {
            self.current = self.overlay.data.read().upper_bound(&key).map(clone_entry);
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.current = self.overlay.data.read().lower_bound(key).map(clone_entry);
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.current = self.overlay.data.read().first().map(clone_entry);
        Ok(())
    }
}
