use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::index::ImmutableIndex;
use crate::iterator::{MergeIterator, RangeIter, StorageIterator, UpperBound};
use crate::manifest::{self, TABLE_EXT};
use crate::memtable::Overlay;
use crate::order::OrderRef;
use crate::types::{Lsn, Slot, Value};
use crate::wal::{Log, reclaim_file};

/// One consistent view of a merged index.
///
/// Transitions never edit a state in place: they build a new one and swap
/// the `Arc`, so a reader that cloned the old one keeps a stable view.
pub(crate) struct IndexState {
    /// The only writable overlay.
    pub tail: Arc<Overlay>,
    /// Rotated overlays waiting for compaction, newest first.
    pub frozen: Vec<Arc<Overlay>>,
    pub immutable: Arc<ImmutableIndex>,
}

impl IndexState {
    /// Overlays newest first, tail included.
    fn overlays(&self) -> impl Iterator<Item = &Arc<Overlay>> {
        std::iter::once(&self.tail).chain(self.frozen.iter())
    }
}

/// A named index: one immutable index under a chain of overlays.
///
/// ```text
///   writes ──► tail ─┐
///              frozen[0] (newest)   lookups and ranges consult
///              frozen[1]            every layer top to bottom,
///              ...                  first hit wins
///              immutable ◄── compaction
/// ```
pub struct MergedIndex {
    name: String,
    dir: PathBuf,
    order: OrderRef,
    state: RwLock<Arc<IndexState>>,
}

impl MergedIndex {
    /// Open (or create) the index stored in `dir`.
    ///
    /// The index pointer, if present, decides the immutable state. Tables
    /// and scratch files it does not reference are left over from an
    /// interrupted compaction and are removed here.
    pub fn open(dir: &Path, name: &str, order: OrderRef) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let immutable = match manifest::load(dir)? {
            Some(pointer) => {
                if pointer.order_name != order.name() {
                    return Err(Error::InvalidArgument(format!(
                        "index {name} was created with key order {}, opened with {}",
                        pointer.order_name,
                        order.name()
                    )));
                }
                match &pointer.table {
                    Some(file) => {
                        ImmutableIndex::open(&dir.join(file), pointer.watermark, order.clone())?
                    }
                    None => ImmutableIndex::new(None, pointer.watermark, order.clone()),
                }
            }
            None => ImmutableIndex::empty(order.clone()),
        };

        let index = MergedIndex {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            state: RwLock::new(Arc::new(IndexState {
                tail: Arc::new(Overlay::new(order.clone())),
                frozen: Vec::new(),
                immutable: Arc::new(immutable),
            })),
            order,
        };
        index.reclaim_orphans()?;

        info!(
            index = %index.name,
            watermark = index.last_persistent_lsn(),
            entries = index.snapshot().immutable.len(),
            "opened index"
        );
        Ok(index)
    }

    /// Record a set at `lsn`. Records the immutable index already covers
    /// are ignored, so replaying the same log twice changes nothing.
    pub fn add(&self, lsn: Lsn, key: &[u8], value: &[u8]) {
        self.apply(lsn, key, Slot::Value(value.to_vec()));
    }

    /// Record a delete at `lsn`. Always writes a tombstone, whether or not
    /// the key is visible.
    pub fn remove(&self, lsn: Lsn, key: &[u8]) {
        self.apply(lsn, key, Slot::Tombstone);
    }

    fn apply(&self, lsn: Lsn, key: &[u8], slot: Slot) {
        let state = self.snapshot();
        if lsn <= state.immutable.last_persistent_lsn() {
            return;
        }
        state.tail.put(lsn, key.to_vec(), slot);
    }

    /// Newest visible value for `key`, or `None` if absent or deleted.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Value>> {
        let state = self.snapshot();
        for overlay in state.overlays() {
            if let Some(slot) = overlay.lookup(key) {
                return Ok(slot.into_value());
            }
        }
        state.immutable.lookup(key)
    }

    /// Live entries with `low <= key < high`, ascending by the index's order.
    pub fn range_lookup(&self, low: &[u8], high: &[u8]) -> Result<RangeIter> {
        self.range(Some(low.to_vec()), UpperBound::Excluded(high.to_vec()))
    }

    /// Live entries whose key starts with `prefix`.
    pub fn prefix_lookup(&self, prefix: &[u8]) -> Result<RangeIter> {
        if !self.order.supports_prefix_scan() {
            return Err(Error::InvalidArgument(format!(
                "key order {} does not support prefix lookups",
                self.order.name()
            )));
        }
        self.range(Some(prefix.to_vec()), UpperBound::Prefix(prefix.to_vec()))
    }

    /// Every live entry.
    pub fn iter(&self) -> Result<RangeIter> {
        self.range(None, UpperBound::Unbounded)
    }

    fn range(&self, start: Option<Vec<u8>>, upper: UpperBound) -> Result<RangeIter> {
        let merged = self.merge_iterator()?;
        RangeIter::new(merged, start, upper, self.order.clone())
    }

    /// Merge over the current snapshot: overlays newest first, then the
    /// immutable index.
    fn merge_iterator(&self) -> Result<MergeIterator> {
        let state = self.snapshot();
        let mut sources: Vec<Box<dyn StorageIterator>> = Vec::with_capacity(state.frozen.len() + 2);
        for overlay in state.overlays() {
            sources.push(Box::new(overlay.iter()));
        }
        sources.push(state.immutable.iter()?);
        MergeIterator::new(sources, self.order.clone())
    }

    /// Watermark of the current immutable index.
    pub fn last_persistent_lsn(&self) -> Lsn {
        self.snapshot().immutable.last_persistent_lsn()
    }

    /// Freeze the tail and start a new one. An empty tail is kept as is.
    pub fn rotate_tail(&self) {
        let mut guard = self.state.write();
        if guard.tail.is_empty() {
            return;
        }
        let mut frozen = Vec::with_capacity(guard.frozen.len() + 1);
        frozen.push(Arc::clone(&guard.tail));
        frozen.extend(guard.frozen.iter().cloned());
        debug!(index = %self.name, frozen = frozen.len(), "rotated tail overlay");
        *guard = Arc::new(IndexState {
            tail: Arc::new(Overlay::new(self.order.clone())),
            frozen,
            immutable: Arc::clone(&guard.immutable),
        });
    }

    /// Make `immutable` the index's persisted state. Frozen overlays whose
    /// every entry it covers are dropped in the same swap.
    pub fn install(&self, immutable: ImmutableIndex) {
        let watermark = immutable.last_persistent_lsn();
        let mut guard = self.state.write();
        let frozen: Vec<_> = guard
            .frozen
            .iter()
            .filter(|o| o.max_lsn() > watermark)
            .cloned()
            .collect();
        debug!(
            index = %self.name,
            watermark,
            dropped_overlays = guard.frozen.len() - frozen.len(),
            "installed immutable index"
        );
        *guard = Arc::new(IndexState {
            tail: Arc::clone(&guard.tail),
            frozen,
            immutable: Arc::new(immutable),
        });
    }

    /// Let the log drop records this index has captured, then remove any
    /// table the index no longer references.
    ///
    /// `upto` is clamped to this index's own watermark; callers with several
    /// indices pass the minimum across all of them.
    pub fn cleanup(&self, upto: Lsn, log: &mut Log, destination: Option<&Path>) -> Result<usize> {
        let upto = upto.min(self.last_persistent_lsn());
        let sections = log.cleanup(upto, destination)?;
        self.reclaim_orphans()?;
        Ok(sections)
    }

    /// Remove table files and pointer scratch files not referenced by the
    /// current immutable index. Individual failures are logged and skipped.
    pub(crate) fn reclaim_orphans(&self) -> Result<usize> {
        let current = self.snapshot().immutable.table_path().map(Path::to_path_buf);
        let mut reclaimed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_table = path.extension().is_some_and(|ext| ext == TABLE_EXT);
            if !(is_table || manifest::is_scratch_file(file_name)) {
                continue;
            }
            if current.as_deref() == Some(path.as_path()) {
                continue;
            }
            match reclaim_file(&path, None) {
                Ok(()) => {
                    debug!(index = %self.name, file = %path.display(), "reclaimed orphan file");
                    reclaimed += 1;
                }
                Err(e) => warn!(
                    index = %self.name,
                    file = %path.display(),
                    error = %e,
                    "could not reclaim orphan file"
                ),
            }
        }
        Ok(reclaimed)
    }

    pub(crate) fn snapshot(&self) -> Arc<IndexState> {
        Arc::clone(&self.state.read())
    }

    /// Overlays currently waiting for compaction.
    pub fn frozen_overlays(&self) -> usize {
        self.snapshot().frozen.len()
    }

    /// Entries buffered in the tail and frozen overlays.
    pub fn buffered_entries(&self) -> usize {
        self.snapshot().overlays().map(|o| o.len()).sum()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn order(&self) -> &OrderRef {
        &self.order
    }
}
