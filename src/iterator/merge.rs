use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::order::OrderRef;
use crate::types::Key;

/// Heap entry: the current key of one source.
///
/// `BinaryHeap` is a max-heap, so the ordering is inverted: the smallest
/// key pops first, and among equal keys the lowest source index (newest).
struct HeapItem {
    key: Key,
    source: usize,
    order: OrderRef,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .compare(&other.key, &self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges multiple sorted iterators into a single sorted stream.
///
/// Used for:
/// - Range lookups across overlays + the immutable index
/// - Compaction (merging the collected batch with the immutable index)
///
/// Sources are ordered by priority: index 0 = newest. For a key present in
/// several sources only the newest version is considered; if that version
/// is a tombstone the key is skipped entirely. The merged stream therefore
/// never yields tombstones and `value()` is always `Some`.
pub struct MergeIterator {
    iters: Vec<Box<dyn StorageIterator>>,
    heap: BinaryHeap<HeapItem>,
    order: OrderRef,
    current: Option<(Key, Vec<u8>)>,
}

impl MergeIterator {
    /// Create a new MergeIterator positioned at the first live entry.
    pub fn new(iters: Vec<Box<dyn StorageIterator>>, order: OrderRef) -> Result<Self> {
        let mut merged = MergeIterator {
            iters,
            heap: BinaryHeap::new(),
            order,
            current: None,
        };
        merged.rebuild_heap();
        merged.advance()?;
        Ok(merged)
    }

    fn rebuild_heap(&mut self) {
        self.heap.clear();
        for source in 0..self.iters.len() {
            self.push_source(source);
        }
    }

    fn push_source(&mut self, source: usize) {
        let iter = &self.iters[source];
        if iter.is_valid() {
            self.heap.push(HeapItem {
                key: iter.key().to_vec(),
                source,
                order: self.order.clone(),
            });
        }
    }

    /// Pop the next distinct key, advancing every source that holds it.
    /// Repeats until a key whose newest version is live, or exhaustion.
    fn advance(&mut self) -> Result<()> {
        self.current = None;

        while let Some(top) = self.heap.pop() {
            let winner = self.iters[top.source].value().map(|v| v.to_vec());

            self.iters[top.source].next()?;
            self.push_source(top.source);

            // Drop shadowed versions of the same key from older sources.
            while let Some(peek) = self.heap.peek() {
                if self.order.compare(&peek.key, &top.key) != Ordering::Equal {
                    break;
                }
                let source = peek.source;
                self.heap.pop();
                self.iters[source].next()?;
                self.push_source(source);
            }

            if let Some(value) = winner {
                self.current = Some((top.key, value));
                return Ok(());
            }
        }

        Ok(())
    }
}

impl StorageIterator for MergeIterator {
    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or_default()
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        self.advance()
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        for iter in self.iters.iter_mut() {
            iter.seek(key)?;
        }
        self.rebuild_heap();
        self.advance()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        for iter in self.iters.iter_mut() {
            iter.seek_to_first()?;
        }
        self.rebuild_heap();
        self.advance()
    }
}
