//! Folds logged writes into a new immutable index.
//!
//! One pass over one index:
//!
//! ```text
//!   Idle ──► Collecting ──► Merging ──► Publishing ──► Idle
//!              │               │            │
//!              └───────────────┴────────────┴──► Idle (CompactionAborted)
//! ```
//!
//! - Collecting: log entries for this index with `watermark < lsn <= cut`,
//!   in LSN order, sorted by key with the newest write per key kept.
//! - Merging: the batch shadows the current immutable index; tombstones are
//!   purged because nothing older than the immutable index exists.
//! - Publishing: index pointer replaced, new state installed, superseded
//!   table removed.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::operation::Operation;
use crate::error::{Error, Result};
use crate::index::{ImmutableIndex, MergedIndex};
use crate::iterator::{MergeIterator, StorageIterator, VecIterator};
use crate::manifest::{self, IndexPointer};
use crate::sstable::{SSTable, SSTableBuilder};
use crate::types::{Key, Lsn, Slot, ValueType};
use crate::wal::{LogEntry, reclaim_file};

/// Table layout parameters for compaction output.
#[derive(Debug, Clone, Copy)]
pub struct CompactionOptions {
    pub block_size: usize,
    pub bloom_false_positive_rate: f64,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        CompactionOptions {
            block_size: 4096,
            bloom_false_positive_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    Idle,
    Collecting,
    Merging,
    Publishing,
}

/// What a finished pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub watermark: Lsn,
    /// Log entries for this index folded in.
    pub collected: usize,
    /// Live entries in the new immutable index.
    pub entries: u64,
    /// `None` when the index ended up empty.
    pub table: Option<PathBuf>,
}

/// Runs compaction passes over one merged index.
pub struct Compactor<'a> {
    index: &'a MergedIndex,
    options: CompactionOptions,
    state: CompactionState,
}

impl<'a> Compactor<'a> {
    pub fn new(index: &'a MergedIndex, options: CompactionOptions) -> Self {
        Compactor {
            index,
            options,
            state: CompactionState::Idle,
        }
    }

    pub fn state(&self) -> CompactionState {
        self.state
    }

    fn transition(&mut self, next: CompactionState) {
        debug!(index = %self.index.name(), from = ?self.state, to = ?next, "compaction state");
        self.state = next;
    }

    /// Fold `entries` (log entries up to `cut`, ascending) into a new
    /// immutable index with watermark `cut`.
    ///
    /// On failure the previous immutable index stays in place and the
    /// error comes back wrapped in `CompactionAborted`.
    pub fn run<I>(&mut self, entries: I, cut: Lsn) -> Result<CompactionOutcome>
    where
        I: IntoIterator<Item = Result<LogEntry>>,
    {
        let result = self.run_phases(entries, cut);
        if self.state != CompactionState::Idle {
            self.transition(CompactionState::Idle);
        }
        result.map_err(|source| Error::CompactionAborted {
            index: self.index.name().to_string(),
            source: Box::new(source),
        })
    }

    fn run_phases<I>(&mut self, entries: I, cut: Lsn) -> Result<CompactionOutcome>
    where
        I: IntoIterator<Item = Result<LogEntry>>,
    {
        let current = self.index.snapshot().immutable.clone();
        let watermark = current.last_persistent_lsn();
        if cut <= watermark {
            return Ok(CompactionOutcome {
                watermark,
                collected: 0,
                entries: current.len(),
                table: current.table_path().map(|p| p.to_path_buf()),
            });
        }

        self.transition(CompactionState::Collecting);
        let batch = self.collect(entries, watermark, cut)?;
        let collected = batch.len();

        self.transition(CompactionState::Merging);
        let merged = self.merge(batch, &current, cut)?;

        self.transition(CompactionState::Publishing);
        self.publish(merged, &current)?;

        let installed = self.index.snapshot().immutable.clone();
        let outcome = CompactionOutcome {
            watermark: cut,
            collected,
            entries: installed.len(),
            table: installed.table_path().map(|p| p.to_path_buf()),
        };
        info!(
            index = %self.index.name(),
            watermark = cut,
            collected,
            entries = outcome.entries,
            "compaction published"
        );
        Ok(outcome)
    }

    /// Sorted, de-duplicated batch of this index's writes in `(watermark, cut]`.
    fn collect<I>(&self, entries: I, watermark: Lsn, cut: Lsn) -> Result<Vec<(Key, Slot)>>
    where
        I: IntoIterator<Item = Result<LogEntry>>,
    {
        let mut batch = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.lsn <= watermark {
                continue;
            }
            if entry.lsn > cut {
                break;
            }
            let op = Operation::decode(&entry.payload)?;
            if op.index != self.index.name() {
                continue;
            }
            let slot = match op.op {
                ValueType::Set => Slot::from(op.value),
                ValueType::Delete => Slot::Tombstone,
            };
            batch.push((op.key, slot));
        }

        // Stable: equal keys keep LSN order, so the last one is the newest.
        let order = self.index.order().clone();
        batch.sort_by(|a, b| order.compare(&a.0, &b.0));
        let mut deduped: Vec<(Key, Slot)> = Vec::with_capacity(batch.len());
        for (key, slot) in batch {
            match deduped.last_mut() {
                Some(last) if order.compare(&last.0, &key) == Ordering::Equal => last.1 = slot,
                _ => deduped.push((key, slot)),
            }
        }
        Ok(deduped)
    }

    /// Build the immutable index at `cut` from `batch` over `current`.
    fn merge(
        &self,
        batch: Vec<(Key, Slot)>,
        current: &ImmutableIndex,
        cut: Lsn,
    ) -> Result<ImmutableIndex> {
        let order = self.index.order().clone();
        if batch.is_empty() {
            return Ok(ImmutableIndex::new(current.table().cloned(), cut, order));
        }
        let expected_keys = batch.len() + current.len() as usize;

        let sources: Vec<Box<dyn StorageIterator>> = vec![
            Box::new(VecIterator::new(batch, order.clone())),
            current.iter()?,
        ];
        let mut merged = MergeIterator::new(sources, order.clone())?;

        let path = self.index.dir().join(manifest::table_file_name(cut));
        let mut builder = SSTableBuilder::new(
            &path,
            cut,
            self.options.block_size,
            expected_keys,
            self.options.bloom_false_positive_rate,
        )?;

        let mut written = 0u64;
        let built = (|| -> Result<()> {
            while merged.is_valid() {
                builder.add(merged.key(), merged.value().unwrap_or_default())?;
                written += 1;
                merged.next()?;
            }
            Ok(())
        })();
        if let Err(e) = built {
            discard(builder);
            return Err(e);
        }

        if written == 0 {
            discard(builder);
            return Ok(ImmutableIndex::new(None, cut, order));
        }

        if let Err(e) = builder.finish() {
            remove_partial(&path);
            return Err(e);
        }
        match SSTable::open(&path, order.clone()) {
            Ok(table) => Ok(ImmutableIndex::new(Some(Arc::new(table)), cut, order)),
            Err(e) => {
                remove_partial(&path);
                Err(e)
            }
        }
    }

    /// Two-phase publish: durable pointer first, then the in-memory swap,
    /// then best-effort removal of the superseded table.
    fn publish(&self, next: ImmutableIndex, previous: &ImmutableIndex) -> Result<()> {
        let table = next
            .table_path()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string);
        let pointer = IndexPointer {
            order_name: self.index.order().name().to_string(),
            table,
            watermark: next.last_persistent_lsn(),
        };
        // A failure here may or may not have replaced CURRENT, so the new
        // table is left for the next open to keep or reclaim.
        manifest::publish(self.index.dir(), &pointer)?;

        let superseded = previous
            .table_path()
            .filter(|old| next.table_path() != Some(*old))
            .map(|p| p.to_path_buf());
        self.index.install(next);

        if let Some(old) = superseded {
            if let Err(e) = reclaim_file(&old, None) {
                warn!(
                    index = %self.index.name(),
                    table = %old.display(),
                    error = %e,
                    "could not remove superseded table"
                );
            }
        }
        Ok(())
    }
}

fn discard(builder: SSTableBuilder) {
    let path = builder.path().to_path_buf();
    if let Err(e) = builder.abandon() {
        warn!(table = %path.display(), error = %e, "could not remove partial table");
    }
}

fn remove_partial(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(table = %path.display(), error = %e, "could not remove partial table");
    }
}
