pub mod operation;
pub mod options;
mod recovery;
pub mod sequence;
pub mod stats;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::compaction::{CompactionOutcome, Compactor};
use crate::error::{Error, Result};
use crate::index::MergedIndex;
use crate::iterator::RangeIter;
use crate::order::{OrderRef, bytewise};
use crate::types::{Lsn, Value};
use crate::wal::{Log, LogEntry};
pub use operation::Operation;
pub use options::Options;
use recovery::Watermarks;
pub use sequence::Sequence;
use stats::Counters;
pub use stats::Stats;

const LOG_DIR: &str = "log";
const INDEX_DIR: &str = "indexes";

/// A named index and the key order it is sorted by.
#[derive(Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub order: OrderRef,
}

impl IndexDescriptor {
    /// An index in plain byte order.
    pub fn new(name: &str) -> Self {
        Self::with_order(name, bytewise())
    }

    pub fn with_order(name: &str, order: OrderRef) -> Self {
        IndexDescriptor {
            name: name.to_string(),
            order,
        }
    }
}

/// The store: several named indices sharing one log.
///
/// Write path:
///   add/remove → log append (under the writer lock) → index tail overlay
///   commit     → log fsync
///
/// Read path:
///   lookup/range_lookup → index snapshot → overlays, then immutable index
///
/// Writes are serialized by the writer lock, which also owns LSN assignment.
/// Reads take no store-level lock. Compaction holds the writer lock only
/// while it takes its cut.
pub struct DB {
    path: PathBuf,
    options: Options,
    indexes: BTreeMap<String, MergedIndex>,
    writer: Mutex<Log>,
    sequence: Sequence,
    /// Serializes compaction passes and log cleanup.
    compaction: Mutex<()>,
    counters: Counters,
}

impl DB {
    /// Open a store with the given indices, all in byte order and with
    /// default options.
    pub fn open(path: impl AsRef<Path>, indexes: &[&str]) -> Result<Self> {
        let descriptors = indexes.iter().map(|name| IndexDescriptor::new(name)).collect();
        Self::open_with(path, Options::default(), descriptors)
    }

    /// Open a store, recovering every index from its last published state
    /// plus the log.
    ///
    /// Recovery algorithm:
    /// 1. Open each index from its pointer record → per-index watermark
    /// 2. Load the log sections that may hold LSNs above the lowest watermark
    /// 3. Re-apply every entry above its own index's watermark
    pub fn open_with(
        path: impl AsRef<Path>,
        options: Options,
        descriptors: Vec<IndexDescriptor>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            if !options.create_if_missing {
                return Err(Error::InvalidArgument(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            fs::create_dir_all(&path)?;
        }
        if descriptors.is_empty() {
            return Err(Error::InvalidArgument("a store needs at least one index".into()));
        }

        let mut indexes = BTreeMap::new();
        for descriptor in descriptors {
            validate_index_name(&descriptor.name)?;
            if indexes.contains_key(&descriptor.name) {
                return Err(Error::InvalidArgument(format!(
                    "index {} named twice",
                    descriptor.name
                )));
            }
            let dir = path.join(INDEX_DIR).join(&descriptor.name);
            let index = MergedIndex::open(&dir, &descriptor.name, descriptor.order)?;
            indexes.insert(descriptor.name, index);
        }

        let watermarks = Watermarks::capture(&indexes);
        let mut log = Log::open(&path.join(LOG_DIR), options.log_options())?;
        let last_lsn = log.load_required_sections(watermarks.min())?;
        let replayed = recovery::replay(&mut log, &indexes, &watermarks)?;
        let sequence = Sequence::new(last_lsn.max(watermarks.max()));

        info!(
            path = %path.display(),
            indexes = indexes.len(),
            current_lsn = sequence.current(),
            min_persistent_lsn = watermarks.min(),
            replayed,
            "store opened"
        );

        let counters = Counters::default();
        counters
            .replayed
            .store(replayed, std::sync::atomic::Ordering::Relaxed);

        Ok(DB {
            path,
            options,
            indexes,
            writer: Mutex::new(log),
            sequence,
            compaction: Mutex::new(()),
            counters,
        })
    }

    /// Set `key` to `value` in `index`. Returns the write's LSN.
    /// Durable once a later `commit` returns.
    pub fn add(&self, index: &str, key: &[u8], value: &[u8]) -> Result<Lsn> {
        let target = self.index(index)?;
        let lsn = self.write(Operation::set(index, key, value), |lsn| {
            target.add(lsn, key, value)
        })?;
        Counters::bump(&self.counters.adds);
        Ok(lsn)
    }

    /// Delete `key` from `index`. Returns the write's LSN.
    pub fn remove(&self, index: &str, key: &[u8]) -> Result<Lsn> {
        let target = self.index(index)?;
        let lsn = self.write(Operation::delete(index, key), |lsn| target.remove(lsn, key))?;
        Counters::bump(&self.counters.removes);
        Ok(lsn)
    }

    /// Assign the next LSN, append `op` to the log, then run `apply`.
    ///
    /// All three happen under the writer lock, so overlays see writes in
    /// LSN order and a tail rotation never splits an LSN from its effect.
    fn write(&self, op: Operation, apply: impl FnOnce(Lsn)) -> Result<Lsn> {
        let mut log = self.writer.lock();
        let lsn = self.sequence.next();
        log.append(&LogEntry::new(lsn, op.encode()))?;
        self.sequence.advance(lsn);
        apply(lsn);
        Ok(lsn)
    }

    /// Make every write so far durable.
    pub fn commit(&self) -> Result<()> {
        self.writer.lock().commit()?;
        Counters::bump(&self.counters.commits);
        Ok(())
    }

    /// Newest value of `key` in `index`, or `None` if absent or deleted.
    pub fn lookup(&self, index: &str, key: &[u8]) -> Result<Option<Value>> {
        self.index(index)?.lookup(key)
    }

    /// Live entries of `index` with `low <= key < high`, ascending.
    pub fn range_lookup(&self, index: &str, low: &[u8], high: &[u8]) -> Result<RangeIter> {
        self.index(index)?.range_lookup(low, high)
    }

    /// Live entries of `index` whose key starts with `prefix`.
    pub fn prefix_lookup(&self, index: &str, prefix: &[u8]) -> Result<RangeIter> {
        self.index(index)?.prefix_lookup(prefix)
    }

    /// Every live entry of `index`.
    pub fn iter(&self, index: &str) -> Result<RangeIter> {
        self.index(index)?.iter()
    }

    /// Compact every index, then reclaim log sections all of them have
    /// captured. With a destination, sections are moved there instead of
    /// deleted. Returns the new lowest watermark.
    ///
    /// The cut is taken under the writer lock together with tail rotation
    /// and a log seal, so every write is either at or below the cut and in
    /// a frozen overlay, or above it and in a fresh tail.
    pub fn compact(&self, destination: Option<&Path>) -> Result<Lsn> {
        let _serial = self.compaction.lock();

        let (cut, collections) = {
            let mut log = self.writer.lock();
            let cut = self.sequence.current();
            for index in self.indexes.values() {
                index.rotate_tail();
            }
            log.seal()?;
            let mut collections = Vec::with_capacity(self.indexes.len());
            for index in self.indexes.values() {
                let from = index.last_persistent_lsn() + 1;
                collections.push(log.iter_range(from, cut)?);
            }
            (cut, collections)
        };

        let mut outcomes: Vec<CompactionOutcome> = Vec::with_capacity(self.indexes.len());
        for (index, entries) in self.indexes.values().zip(collections) {
            let mut compactor = Compactor::new(index, self.options.compaction_options());
            outcomes.push(compactor.run(entries, cut)?);
        }
        Counters::bump(&self.counters.compactions);

        let min = self.min_persistent_lsn();
        let mut log = self.writer.lock();
        let mut reclaimed = 0;
        for index in self.indexes.values() {
            match index.cleanup(min, &mut log, destination) {
                Ok(sections) => reclaimed += sections,
                Err(e) => {
                    warn!(index = %index.name(), error = %e, "log cleanup failed");
                    break;
                }
            }
        }

        info!(
            cut,
            min_persistent_lsn = min,
            entries = outcomes.iter().map(|o| o.entries).sum::<u64>(),
            reclaimed_sections = reclaimed,
            "compaction finished"
        );
        Ok(min)
    }

    /// Highest LSN assigned so far.
    pub fn current_lsn(&self) -> Lsn {
        self.sequence.current()
    }

    /// Lowest persisted watermark across every index.
    pub fn min_persistent_lsn(&self) -> Lsn {
        self.indexes
            .values()
            .map(MergedIndex::last_persistent_lsn)
            .min()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> Stats {
        let log_sections = self.writer.lock().sections().len();
        Stats {
            current_lsn: self.current_lsn(),
            min_persistent_lsn: self.min_persistent_lsn(),
            adds: Counters::get(&self.counters.adds),
            removes: Counters::get(&self.counters.removes),
            commits: Counters::get(&self.counters.commits),
            compactions: Counters::get(&self.counters.compactions),
            replayed: Counters::get(&self.counters.replayed),
            log_sections,
        }
    }

    /// The named index, for direct inspection.
    pub fn index(&self, name: &str) -> Result<&MergedIndex> {
        self.indexes
            .get(name)
            .ok_or_else(|| Error::UnknownIndex(name.to_string()))
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Index names become directory names.
fn validate_index_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && name.len() <= u16::MAX as usize;
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("invalid index name {name:?}")))
    }
}
