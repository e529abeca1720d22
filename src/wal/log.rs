use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Lsn;
use crate::wal::SyncPolicy;
use crate::wal::reader::SectionReader;
use crate::wal::record::LogEntry;
use crate::wal::writer::SectionWriter;

const SECTION_EXT: &str = "log";

/// Tuning for the log.
#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub sync_policy: SyncPolicy,
    /// The open section is sealed once it grows past this many bytes.
    pub section_bytes: u64,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            sync_policy: SyncPolicy::OnCommit,
            section_bytes: 16 * 1024 * 1024,
        }
    }
}

/// One section file. Its LSN range runs from `first_lsn` up to the next
/// section's `first_lsn - 1` (or the log's last LSN for the newest one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub first_lsn: Lsn,
    pub path: PathBuf,
}

/// Append-only, section-partitioned record store.
///
/// Sections are named `<first_lsn>.log` and only ever appended to while they
/// are the open section. Rotation seals the open section; the next append
/// starts a new file. Old sections go away through `cleanup` once every
/// index has captured their records.
///
/// The log is the durability authority of the store: nothing is safe until
/// `commit` returns. A failed append or commit poisons the log, because the
/// state of the file tail is no longer known.
pub struct Log {
    dir: PathBuf,
    options: LogOptions,
    /// Ascending by `first_lsn`. Includes the open section, if any.
    sections: Vec<Section>,
    /// Writer for `sections.last()` while it is open.
    active: Option<SectionWriter>,
    last_lsn: Lsn,
    /// Sections ending at or below this LSN are never read.
    floor: Lsn,
    loaded: bool,
    failed: bool,
}

impl Log {
    /// Open the log directory, creating it if needed. No section is read yet;
    /// call `load_required_sections` before appending or iterating.
    pub fn open(dir: &Path, options: LogOptions) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut sections = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != SECTION_EXT) {
                continue;
            }
            let first_lsn = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Lsn>().ok());
            match first_lsn {
                Some(first_lsn) => sections.push(Section { first_lsn, path }),
                None => warn!(path = %path.display(), "ignoring unparseable log section name"),
            }
        }
        sections.sort_by_key(|s| s.first_lsn);

        debug!(dir = %dir.display(), sections = sections.len(), "log opened");

        Ok(Log {
            dir: dir.to_path_buf(),
            options,
            sections,
            active: None,
            last_lsn: 0,
            floor: 0,
            loaded: false,
            failed: false,
        })
    }

    /// Prepare the sections that may hold LSNs above `min_persistent_lsn`.
    ///
    /// Sections wholly at or below the watermark are not touched. The newest
    /// section is scanned: a torn tail from a crash mid-append is cut off,
    /// and an empty newest section is removed. A damaged record that valid
    /// records follow is `Corruption`; nothing is truncated then. Returns the highest LSN in the
    /// log (0 if there is none).
    pub fn load_required_sections(&mut self, min_persistent_lsn: Lsn) -> Result<Lsn> {
        self.floor = min_persistent_lsn;
        self.last_lsn = 0;

        while let Some(section) = self.sections.last().cloned() {
            let scan = SectionReader::new(&section.path)?.scan();

            if let Some((prev, next)) = scan.out_of_order {
                return Err(Error::Corruption(format!(
                    "{}: LSN {next} follows {prev}",
                    section.path.display()
                )));
            }
            if let Some(first) = scan.first_lsn {
                if first < section.first_lsn {
                    return Err(Error::Corruption(format!(
                        "{}: first LSN {first} below section start {}",
                        section.path.display(),
                        section.first_lsn
                    )));
                }
            }

            if let Some(detail) = scan.corruption {
                return Err(Error::Corruption(format!(
                    "{}: {detail}",
                    section.path.display()
                )));
            }

            if scan.torn_bytes() > 0 {
                warn!(
                    section = %section.path.display(),
                    torn_bytes = scan.torn_bytes(),
                    valid_entries = scan.entries,
                    "truncating torn log tail"
                );
                let file = OpenOptions::new().write(true).open(&section.path)?;
                file.set_len(scan.valid_len)?;
                file.sync_all()?;
            }

            match scan.last_lsn {
                Some(last) => {
                    self.last_lsn = last;
                    break;
                }
                None => {
                    debug!(section = %section.path.display(), "removing empty log section");
                    fs::remove_file(&section.path)?;
                    self.sections.pop();
                }
            }
        }

        let required = (0..self.sections.len())
            .filter(|&i| self.section_end(i) > self.floor)
            .count();
        self.loaded = true;
        info!(
            min_persistent_lsn,
            last_lsn = self.last_lsn,
            sections = self.sections.len(),
            required,
            "log sections loaded"
        );

        Ok(self.last_lsn)
    }

    /// Append an entry to the open section, opening one if needed.
    ///
    /// The entry's LSN must exceed every LSN already in the log. Visible to
    /// iteration immediately; durable only after `commit` (or earlier, as
    /// the sync policy dictates). `Ok` means the entry is in the log. If the
    /// rotation after a full section fails, the log is poisoned and the next
    /// call returns `LogFailed`.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        if self.failed {
            return Err(Error::LogFailed);
        }
        if !self.loaded {
            return Err(Error::InvalidArgument(
                "log sections must be loaded before appending".into(),
            ));
        }
        if entry.lsn <= self.last_lsn {
            return Err(Error::InvalidArgument(format!(
                "LSN {} does not follow {}",
                entry.lsn, self.last_lsn
            )));
        }

        if self.active.is_none() {
            let path = self.dir.join(format!("{:020}.{SECTION_EXT}", entry.lsn));
            let writer = SectionWriter::new(&path, self.options.sync_policy)
                .and_then(|w| sync_dir(&self.dir).map(|_| w))
                .inspect_err(|_| self.failed = true)?;
            debug!(section = %path.display(), "opened log section");
            self.sections.push(Section {
                first_lsn: entry.lsn,
                path,
            });
            self.active = Some(writer);
        }

        if let Some(writer) = self.active.as_mut() {
            if let Err(e) = writer.append(entry) {
                self.failed = true;
                return Err(e);
            }
            self.last_lsn = entry.lsn;
            if writer.offset() >= self.options.section_bytes {
                // The entry is already in the section; a failed rotation
                // poisons the log and surfaces on the next call instead.
                if let Err(e) = self.seal() {
                    warn!(lsn = entry.lsn, error = %e, "sealing full log section failed");
                }
            }
        }

        Ok(())
    }

    /// Durability barrier: everything appended so far is on disk when this
    /// returns `Ok`. On failure the log is poisoned.
    pub fn commit(&mut self) -> Result<()> {
        if self.failed {
            return Err(Error::LogFailed);
        }
        if let Some(writer) = self.active.as_mut() {
            if let Err(e) = writer.sync() {
                self.failed = true;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Seal the open section. The next append starts a new one.
    pub fn seal(&mut self) -> Result<()> {
        if let Some(mut writer) = self.active.take() {
            if let Err(e) = writer.sync() {
                self.failed = true;
                return Err(e);
            }
            debug!(section = %writer.path().display(), last_lsn = self.last_lsn, "sealed log section");
        }
        Ok(())
    }

    /// Lazily iterate every entry with `lsn >= from`, ascending.
    pub fn iter(&mut self, from: Lsn) -> Result<LogIterator> {
        self.iter_range(from, Lsn::MAX)
    }

    /// Lazily iterate entries with `from <= lsn <= to`, ascending.
    ///
    /// The iterator reads one section at a time and sees each section only
    /// up to the length it had when the iterator was created, so it can be
    /// drained while new entries are appended.
    pub fn iter_range(&mut self, from: Lsn, to: Lsn) -> Result<LogIterator> {
        if let Some(writer) = self.active.as_mut() {
            writer.flush()?;
        }

        let mut pending = VecDeque::new();
        for i in 0..self.sections.len() {
            let start = self.sections[i].first_lsn;
            let end = self.section_end(i);
            if end <= self.floor || end < from || start > to {
                continue;
            }
            let limit = match &self.active {
                Some(writer) if i + 1 == self.sections.len() => writer.offset(),
                _ => u64::MAX,
            };
            pending.push_back((self.sections[i].path.clone(), limit));
        }

        Ok(LogIterator {
            pending,
            current: VecDeque::new().into_iter(),
            from,
            to,
            prev_lsn: None,
            done: false,
        })
    }

    /// Remove sealed sections whose whole LSN range is at or below `upto`.
    ///
    /// With a destination the files are moved there instead of deleted.
    /// The open section is never touched. Returns the number of sections
    /// reclaimed.
    pub fn cleanup(&mut self, upto: Lsn, destination: Option<&Path>) -> Result<usize> {
        if let Some(dest) = destination {
            fs::create_dir_all(dest)?;
        }

        let open = usize::from(self.active.is_some());
        let reclaimable = self.sections.len() - open;
        let mut count = 0;
        while count < reclaimable && self.section_end(count) <= upto {
            count += 1;
        }

        let mut removed = 0;
        let mut failure = None;
        for section in &self.sections[..count] {
            if let Err(e) = reclaim_file(&section.path, destination) {
                failure = Some(e);
                break;
            }
            removed += 1;
        }
        self.sections.drain(..removed);

        if removed > 0 {
            sync_dir(&self.dir)?;
            info!(upto, removed, archived = destination.is_some(), "log sections reclaimed");
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Highest LSN appended (or found at load).
    pub fn last_lsn(&self) -> Lsn {
        self.last_lsn
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True once a failed append or commit poisoned the log.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Last LSN that section `i` can contain.
    fn section_end(&self, i: usize) -> Lsn {
        match self.sections.get(i + 1) {
            Some(next) => next.first_lsn - 1,
            None => self.last_lsn,
        }
    }
}

/// Ascending, lazily loaded sequence of log entries.
///
/// Any undecodable frame is an `Error::Corruption`: torn tails were already
/// removed by `load_required_sections`, so what is left must be intact.
pub struct LogIterator {
    pending: VecDeque<(PathBuf, u64)>,
    current: std::collections::vec_deque::IntoIter<LogEntry>,
    from: Lsn,
    to: Lsn,
    prev_lsn: Option<Lsn>,
    done: bool,
}

impl LogIterator {
    fn load_next_section(&mut self) -> Result<bool> {
        let Some((path, limit)) = self.pending.pop_front() else {
            return Ok(false);
        };

        let reader = SectionReader::with_limit(&path, limit)?;
        let mut entries = VecDeque::new();
        for entry in reader.iter() {
            let entry = entry.map_err(|e| {
                Error::Corruption(format!("{}: {e}", path.display()))
            })?;
            if entry.lsn >= self.from && entry.lsn <= self.to {
                entries.push_back(entry);
            }
        }
        self.current = entries.into_iter();
        Ok(true)
    }
}

impl Iterator for LogIterator {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Some(entry) = self.current.next() {
                if let Some(prev) = self.prev_lsn {
                    if entry.lsn <= prev {
                        self.done = true;
                        return Some(Err(Error::Corruption(format!(
                            "log LSN {} follows {prev}",
                            entry.lsn
                        ))));
                    }
                }
                self.prev_lsn = Some(entry.lsn);
                return Some(Ok(entry));
            }

            match self.load_next_section() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Delete `path`, or move it into `destination`.
pub(crate) fn reclaim_file(path: &Path, destination: Option<&Path>) -> Result<()> {
    match destination {
        None => fs::remove_file(path)?,
        Some(dest) => {
            let Some(name) = path.file_name() else {
                return Err(Error::InvalidArgument(format!(
                    "cannot archive {}",
                    path.display()
                )));
            };
            let target = dest.join(name);
            if fs::rename(path, &target).is_err() {
                // Different filesystem: fall back to copy + remove.
                fs::copy(path, &target)?;
                File::open(&target)?.sync_all()?;
                fs::remove_file(path)?;
            }
        }
    }
    Ok(())
}

/// fsync a directory so renames and new files inside it are durable.
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
