use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Result;
use crate::wal::SyncPolicy;
use crate::wal::record::LogEntry;

/// Appends framed entries to one log section file.
///
/// Two layers of buffering:
///   BufWriter.flush()  → Rust buffer → OS page cache
///   file.sync_all()    → OS page cache → physical disk
///
/// `append` only guarantees the first layer (plus whatever the sync policy
/// adds). `sync` is the durability barrier.
pub struct SectionWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
    sync_policy: SyncPolicy,
    writes_since_sync: usize,
    last_sync: Instant,
}

impl SectionWriter {
    /// Open (or create) a section file for appending.
    pub fn new(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();

        Ok(SectionWriter {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offset,
            sync_policy,
            writes_since_sync: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append an entry. Depending on the sync policy, may fsync after it.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let encoded = entry.encode();

        self.writer.write_all(&encoded)?;
        self.writer.flush()?;
        self.offset += encoded.len() as u64;
        self.writes_since_sync += 1;

        match self.sync_policy {
            SyncPolicy::EveryWrite => self.sync()?,
            SyncPolicy::EveryNWrites(n) => {
                if self.writes_since_sync >= n {
                    self.sync()?;
                }
            }
            SyncPolicy::EveryNMillis(ms) => {
                if self.last_sync.elapsed().as_millis() >= u128::from(ms) {
                    self.sync()?;
                }
            }
            SyncPolicy::OnCommit => {}
        }

        Ok(())
    }

    /// Force fsync to disk. Ensures all buffered writes are durable.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Push the user-space buffer to the OS without fsync, so readers of the
    /// file see every appended byte.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Current file offset (bytes written so far).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Appends since the last fsync.
    pub fn writes_since_sync(&self) -> usize {
        self.writes_since_sync
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
