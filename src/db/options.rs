use crate::compaction::CompactionOptions;
use crate::wal::{LogOptions, SyncPolicy};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// When the log is fsync'd besides `commit`.
    pub sync_policy: SyncPolicy,
    /// Log sections are sealed once they grow past this size.
    pub section_bytes: u64,
    /// Target data block size in compaction output.
    pub block_size: usize,
    /// Bloom filter false positive rate for compaction output.
    pub bloom_false_positive_rate: f64,
    /// Create the store directory if it does not exist.
    pub create_if_missing: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            sync_policy: SyncPolicy::OnCommit,
            section_bytes: 16 * 1024 * 1024,
            block_size: 4096,
            bloom_false_positive_rate: 0.01,
            create_if_missing: true,
        }
    }
}

impl Options {
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub fn section_bytes(mut self, bytes: u64) -> Self {
        self.section_bytes = bytes;
        self
    }

    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    pub fn bloom_false_positive_rate(mut self, rate: f64) -> Self {
        self.bloom_false_positive_rate = rate;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub(crate) fn log_options(&self) -> LogOptions {
        LogOptions {
            sync_policy: self.sync_policy,
            section_bytes: self.section_bytes,
        }
    }

    pub(crate) fn compaction_options(&self) -> CompactionOptions {
        CompactionOptions {
            block_size: self.block_size,
            bloom_false_positive_rate: self.bloom_false_positive_rate,
        }
    }
}
