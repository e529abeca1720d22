pub mod log;
pub mod reader;
pub mod record;
pub mod writer;

pub use log::{Log, LogIterator, LogOptions, Section};
pub(crate) use log::{reclaim_file, sync_dir};
pub use record::LogEntry;

/// Controls when the open log section is fsync'd to disk, on top of the
/// fsync that every `commit` performs.
///
/// Trade-off: durability vs throughput.
///   - EveryWrite: zero data loss, ~10x slower (each fsync waits for disk)
///   - EveryNWrites: batched durability, lose up to N writes on crash
///   - EveryNMillis: bounded loss window, much higher throughput
///   - OnCommit: only the explicit commit barrier syncs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// fsync after every record. Safest, slowest.
    EveryWrite,
    /// fsync every N records. Batched durability.
    EveryNWrites(usize),
    /// fsync on the first append at least N ms after the previous sync.
    EveryNMillis(u64),
    /// fsync only on commit.
    #[default]
    OnCommit,
}
