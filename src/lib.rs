//! # overlaydb
//!
//! A log-structured key-value store with several named indices sharing one
//! write-ahead log.
//!
//! ## Core idea
//! Every write is appended to the log first, then applied to the index's
//! in-memory overlay. Compaction folds the logged writes into a new on-disk
//! immutable index and records how far it got (the watermark); log sections
//! below every index's watermark can then be dropped. Recovery replays the
//! log above each watermark to rebuild the overlays exactly.

pub mod bloom;
pub mod compaction;
pub mod db;
pub mod error;
pub mod index;
pub mod iterator;
pub mod manifest;
pub mod memtable;
pub mod order;
pub mod sstable;
pub mod types;
pub mod wal;

// Public re-exports for the top-level API
pub use db::{DB, IndexDescriptor, Options, Stats};
pub use error::{Error, Result};
pub use iterator::RangeIter;
pub use order::{Bytewise, KeyOrder, OrderRef, Reverse};
pub use types::{Key, Lsn, Value};
pub use wal::SyncPolicy;
