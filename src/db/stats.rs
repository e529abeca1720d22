use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Lsn;

/// Point-in-time counters for a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub current_lsn: Lsn,
    pub min_persistent_lsn: Lsn,
    pub adds: u64,
    pub removes: u64,
    pub commits: u64,
    pub compactions: u64,
    /// Log entries re-applied when the store was opened.
    pub replayed: u64,
    /// Log sections on disk.
    pub log_sections: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub adds: AtomicU64,
    pub removes: AtomicU64,
    pub commits: AtomicU64,
    pub compactions: AtomicU64,
    pub replayed: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
