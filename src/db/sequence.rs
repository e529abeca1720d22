use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Lsn;

/// Store-wide LSN generator.
///
/// Only the writer (holding the log mutex) advances it; anyone may read it.
/// An LSN is handed out by `next`, and only becomes `current` once the
/// log has accepted the entry, so a failed append never burns a number.
#[derive(Debug)]
pub struct Sequence {
    current: AtomicU64,
}

impl Sequence {
    pub fn new(start: Lsn) -> Self {
        Sequence {
            current: AtomicU64::new(start),
        }
    }

    /// Highest LSN assigned so far.
    pub fn current(&self) -> Lsn {
        self.current.load(Ordering::Acquire)
    }

    /// The LSN the next write will carry.
    pub fn next(&self) -> Lsn {
        self.current() + 1
    }

    /// Record that `lsn` was written.
    pub fn advance(&self, lsn: Lsn) {
        debug_assert!(lsn > self.current());
        self.current.store(lsn, Ordering::Release);
    }
}
