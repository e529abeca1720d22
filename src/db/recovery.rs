use std::collections::BTreeMap;

use tracing::info;

use crate::db::operation::Operation;
use crate::error::{Error, Result};
use crate::index::MergedIndex;
use crate::types::{Lsn, ValueType};
use crate::wal::Log;

/// Persisted watermark of every index, captured once at open.
#[derive(Debug, Clone, Default)]
pub(crate) struct Watermarks {
    by_index: BTreeMap<String, Lsn>,
}

impl Watermarks {
    pub fn capture(indexes: &BTreeMap<String, MergedIndex>) -> Self {
        Watermarks {
            by_index: indexes
                .iter()
                .map(|(name, index)| (name.clone(), index.last_persistent_lsn()))
                .collect(),
        }
    }

    pub fn get(&self, index: &str) -> Option<Lsn> {
        self.by_index.get(index).copied()
    }

    /// Lowest watermark. Log entries at or below it are in every index.
    pub fn min(&self) -> Lsn {
        self.by_index.values().copied().min().unwrap_or(0)
    }

    pub fn max(&self) -> Lsn {
        self.by_index.values().copied().max().unwrap_or(0)
    }
}

/// Re-apply every log entry above its index's watermark. Returns the
/// number of entries applied.
///
/// An entry for an index that is not open fails recovery: skipping it
/// would lose the write once cleanup drops its section.
pub(crate) fn replay(
    log: &mut Log,
    indexes: &BTreeMap<String, MergedIndex>,
    watermarks: &Watermarks,
) -> Result<u64> {
    let mut applied = 0u64;
    let mut skipped = 0u64;

    for entry in log.iter(watermarks.min() + 1)? {
        let entry = entry?;
        let op = Operation::decode(&entry.payload)?;
        let (Some(index), Some(watermark)) = (indexes.get(&op.index), watermarks.get(&op.index))
        else {
            return Err(Error::UnknownIndex(op.index));
        };
        if entry.lsn <= watermark {
            skipped += 1;
            continue;
        }
        match (op.op, op.value) {
            (ValueType::Set, Some(value)) => index.add(entry.lsn, &op.key, &value),
            (ValueType::Set, None) => {
                return Err(Error::Corruption(format!(
                    "set at LSN {} carries no value",
                    entry.lsn
                )));
            }
            (ValueType::Delete, _) => index.remove(entry.lsn, &op.key),
        }
        applied += 1;
    }

    info!(
        from_lsn = watermarks.min() + 1,
        applied, skipped, "log replay finished"
    );
    Ok(applied)
}
