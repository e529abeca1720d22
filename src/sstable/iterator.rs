use std::sync::Arc;

use crate::error::Result;
use crate::iterator::StorageIterator;
use crate::sstable::block::BlockIterator;
use crate::sstable::reader::SSTable;

/// Iterator over a whole table, loading one data block at a time.
pub struct SSTableIterator {
    table: Arc<SSTable>,
    block_idx: usize,
    block: Option<BlockIterator>,
}

impl SSTableIterator {
    /// Create an iterator positioned at the table's first entry.
    pub fn new(table: Arc<SSTable>) -> Result<Self> {
        let mut iter = SSTableIterator {
            table,
            block_idx: 0,
            block: None,
        };
        iter.load_block(0)?;
        Ok(iter)
    }

    /// Position on the first entry of block `block_idx` (or past the end).
    fn load_block(&mut self, block_idx: usize) -> Result<()> {
        self.block_idx = block_idx;
        self.block = if block_idx < self.table.block_count() {
            let block = self.table.read_block(block_idx)?;
            Some(block.iter(self.table.order().clone()))
        } else {
            None
        };
        Ok(())
    }

    /// Move to following blocks while the current one is exhausted.
    fn skip_exhausted_blocks(&mut self) -> Result<()> {
        while self.block.as_ref().is_some_and(|b| !b.is_valid()) {
            self.load_block(self.block_idx + 1)?;
        }
        Ok(())
    }
}

impl StorageIterator for SSTableIterator {
    fn key(&self) -> &[u8] {
        self.block.as_ref().map(|b| b.key()).unwrap_or_default()
    }

    fn value(&self) -> Option<&[u8]> {
        self.block.as_ref().and_then(|b| b.value())
    }

    fn is_valid(&self) -> bool {
        self.block.as_ref().is_some_and(|b| b.is_valid())
    }

    fn next(&mut self) -> Result<()> {
        if let Some(block) = self.block.as_mut() {
            block.next()?;
        }
        self.skip_exhausted_blocks()
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        let block_idx = self.table.find_block(key);
        self.load_block(block_idx)?;
        if let Some(block) = self.block.as_mut() {
            block.seek(key)?;
        }
        self.skip_exhausted_blocks()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.load_block(0)?;
        self.skip_exhausted_blocks()
    }
}
