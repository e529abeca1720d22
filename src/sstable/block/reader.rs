use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::order::KeyOrder;
use crate::sstable::block::{ENTRY_HEADER, OFFSET_SIZE};

/// A decoded data block. Entries are located through the offset array, so
/// nothing is parsed until it is looked at.
pub struct Block {
    data: Vec<u8>,
    offsets: Vec<u32>,
}

impl Block {
    /// Decode a block produced by `BlockBuilder::build`.
    pub fn decode(mut data: Vec<u8>) -> Result<Self> {
        if data.len() < OFFSET_SIZE {
            return Err(Error::Corruption("block too short".into()));
        }

        let count_at = data.len() - OFFSET_SIZE;
        let count = u32::from_le_bytes(data[count_at..].try_into().unwrap()) as usize;
        let offsets_len = count
            .checked_mul(OFFSET_SIZE)
            .filter(|len| *len <= count_at)
            .ok_or_else(|| Error::Corruption(format!("block claims {count} entries")))?;
        let offsets_at = count_at - offsets_len;

        let offsets: Vec<u32> = data[offsets_at..count_at]
            .chunks_exact(OFFSET_SIZE)
            .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();

        // Validate every entry lies inside the data region.
        for &offset in &offsets {
            let at = offset as usize;
            if at + ENTRY_HEADER > offsets_at {
                return Err(Error::Corruption("block entry header out of bounds".into()));
            }
            let key_len = u32::from_le_bytes(data[at..at + 4].try_into().unwrap()) as usize;
            let val_len = u32::from_le_bytes(data[at + 4..at + 8].try_into().unwrap()) as usize;
            if at + ENTRY_HEADER + key_len + val_len > offsets_at {
                return Err(Error::Corruption("block entry out of bounds".into()));
            }
        }

        data.truncate(offsets_at);
        Ok(Block { data, offsets })
    }

    /// Number of entries in the block.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Key and value of the entry at `index`.
    pub fn entry(&self, index: usize) -> (&[u8], &[u8]) {
        let at = self.offsets[index] as usize;
        let key_len = u32::from_le_bytes(self.data[at..at + 4].try_into().unwrap()) as usize;
        let val_len = u32::from_le_bytes(self.data[at + 4..at + 8].try_into().unwrap()) as usize;
        let key_at = at + ENTRY_HEADER;
        let val_at = key_at + key_len;
        (&self.data[key_at..val_at], &self.data[val_at..val_at + val_len])
    }

    /// Index of the first entry with key >= target.
    pub fn lower_bound(&self, key: &[u8], order: &dyn KeyOrder) -> usize {
        let (mut lo, mut hi) = (0, self.offsets.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if order.compare(self.entry(mid).0, key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Binary search for an exact key.
    pub fn get(&self, key: &[u8], order: &dyn KeyOrder) -> Option<&[u8]> {
        let index = self.lower_bound(key, order);
        if index < self.len() {
            let (found, value) = self.entry(index);
            if order.compare(found, key) == Ordering::Equal {
                return Some(value);
            }
        }
        None
    }

    /// Iterate the block from its first entry.
    pub fn iter(self: &Arc<Self>, order: crate::order::OrderRef) -> BlockIterator {
        BlockIterator {
            block: Arc::clone(self),
            order,
            position: 0,
        }
    }
}

/// Iterator over one block.
pub struct BlockIterator {
    block: Arc<Block>,
    order: crate::order::OrderRef,
    position: usize,
}

impl StorageIterator for BlockIterator {
    fn key(&self) -> &[u8] {
        self.block.entry(self.position).0
    }

    fn value(&self) -> Option<&[u8]> {
        Some(self.block.entry(self.position).1)
    }

    fn is_valid(&self) -> bool {
        self.position < self.block.len()
    }

    fn next(&mut self) -> Result<()> {
        if self.position < self.block.len() {
            self.position += 1;
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.position = self.block.lower_bound(key, self.order.as_ref());
        Ok(())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}
