use crate::sstable::block::{ENTRY_HEADER, OFFSET_SIZE};

/// Packs ordered entries into one data block of a table.
///
/// On-disk layout of a block:
/// ```text
/// ┌───────────────────────────────────────────────────┐
/// │ Entry 0: [key_len(4B)][val_len(4B)][key][value]   │
/// │ Entry 1: ...                                      │
/// │ Entry N: ...                                      │
/// ├───────────────────────────────────────────────────┤
/// │ Offset array: [off_0(4B)][off_1(4B)]...[off_N(4B)]│
/// │ Num entries (4B)                                  │
/// └───────────────────────────────────────────────────┘
/// ```
///
/// Entries are found through the trailing offset array, so a reader can
/// binary search a block without walking it.
pub struct BlockBuilder {
    data: Vec<u8>,
    offsets: Vec<u32>,
    block_size: usize,
}

impl BlockBuilder {
    pub fn new(block_size: usize) -> Self {
        BlockBuilder {
            data: Vec::new(),
            offsets: Vec::new(),
            block_size,
        }
    }

    /// Append an entry, in key order. `false` means the block is full and
    /// the entry was not taken; an empty block takes any entry.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> bool {
        let entry_size = ENTRY_HEADER + key.len() + value.len() + OFFSET_SIZE;

        if !self.offsets.is_empty() && self.estimated_size() + entry_size > self.block_size {
            return false;
        }

        self.offsets.push(self.data.len() as u32);
        self.data.extend_from_slice(&(key.len() as u32).to_le_bytes());
        self.data.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.data.extend_from_slice(key);
        self.data.extend_from_slice(value);

        true
    }

    /// Serialized block: entries, offsets, count.
    pub fn build(self) -> Vec<u8> {
        let mut block = self.data;
        for offset in &self.offsets {
            block.extend_from_slice(&offset.to_le_bytes());
        }
        block.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        block
    }

    /// Bytes `build` would produce right now.
    pub fn estimated_size(&self) -> usize {
        self.data.len() + self.offsets.len() * OFFSET_SIZE + OFFSET_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Entries added so far.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }
}
