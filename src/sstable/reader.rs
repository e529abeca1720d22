use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::order::OrderRef;
use crate::sstable::block::Block;
use crate::sstable::footer::{Footer, IndexEntry, TableMeta};
use crate::sstable::iterator::SSTableIterator;
use crate::types::Value;

/// An opened table file. Supports point lookups and ordered iteration.
///
/// On open:
/// 1. Read footer (last N bytes) → find index and meta block positions
/// 2. Read and parse index block → Vec<IndexEntry>
/// 3. Read meta block → watermark, key range, bloom filter
/// 4. Ready for queries (data blocks read on demand)
///
/// Tables are immutable once written, so the only shared mutable state is
/// the file cursor, kept behind a mutex.
pub struct SSTable {
    path: PathBuf,
    file: Mutex<File>,
    index: Vec<IndexEntry>,
    meta: TableMeta,
    bloom: Option<BloomFilter>,
    order: OrderRef,
}

impl SSTable {
    /// Open a table file whose keys are sorted by `order`.
    pub fn open(path: &Path, order: OrderRef) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < Footer::SIZE as u64 {
            return Err(Error::Corruption(format!(
                "{}: file too short to contain footer",
                path.display()
            )));
        }

        file.seek(SeekFrom::Start(file_size - Footer::SIZE as u64))?;
        let mut footer_buf = vec![0u8; Footer::SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        let index_end = footer.index_block_offset.checked_add(footer.index_block_size);
        let meta_end = footer.meta_block_offset.checked_add(footer.meta_block_size);
        let body_end = file_size - Footer::SIZE as u64;
        if index_end.is_none_or(|end| end > body_end) || meta_end.is_none_or(|end| end > body_end) {
            return Err(Error::Corruption(format!(
                "{}: footer points past end of file",
                path.display()
            )));
        }

        let index_buf = read_at(&mut file, footer.index_block_offset, footer.index_block_size)?;
        let mut index = Vec::new();
        let mut offset = 0usize;
        while offset < index_buf.len() {
            let (entry, consumed) = IndexEntry::decode(&index_buf[offset..])?;
            index.push(entry);
            offset += consumed;
        }

        let meta_buf = read_at(&mut file, footer.meta_block_offset, footer.meta_block_size)?;
        let (meta, bloom_bytes) = TableMeta::decode(&meta_buf)?;
        let bloom = if bloom_bytes.is_empty() {
            None
        } else {
            Some(BloomFilter::from_bytes(&bloom_bytes)?)
        };

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
            meta,
            bloom,
            order,
        })
    }

    /// Point lookup.
    ///
    /// Algorithm:
    /// 1. Key outside [min_key, max_key] or rejected by the bloom filter → None
    /// 2. Binary search index → find the right data block
    /// 3. Read that block from disk
    /// 4. Binary search within the block
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        if self.meta.entry_count == 0
            || self.order.compare(key, &self.meta.min_key) == Ordering::Less
            || self.order.compare(key, &self.meta.max_key) == Ordering::Greater
        {
            return Ok(None);
        }
        if let Some(bloom) = &self.bloom {
            if !bloom.may_contain(key) {
                return Ok(None);
            }
        }

        let block_idx = self.find_block(key);
        if block_idx >= self.index.len() {
            return Ok(None);
        }

        let block = self.read_block(block_idx)?;
        Ok(block.get(key, self.order.as_ref()).map(|v| v.to_vec()))
    }

    /// Index of the first block whose last key is >= `key`.
    pub(crate) fn find_block(&self, key: &[u8]) -> usize {
        self.index
            .partition_point(|entry| self.order.compare(&entry.last_key, key) == Ordering::Less)
    }

    /// Read and decode data block `block_idx`.
    pub(crate) fn read_block(&self, block_idx: usize) -> Result<Arc<Block>> {
        let entry = &self.index[block_idx];
        let data = {
            let mut file = self.file.lock();
            read_at(&mut file, entry.offset, entry.size)?
        };
        Ok(Arc::new(Block::decode(data)?))
    }

    pub(crate) fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Iterate over every entry, starting at the first.
    pub fn iter(self: &Arc<Self>) -> Result<SSTableIterator> {
        SSTableIterator::new(Arc::clone(self))
    }

    /// Get metadata about this table.
    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn order(&self) -> &OrderRef {
        &self.order
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_at(file: &mut File, offset: u64, size: u64) -> Result<Vec<u8>> {
    let size = usize::try_from(size)
        .map_err(|_| Error::Corruption(format!("block size {size} out of range")))?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; size];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
