use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::bloom::builder::BloomFilterBuilder;
use crate::error::Result;
use crate::sstable::block::BlockBuilder;
use crate::sstable::footer::{Footer, IndexEntry, SSTABLE_MAGIC, TableMeta};
use crate::types::Lsn;

/// Builds a table file from a sorted stream of live key-value pairs.
///
/// Build process:
/// 1. Add entries one by one (must be in ascending order, no tombstones)
/// 2. Entries fill up blocks; when a block is full it's written to disk
/// 3. finish() flushes the last block, writes meta, index, footer, fsync
///
/// Compaction is the only producer. A builder that is dropped without
/// `finish` leaves a partial file behind; `abandon` removes it.
pub struct SSTableBuilder {
    block_builder: BlockBuilder,
    /// One per data block already written.
    index_entries: Vec<IndexEntry>,
    /// Bytes written so far.
    data_offset: u64,
    writer: BufWriter<File>,
    path: PathBuf,
    /// LSN watermark recorded in the meta block.
    watermark: Lsn,
    block_size: usize,
    bloom: BloomFilterBuilder,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    entry_count: u64,
    /// Becomes the index key of the block being filled.
    last_key_in_block: Option<Vec<u8>>,
}

impl SSTableBuilder {
    /// Create a new table builder that writes to the given path.
    ///
    /// `expected_keys` is an upper bound on the entries to be added; it
    /// sizes the bloom filter, which is filled as entries arrive.
    pub fn new(
        path: &Path,
        watermark: Lsn,
        block_size: usize,
        expected_keys: usize,
        false_positive_rate: f64,
    ) -> Result<Self> {
        let file = File::create(path)?;
        Ok(SSTableBuilder {
            block_builder: BlockBuilder::new(block_size),
            index_entries: Vec::new(),
            data_offset: 0,
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            watermark,
            block_size,
            bloom: BloomFilterBuilder::new(expected_keys, false_positive_rate),
            min_key: None,
            max_key: None,
            entry_count: 0,
            last_key_in_block: None,
        })
    }

    /// Add a key-value pair. MUST be called in ascending key order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());
        self.entry_count += 1;
        self.bloom.add_key(key);

        if !self.block_builder.add(key, value) {
            // Block is full: flush it, then start a fresh one
            self.flush_block()?;
            let accepted = self.block_builder.add(key, value);
            debug_assert!(accepted, "first entry of a block is always accepted");
        }
        self.last_key_in_block = Some(key.to_vec());
        Ok(())
    }

    /// Write out the block being filled and index it by its last key.
    fn flush_block(&mut self) -> Result<()> {
        if self.block_builder.is_empty() {
            return Ok(());
        }

        let old_builder =
            std::mem::replace(&mut self.block_builder, BlockBuilder::new(self.block_size));
        let block_data = old_builder.build();
        let block_size = block_data.len() as u64;

        self.writer.write_all(&block_data)?;
        self.index_entries.push(IndexEntry {
            last_key: self.last_key_in_block.take().unwrap_or_default(),
            offset: self.data_offset,
            size: block_size,
        });

        self.data_offset += block_size;
        Ok(())
    }

    /// Finalize the table: flush last block, write meta, index, footer, fsync.
    pub fn finish(mut self) -> Result<TableMeta> {
        self.flush_block()?;

        let meta = TableMeta {
            watermark: self.watermark,
            entry_count: self.entry_count,
            min_key: self.min_key.take().unwrap_or_default(),
            max_key: self.max_key.take().unwrap_or_default(),
        };

        let bloom = self.bloom.build();

        let meta_block_offset = self.data_offset;
        let meta_data = meta.encode(&bloom.to_bytes());
        let meta_block_size = meta_data.len() as u64;
        self.writer.write_all(&meta_data)?;

        let index_block_offset = meta_block_offset + meta_block_size;
        let mut index_data = Vec::new();
        for entry in &self.index_entries {
            index_data.extend_from_slice(&entry.encode());
        }
        let index_block_size = index_data.len() as u64;
        self.writer.write_all(&index_data)?;

        let footer = Footer {
            index_block_offset,
            index_block_size,
            meta_block_offset,
            meta_block_size,
            magic: SSTABLE_MAGIC,
        };
        self.writer.write_all(&footer.encode())?;

        // Flush buffer + fsync to guarantee durability
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        Ok(meta)
    }

    /// Give up on the table and delete the partial file.
    pub fn abandon(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
