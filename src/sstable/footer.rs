use crate::error::{Error, Result};
use crate::types::Lsn;

/// Magic number to identify table files.
pub const SSTABLE_MAGIC: u64 = 0x4F56_4C59_5353_5401; // "OVLYSST\x01"

/// Metadata stored in a table's meta block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    /// Highest LSN whose effects this table fully reflects.
    pub watermark: Lsn,
    /// Number of live entries (tables never hold tombstones).
    pub entry_count: u64,
    /// Smallest key under the table's order.
    pub min_key: Vec<u8>,
    /// Largest key under the table's order.
    pub max_key: Vec<u8>,
}

impl TableMeta {
    /// Format: [watermark(8B)][entry_count(8B)][min_len(4B)][min][max_len(4B)][max]
    ///         [bloom_len(4B)][bloom]
    pub fn encode(&self, bloom: &[u8]) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(28 + self.min_key.len() + self.max_key.len() + bloom.len());
        buf.extend_from_slice(&self.watermark.to_le_bytes());
        buf.extend_from_slice(&self.entry_count.to_le_bytes());
        for part in [self.min_key.as_slice(), self.max_key.as_slice(), bloom] {
            buf.extend_from_slice(&(part.len() as u32).to_le_bytes());
            buf.extend_from_slice(part);
        }
        buf
    }

    /// Decode the meta block, returning the metadata and the raw bloom bytes.
    pub fn decode(data: &[u8]) -> Result<(Self, Vec<u8>)> {
        if data.len() < 16 {
            return Err(Error::Corruption("meta block too short".into()));
        }
        let watermark = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let entry_count = u64::from_le_bytes(data[8..16].try_into().unwrap());

        let mut offset = 16;
        let mut parts = Vec::with_capacity(3);
        for name in ["min_key", "max_key", "bloom"] {
            if data.len() < offset + 4 {
                return Err(Error::Corruption(format!("meta block too short for {name} length")));
            }
            let len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if data.len() < offset + len {
                return Err(Error::Corruption(format!("meta block too short for {name}")));
            }
            parts.push(data[offset..offset + len].to_vec());
            offset += len;
        }

        let bloom = parts.pop().unwrap_or_default();
        let max_key = parts.pop().unwrap_or_default();
        let min_key = parts.pop().unwrap_or_default();
        Ok((
            TableMeta {
                watermark,
                entry_count,
                min_key,
                max_key,
            },
            bloom,
        ))
    }
}

/// An entry in the table's index block.
/// Maps a block's last key to its location in the file.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Last (largest) key in the block.
    pub last_key: Vec<u8>,
    /// Byte offset of the block in the file.
    pub offset: u64,
    /// Size of the block in bytes.
    pub size: u64,
}

impl IndexEntry {
    /// Encode this index entry to bytes.
    /// Format: [key_len(4B)][key][offset(8B)][size(8B)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.last_key.len() + 16);
        buf.extend_from_slice(&(self.last_key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.last_key);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Decode an index entry from bytes, returning (entry, bytes_consumed).
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(Error::Corruption("index entry too short".into()));
        }
        let key_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let total = 4 + key_len + 16;
        if data.len() < total {
            return Err(Error::Corruption("index entry truncated".into()));
        }
        let last_key = data[4..4 + key_len].to_vec();
        let offset = u64::from_le_bytes(data[4 + key_len..12 + key_len].try_into().unwrap());
        let size = u64::from_le_bytes(data[12 + key_len..20 + key_len].try_into().unwrap());
        Ok((IndexEntry { last_key, offset, size }, total))
    }
}

/// The footer sits at the end of the table file.
/// It tells the reader where to find the index block and meta block.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Index block offset (8B)              │
/// │ Index block size (8B)                │
/// │ Meta block offset (8B)               │
/// │ Meta block size (8B)                 │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone)]
pub struct Footer {
    pub index_block_offset: u64,
    pub index_block_size: u64,
    pub meta_block_offset: u64,
    pub meta_block_size: u64,
    pub magic: u64,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 5;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        for field in [
            self.index_block_offset,
            self.index_block_size,
            self.meta_block_offset,
            self.meta_block_size,
            self.magic,
        ] {
            buf.extend_from_slice(&field.to_le_bytes());
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corruption("footer too short".into()));
        }
        let field = |i: usize| u64::from_le_bytes(data[i * 8..i * 8 + 8].try_into().unwrap());
        let magic = field(4);
        if magic != SSTABLE_MAGIC {
            return Err(Error::Corruption(format!(
                "bad magic: expected {:#x}, got {:#x}",
                SSTABLE_MAGIC, magic
            )));
        }

        Ok(Footer {
            index_block_offset: field(0),
            index_block_size: field(1),
            meta_block_offset: field(2),
            meta_block_size: field(3),
            magic,
        })
    }
}
