//! Persisted per-index pointer record.
//!
//! Each index directory holds a `CURRENT` file naming the table that is the
//! index's immutable state and the watermark that table reflects. Replacing
//! `CURRENT` is the commit point of a compaction:
//!
//! 1. the new table is written and fsync'd by the builder
//! 2. `CURRENT.tmp` is written and fsync'd
//! 3. `CURRENT.tmp` is renamed over `CURRENT`
//! 4. the directory is fsync'd
//!
//! A crash before step 3 leaves the old pointer in place and the new table
//! as an orphan, which `MergedIndex::open` reclaims.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Lsn;
use crate::wal::sync_dir;

pub const CURRENT_FILE: &str = "CURRENT";
const CURRENT_TMP_FILE: &str = "CURRENT.tmp";
pub const TABLE_EXT: &str = "sst";

const FORMAT_VERSION: u32 = 1;

/// What `CURRENT` says about an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPointer {
    /// `KeyOrder::name` the index was created with.
    pub order_name: String,
    /// Table file name inside the index directory. `None` when every
    /// compaction so far produced an empty index.
    pub table: Option<String>,
    /// Highest LSN whose effects the index has captured.
    pub watermark: Lsn,
}

impl IndexPointer {
    /// Encode as:
    /// ```text
    /// [version: 4][watermark: 8][order_len: 4][order][table_len: 4][table][crc32: 4]
    /// ```
    /// A zero `table_len` means no table.
    pub fn encode(&self) -> Vec<u8> {
        let table = self.table.as_deref().unwrap_or("");
        let mut buf = Vec::with_capacity(24 + self.order_name.len() + table.len());
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.watermark.to_le_bytes());
        buf.extend_from_slice(&(self.order_name.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.order_name.as_bytes());
        buf.extend_from_slice(&(table.len() as u32).to_le_bytes());
        buf.extend_from_slice(table.as_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 24 {
            return Err(Error::Corruption("pointer record too short".into()));
        }
        let (body, crc_bytes) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        if crc32fast::hash(body) != stored {
            return Err(Error::Corruption("pointer record checksum mismatch".into()));
        }

        let version = u32::from_le_bytes(body[0..4].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::Corruption(format!(
                "unsupported pointer format version {version}"
            )));
        }
        let watermark = u64::from_le_bytes(body[4..12].try_into().unwrap());

        let mut pos = 12;
        let order_name = read_string(body, &mut pos)?;
        let table = read_string(body, &mut pos)?;
        if pos != body.len() {
            return Err(Error::Corruption("trailing bytes in pointer record".into()));
        }

        Ok(IndexPointer {
            order_name,
            table: (!table.is_empty()).then_some(table),
            watermark,
        })
    }
}

fn read_string(body: &[u8], pos: &mut usize) -> Result<String> {
    let len_end = *pos + 4;
    if len_end > body.len() {
        return Err(Error::Corruption("truncated pointer record".into()));
    }
    let len = u32::from_le_bytes(body[*pos..len_end].try_into().unwrap()) as usize;
    let end = len_end + len;
    if end > body.len() {
        return Err(Error::Corruption("truncated pointer record".into()));
    }
    *pos = end;
    String::from_utf8(body[len_end..end].to_vec())
        .map_err(|_| Error::Corruption("pointer record holds invalid UTF-8".into()))
}

/// Table file name for a given watermark.
pub fn table_file_name(watermark: Lsn) -> String {
    format!("{watermark:020}.{TABLE_EXT}")
}

/// Read `CURRENT` from `dir`. `None` if the index has never been published.
pub fn load(dir: &Path) -> Result<Option<IndexPointer>> {
    match fs::read(dir.join(CURRENT_FILE)) {
        Ok(data) => IndexPointer::decode(&data).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Durably replace `CURRENT` in `dir` with `pointer`.
pub fn publish(dir: &Path, pointer: &IndexPointer) -> Result<()> {
    let tmp = dir.join(CURRENT_TMP_FILE);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&pointer.encode())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, dir.join(CURRENT_FILE))?;
    sync_dir(dir)
}

/// Whether `name` is a file the pointer protocol may leave behind.
pub(crate) fn is_scratch_file(name: &str) -> bool {
    name == CURRENT_TMP_FILE
}
