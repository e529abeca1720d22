use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::wal::record::{self, HEADER_SIZE, LogEntry};

/// Reads the entries of one section file.
///
/// Loads the file into memory, then iterates entry by entry.
pub struct SectionReader {
    data: Vec<u8>,
}

impl SectionReader {
    /// Open a section file for reading.
    pub fn new(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(SectionReader { data })
    }

    /// Open a section, ignoring anything past `limit` bytes. Used when the
    /// section may still be growing.
    pub fn with_limit(path: &Path, limit: u64) -> Result<Self> {
        let mut data = fs::read(path)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        data.truncate(limit);
        Ok(SectionReader { data })
    }

    /// Iterate over the valid prefix of the section.
    pub fn iter(&self) -> SectionIterator<'_> {
        SectionIterator {
            data: &self.data,
            offset: 0,
            stopped: false,
        }
    }

    /// Walk the section and report the valid prefix.
    ///
    /// Bytes past the valid prefix are a torn tail only if they could be an
    /// interrupted final append: an incomplete header, a frame running past
    /// EOF, zero fill, or damaged frames with nothing valid after them. A
    /// damaged frame followed by a valid one is reported as `corruption`.
    pub fn scan(&self) -> SectionScan {
        let mut iter = self.iter();
        let mut entries = 0usize;
        let mut first_lsn = None;
        let mut last_lsn = None;
        let mut out_of_order = None;
        let mut corruption = None;
        while let Some(next) = iter.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(_) => {
                    corruption = damage_after(&self.data, iter.offset);
                    break;
                }
            };
            if first_lsn.is_none() {
                first_lsn = Some(entry.lsn);
            }
            if let Some(last) = last_lsn {
                if entry.lsn <= last && out_of_order.is_none() {
                    out_of_order = Some((last, entry.lsn));
                }
            }
            last_lsn = Some(entry.lsn);
            entries += 1;
        }

        SectionScan {
            entries,
            first_lsn,
            last_lsn,
            valid_len: iter.offset as u64,
            total_len: self.data.len() as u64,
            out_of_order,
            corruption,
        }
    }
}

/// Decide whether the undecodable bytes starting at `offset` are a torn
/// tail (`None`) or corruption of data that was fully written.
fn damage_after(data: &[u8], offset: usize) -> Option<String> {
    let mut pos = offset;
    loop {
        let rest = &data[pos..];
        let size = record::declared_size(rest)?;
        if size < HEADER_SIZE {
            if rest.iter().all(|&b| b == 0) {
                return None;
            }
            return Some(format!("frame at offset {pos} declares a length below its header"));
        }
        if size > rest.len() {
            return None;
        }
        if pos > offset && LogEntry::decode(rest).is_ok() {
            return Some(format!(
                "damaged frame at offset {offset} is followed by a valid entry at offset {pos}"
            ));
        }
        pos += size;
    }
}

/// Summary of a section's readable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionScan {
    pub entries: usize,
    pub first_lsn: Option<u64>,
    pub last_lsn: Option<u64>,
    /// Bytes covered by complete, checksummed entries.
    pub valid_len: u64,
    pub total_len: u64,
    /// First pair of LSNs found out of order, if any.
    pub out_of_order: Option<(u64, u64)>,
    /// Set when the bytes past the valid prefix are not a torn tail.
    pub corruption: Option<String>,
}

impl SectionScan {
    /// Trailing bytes that do not form a valid entry. Only safe to cut off
    /// when `corruption` is `None`.
    pub fn torn_bytes(&self) -> u64 {
        self.total_len - self.valid_len
    }
}

/// Iterator over section entries.
///
/// Yields `Ok` entries up to EOF. A frame that fails to decode is yielded
/// once as `Err` and ends the iteration; whether that is a torn tail or real
/// corruption is the caller's call.
pub struct SectionIterator<'a> {
    data: &'a [u8],
    offset: usize,
    stopped: bool,
}

impl<'a> SectionIterator<'a> {
    /// Byte offset of the next entry.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for SectionIterator<'a> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped || self.offset >= self.data.len() {
            return None;
        }

        match LogEntry::decode(&self.data[self.offset..]) {
            Ok(entry) => {
                self.offset += entry.encoded_size();
                Some(Ok(entry))
            }
            Err(e) => {
                self.stopped = true;
                Some(Err(e))
            }
        }
    }
}
