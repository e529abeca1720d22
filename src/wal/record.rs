use crate::error::{Error, Result};
use crate::types::Lsn;

/// A single framed entry in a log section.
///
/// On-disk format:
/// ```text
/// ┌──────────┬─────────┬──────────┬─────────────────┐
/// │ CRC (4B) │ Len (4B)│ LSN (8B) │ Payload (var)   │
/// └──────────┴─────────┴──────────┴─────────────────┘
/// ```
///
/// Len counts LSN + payload. CRC covers everything after the CRC field.
/// The payload is opaque here; `db::Operation` gives it meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub lsn: Lsn,
    pub payload: Vec<u8>,
}

const CRC_SIZE: usize = 4;
const LEN_SIZE: usize = 4;
const LSN_SIZE: usize = 8;
pub(crate) const HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE + LSN_SIZE;

impl LogEntry {
    pub fn new(lsn: Lsn, payload: Vec<u8>) -> Self {
        LogEntry { lsn, payload }
    }

    /// Serialize this entry to bytes (including CRC header).
    pub fn encode(&self) -> Vec<u8> {
        let body_len = LSN_SIZE + self.payload.len();
        let mut buf = Vec::with_capacity(CRC_SIZE + LEN_SIZE + body_len);

        // Reserve space for CRC (filled at the end)
        buf.extend_from_slice(&[0u8; CRC_SIZE]);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Deserialize an entry from the front of `data`. Returns error if the
    /// frame is short, truncated or its CRC doesn't match.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption("log entry too short".into()));
        }

        let stored_crc = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let body_len = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
        if body_len < LSN_SIZE {
            return Err(Error::Corruption("log entry length below header".into()));
        }

        let total_len = CRC_SIZE + LEN_SIZE + body_len;
        if data.len() < total_len {
            return Err(Error::Corruption("log entry truncated".into()));
        }

        let computed_crc = crc32fast::hash(&data[CRC_SIZE..total_len]);
        if stored_crc != computed_crc {
            return Err(Error::Corruption("CRC mismatch".into()));
        }

        let lsn = u64::from_le_bytes(data[8..16].try_into().unwrap());
        let payload = data[HEADER_SIZE..total_len].to_vec();

        Ok(LogEntry { lsn, payload })
    }

    /// Size of this entry when serialized on disk.
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// On-disk size the frame at the front of `data` claims, read from its
/// header alone. `None` if the header itself is incomplete.
pub(crate) fn declared_size(data: &[u8]) -> Option<usize> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    let body_len = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
    Some(CRC_SIZE + LEN_SIZE + body_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_payload_is_a_valid_frame() {
        let entry = LogEntry::new(9, Vec::new());
        let encoded = entry.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(LogEntry::decode(&encoded).unwrap(), entry);
    }

    #[test]
    fn declared_size_reads_header_only() {
        let encoded = LogEntry::new(3, b"abc".to_vec()).encode();
        assert_eq!(declared_size(&encoded[..HEADER_SIZE]), Some(encoded.len()));
        assert_eq!(declared_size(&encoded[..HEADER_SIZE - 1]), None);
    }

    #[test]
    fn bogus_length_rejected() {
        let mut encoded = LogEntry::new(1, b"x".to_vec()).encode();
        encoded[4..8].copy_from_slice(&3u32.to_le_bytes());
        assert!(LogEntry::decode(&encoded).is_err());
    }
}
