use crate::error::{Error, Result};
use crate::types::{Key, Value, ValueType};

/// The payload of one log entry: a set or delete against a named index.
///
/// Binary format:
/// ```text
/// [op: 1][index_len: 2][index][key_len: 4][key]          (Delete)
/// [op: 1][index_len: 2][index][key_len: 4][key][value_len: 4][value]  (Set)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub op: ValueType,
    pub index: String,
    pub key: Key,
    /// `None` for deletes.
    pub value: Option<Value>,
}

impl Operation {
    pub fn set(index: &str, key: &[u8], value: &[u8]) -> Self {
        Operation {
            op: ValueType::Set,
            index: index.to_string(),
            key: key.to_vec(),
            value: Some(value.to_vec()),
        }
    }

    pub fn delete(index: &str, key: &[u8]) -> Self {
        Operation {
            op: ValueType::Delete,
            index: index.to_string(),
            key: key.to_vec(),
            value: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let value_len = self.value.as_ref().map_or(0, |v| 4 + v.len());
        let mut buf = Vec::with_capacity(7 + self.index.len() + self.key.len() + value_len);
        buf.push(self.op as u8);
        buf.extend_from_slice(&(self.index.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.index.as_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        if let Some(value) = &self.value {
            buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
            buf.extend_from_slice(value);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { data, pos: 0 };

        let op_byte = cursor.take(1)?[0];
        let op = ValueType::from_u8(op_byte)
            .ok_or_else(|| Error::Corruption(format!("unknown operation type {op_byte:#04x}")))?;

        let index_len = u16::from_le_bytes(cursor.take(2)?.try_into().unwrap()) as usize;
        let index = String::from_utf8(cursor.take(index_len)?.to_vec())
            .map_err(|_| Error::Corruption("index name is not valid UTF-8".into()))?;

        let key = cursor.take_prefixed()?.to_vec();
        let value = match op {
            ValueType::Set => Some(cursor.take_prefixed()?.to_vec()),
            ValueType::Delete => None,
        };

        if cursor.pos != data.len() {
            return Err(Error::Corruption("trailing bytes after operation".into()));
        }

        Ok(Operation {
            op,
            index,
            key,
            value,
        })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::Corruption("truncated operation".into()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// A u32 length followed by that many bytes.
    fn take_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
        self.take(len)
    }
}
