/// Raw key bytes.
pub type Key = Vec<u8>;

/// Raw value bytes.
pub type Value = Vec<u8>;

/// Log sequence number. One strictly increasing sequence per store.
pub type Lsn = u64;

/// Distinguishes sets from deletes in the log and in overlays.
/// A Delete writes a tombstone: the key is not removed, it is marked deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A normal set operation.
    Set = 0x01,
    /// A delete (tombstone marker).
    Delete = 0x02,
}

impl ValueType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ValueType::Set),
            0x02 => Some(ValueType::Delete),
            _ => None,
        }
    }
}

/// What an overlay holds for a key.
///
/// `Tombstone` is distinct from `Value(vec![])`: an empty value is a real
/// value, a tombstone hides every older version of the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Value(Value),
    Tombstone,
}

impl Slot {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Slot::Tombstone)
    }

    /// The value, or `None` for a tombstone.
    pub fn as_value(&self) -> Option<&[u8]> {
        match self {
            Slot::Value(v) => Some(v),
            Slot::Tombstone => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Slot::Value(v) => Some(v),
            Slot::Tombstone => None,
        }
    }

    /// Approximate heap footprint, used for overlay size accounting.
    pub fn size_bytes(&self) -> usize {
        match self {
            Slot::Value(v) => v.len(),
            Slot::Tombstone => 0,
        }
    }
}

impl From<Option<Value>> for Slot {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => Slot::Value(v),
            None => Slot::Tombstone,
        }
    }
}
