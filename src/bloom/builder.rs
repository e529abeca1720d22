use crate::bloom::BloomFilter;

/// Builds a table's bloom filter while the table's keys stream past.
///
/// The filter is sized up front from an upper bound on the key count, so
/// keys are hashed on arrival and never buffered. Overshooting the bound
/// only costs bits; undershooting raises the false positive rate.
pub struct BloomFilterBuilder {
    filter: BloomFilter,
    keys: usize,
}

impl BloomFilterBuilder {
    /// Create a builder sized for at most `expected_keys` keys.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        BloomFilterBuilder {
            filter: BloomFilter::new(expected_keys, false_positive_rate),
            keys: 0,
        }
    }

    /// Hash a key into the filter being built.
    pub fn add_key(&mut self, key: &[u8]) {
        self.filter.insert(key);
        self.keys += 1;
    }

    /// Number of keys added so far.
    pub fn len(&self) -> usize {
        self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys == 0
    }

    /// Finalize and return the bloom filter.
    pub fn build(self) -> BloomFilter {
        self.filter
    }
}
