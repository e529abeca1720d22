pub mod builder;

use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Error, Result};

/// Smallest filter ever allocated, in bits.
const MIN_BITS: u64 = 64;

/// Set-membership sketch stored in the meta block of every table.
///
/// `may_contain` never returns `false` for a key that was inserted; it may
/// return `true` for one that was not. An immutable index consults it
/// before binary-searching the table index, so lookups for absent keys
/// usually never touch a data block.
///
/// Probe positions use double hashing over one xxh3-128 digest:
/// `pos_i = lo + i * hi (mod bits)`.
pub struct BloomFilter {
    words: Vec<u64>,
    probes: u32,
    bits: u64,
}

impl BloomFilter {
    /// A filter for about `expected_keys` keys at `false_positive_rate`.
    ///
    /// The rate is clamped to [1e-9, 0.5]; an oversized rate would otherwise
    /// produce a filter with no bits.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        let rate = false_positive_rate.clamp(1e-9, 0.5);
        // m/n = -ln(p) / ln(2)^2, k = (m/n) * ln(2)
        let bits_per_key = -rate.ln() / std::f64::consts::LN_2.powi(2);
        let bits = ((expected_keys.max(1) as f64 * bits_per_key).ceil() as u64).max(MIN_BITS);
        let probes = ((bits_per_key * std::f64::consts::LN_2).round() as u32).clamp(1, 30);

        BloomFilter {
            words: vec![0; bits.div_ceil(64) as usize],
            probes,
            bits,
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (lo, hi) = digest(key);
        for i in 0..self.probes {
            let pos = self.position(lo, hi, i);
            self.words[(pos / 64) as usize] |= 1 << (pos % 64);
        }
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (lo, hi) = digest(key);
        (0..self.probes).all(|i| {
            let pos = self.position(lo, hi, i);
            self.words[(pos / 64) as usize] & (1 << (pos % 64)) != 0
        })
    }

    /// `[probes: 4][bits: 8][words: 8 each]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.words.len() * 8);
        buf.extend_from_slice(&self.probes.to_le_bytes());
        buf.extend_from_slice(&self.bits.to_le_bytes());
        for word in &self.words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::Corruption("bloom filter header truncated".into()));
        }
        let probes = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let bits = u64::from_le_bytes(data[4..12].try_into().unwrap());
        let body = &data[12..];

        let expected = bits.div_ceil(64).checked_mul(8);
        if probes == 0 || bits == 0 || expected != Some(body.len() as u64) {
            return Err(Error::Corruption(format!(
                "bloom filter of {bits} bits cannot span {} bytes",
                body.len()
            )));
        }

        Ok(BloomFilter {
            words: body
                .chunks_exact(8)
                .map(|w| u64::from_le_bytes(w.try_into().unwrap()))
                .collect(),
            probes,
            bits,
        })
    }

    pub fn probes(&self) -> u32 {
        self.probes
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    fn position(&self, lo: u64, hi: u64, i: u32) -> u64 {
        lo.wrapping_add(u64::from(i).wrapping_mul(hi)) % self.bits
    }
}

fn digest(key: &[u8]) -> (u64, u64) {
    let h = xxh3_128(key);
    (h as u64, (h >> 64) as u64)
}
