// Data block tests: building, decoding, searching.

use std::sync::Arc;

use overlaydb::iterator::StorageIterator;
use overlaydb::order::{Bytewise, KeyOrder, Reverse, bytewise};
use overlaydb::sstable::block::{Block, BlockBuilder};

fn build(entries: &[(&str, &str)], block_size: usize) -> Block {
    let mut builder = BlockBuilder::new(block_size);
    for (k, v) in entries {
        assert!(builder.add(k.as_bytes(), v.as_bytes()));
    }
    Block::decode(builder.build()).unwrap()
}

// =============================================================================
// Test 1: Entries decode as written
// =============================================================================
#[test]
fn entries_round_trip() {
    let block = build(&[("apple", "red"), ("banana", ""), ("cherry", "dark")], 4096);
    assert_eq!(block.len(), 3);
    assert_eq!(block.entry(0), (b"apple".as_slice(), b"red".as_slice()));
    assert_eq!(block.entry(1), (b"banana".as_slice(), b"".as_slice()));
}

// =============================================================================
// Test 2: Full block refuses entries, but always takes the first
// =============================================================================
#[test]
fn full_block_refuses() {
    let mut builder = BlockBuilder::new(32);
    let big = vec![b'x'; 100];
    assert!(builder.add(b"first", &big), "first entry always fits");
    assert!(!builder.add(b"second", b"v"));
    assert_eq!(builder.len(), 1);
}

// =============================================================================
// Test 3: Point lookups hit and miss
// =============================================================================
#[test]
fn get_hits_and_misses() {
    let block = build(&[("b", "2"), ("d", "4"), ("f", "6")], 4096);
    let order = Bytewise;
    assert_eq!(block.get(b"d", &order), Some(b"4".as_slice()));
    assert_eq!(block.get(b"a", &order), None);
    assert_eq!(block.get(b"e", &order), None);
    assert_eq!(block.get(b"z", &order), None);
}

// =============================================================================
// Test 4: Lower bound under a custom order
// =============================================================================
#[test]
fn lower_bound_respects_order() {
    let order = Reverse;
    let mut entries = vec!["a", "b", "c", "d"];
    entries.sort_by(|x, y| order.compare(x.as_bytes(), y.as_bytes()));
    let pairs: Vec<(&str, &str)> = entries.iter().map(|k| (*k, *k)).collect();
    let block = build(&pairs, 4096);

    // Reverse order: d, c, b, a.
    assert_eq!(block.entry(0).0, b"d");
    assert_eq!(block.lower_bound(b"c", &order), 1);
    assert_eq!(block.get(b"a", &order), Some(b"a".as_slice()));
}

// =============================================================================
// Test 5: Iterator walks and seeks
// =============================================================================
#[test]
fn iterator_walks_and_seeks() {
    let block = Arc::new(build(&[("a", "1"), ("c", "3"), ("e", "5")], 4096));
    let mut iter = block.iter(bytewise());

    let mut keys = Vec::new();
    while iter.is_valid() {
        keys.push(iter.key().to_vec());
        iter.next().unwrap();
    }
    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec(), b"e".to_vec()]);

    iter.seek(b"d").unwrap();
    assert_eq!(iter.key(), b"e");
    assert_eq!(iter.value(), Some(b"5".as_slice()));
    iter.seek(b"f").unwrap();
    assert!(!iter.is_valid());
}

// =============================================================================
// Test 6: Garbage is rejected, not panicked on
// =============================================================================
#[test]
fn garbage_rejected() {
    assert!(Block::decode(vec![1, 2]).is_err());
    // Claims 1000 entries in a 12 byte block.
    let mut data = vec![0u8; 8];
    data.extend_from_slice(&1000u32.to_le_bytes());
    assert!(Block::decode(data).is_err());

    let mut bytes = {
        let mut b = BlockBuilder::new(4096);
        b.add(b"k", b"v");
        b.build()
    };
    // Inflate the key length past the data region.
    bytes[0] = 0xFF;
    assert!(Block::decode(bytes).is_err());
}
