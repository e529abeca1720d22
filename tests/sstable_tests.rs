// Table tests: build a file, open it, look things up.

use std::path::Path;
use std::sync::Arc;

use overlaydb::iterator::StorageIterator;
use overlaydb::order::{KeyOrder, OrderRef, Reverse, bytewise};
use overlaydb::sstable::{SSTable, SSTableBuilder};

fn write_table(path: &Path, entries: &[(Vec<u8>, Vec<u8>)], block_size: usize) {
    let mut builder = SSTableBuilder::new(path, 9, block_size, entries.len(), 0.01).unwrap();
    for (k, v) in entries {
        builder.add(k, v).unwrap();
    }
    builder.finish().unwrap();
}

fn numbered(n: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| {
            (
                format!("key{i:05}").into_bytes(),
                format!("value{i}").into_bytes(),
            )
        })
        .collect()
}

fn collect(table: &Arc<SSTable>) -> Vec<Vec<u8>> {
    let mut iter = table.iter().unwrap();
    let mut keys = Vec::new();
    while iter.is_valid() {
        keys.push(iter.key().to_vec());
        iter.next().unwrap();
    }
    keys
}

// =============================================================================
// Test 1: Every written key is found, others are not
// =============================================================================
#[test]
fn get_finds_written_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.sst");
    let entries = numbered(500);
    write_table(&path, &entries, 256);

    let table = SSTable::open(&path, bytewise()).unwrap();
    for (k, v) in &entries {
        assert_eq!(table.get(k).unwrap().as_ref(), Some(v));
    }
    assert_eq!(table.get(b"key99999").unwrap(), None);
    assert_eq!(table.get(b"aaa").unwrap(), None);
    assert_eq!(table.get(b"key00010x").unwrap(), None);
}

// =============================================================================
// Test 2: Metadata is persisted
// =============================================================================
#[test]
fn meta_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.sst");
    write_table(&path, &numbered(20), 128);

    let table = SSTable::open(&path, bytewise()).unwrap();
    let meta = table.meta();
    assert_eq!(meta.watermark, 9);
    assert_eq!(meta.entry_count, 20);
    assert_eq!(meta.min_key, b"key00000");
    assert_eq!(meta.max_key, b"key00019");
}

// =============================================================================
// Test 3: Iteration crosses block boundaries in order
// =============================================================================
#[test]
fn iteration_crosses_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.sst");
    let entries = numbered(300);
    write_table(&path, &entries, 128);

    let table = Arc::new(SSTable::open(&path, bytewise()).unwrap());
    let keys = collect(&table);
    let expected: Vec<Vec<u8>> = entries.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, expected);
}

// =============================================================================
// Test 4: Seek lands on the first key >= target, in any block
// =============================================================================
#[test]
fn seek_across_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.sst");
    write_table(&path, &numbered(300), 128);

    let table = Arc::new(SSTable::open(&path, bytewise()).unwrap());
    let mut iter = table.iter().unwrap();

    iter.seek(b"key00150").unwrap();
    assert_eq!(iter.key(), b"key00150");
    iter.seek(b"key00150a").unwrap();
    assert_eq!(iter.key(), b"key00151");
    iter.seek(b"key99999").unwrap();
    assert!(!iter.is_valid());
    iter.seek_to_first().unwrap();
    assert_eq!(iter.key(), b"key00000");
}

// =============================================================================
// Test 5: Tables sorted by a custom order
// =============================================================================
#[test]
fn custom_order_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.sst");
    let order: OrderRef = Arc::new(Reverse);

    let mut entries = numbered(100);
    entries.sort_by(|a, b| order.compare(&a.0, &b.0));
    write_table(&path, &entries, 128);

    let table = Arc::new(SSTable::open(&path, order.clone()).unwrap());
    assert_eq!(table.get(b"key00042").unwrap(), Some(b"value42".to_vec()));
    let keys = collect(&table);
    assert_eq!(keys.first().unwrap(), b"key00099");
    assert_eq!(keys.last().unwrap(), b"key00000");
}

// =============================================================================
// Test 6: Empty values are kept
// =============================================================================
#[test]
fn empty_values_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.sst");
    write_table(&path, &[(b"k".to_vec(), Vec::new())], 4096);

    let table = SSTable::open(&path, bytewise()).unwrap();
    assert_eq!(table.get(b"k").unwrap(), Some(Vec::new()));
}

// =============================================================================
// Test 7: Bad magic and short files are corruption
// =============================================================================
#[test]
fn bad_files_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let short = dir.path().join("short.sst");
    std::fs::write(&short, b"tiny").unwrap();
    assert!(SSTable::open(&short, bytewise()).is_err());

    let path = dir.path().join("t.sst");
    write_table(&path, &numbered(10), 4096);
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();
    assert!(SSTable::open(&path, bytewise()).is_err());
}

// =============================================================================
// Test 8: Abandoning a builder removes its file
// =============================================================================
#[test]
fn abandon_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.sst");
    let mut builder = SSTableBuilder::new(&path, 1, 4096, 1, 0.01).unwrap();
    builder.add(b"k", b"v").unwrap();
    builder.abandon().unwrap();
    assert!(!path.exists());
}
