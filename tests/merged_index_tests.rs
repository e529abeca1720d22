// Merged index tests: layering, rotation, install.

use std::sync::Arc;

use overlaydb::Error;
use overlaydb::index::{ImmutableIndex, MergedIndex};
use overlaydb::order::{KeyOrder, Reverse, bytewise};
use overlaydb::sstable::{SSTable, SSTableBuilder};

fn keys(iter: overlaydb::RangeIter) -> Vec<String> {
    iter.map(|r| String::from_utf8(r.unwrap().0).unwrap()).collect()
}

fn table_index(dir: &std::path::Path, entries: &[(&str, &str)], watermark: u64) -> ImmutableIndex {
    let path = dir.join(format!("{watermark:020}.sst"));
    let mut builder = SSTableBuilder::new(&path, watermark, 4096, entries.len(), 0.01).unwrap();
    for (k, v) in entries {
        builder.add(k.as_bytes(), v.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
    let table = SSTable::open(&path, bytewise()).unwrap();
    ImmutableIndex::new(Some(Arc::new(table)), watermark, bytewise())
}

// =============================================================================
// Test 1: A new index is empty with watermark 0
// =============================================================================
#[test]
fn fresh_index() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    assert_eq!(index.name(), "users");
    assert_eq!(index.last_persistent_lsn(), 0);
    assert_eq!(index.lookup(b"k").unwrap(), None);
    assert!(keys(index.iter().unwrap()).is_empty());
}

// =============================================================================
// Test 2: Remove writes a tombstone that hides older layers
// =============================================================================
#[test]
fn remove_hides_lower_layers() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    index.install(table_index(dir.path(), &[("a", "disk"), ("b", "disk")], 2));

    index.remove(3, b"a");
    assert_eq!(index.lookup(b"a").unwrap(), None);
    assert_eq!(index.lookup(b"b").unwrap(), Some(b"disk".to_vec()));
    assert_eq!(keys(index.iter().unwrap()), vec!["b"]);

    index.add(4, b"a", b"again");
    assert_eq!(index.lookup(b"a").unwrap(), Some(b"again".to_vec()));
}

// =============================================================================
// Test 3: Frozen overlays sit between the tail and the immutable index
// =============================================================================
#[test]
fn frozen_overlays_layer_correctly() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();

    index.add(1, b"k", b"v1");
    index.add(2, b"only-frozen", b"f");
    index.rotate_tail();
    index.add(3, b"k", b"v3");
    assert_eq!(index.frozen_overlays(), 1);

    assert_eq!(index.lookup(b"k").unwrap(), Some(b"v3".to_vec()));
    assert_eq!(index.lookup(b"only-frozen").unwrap(), Some(b"f".to_vec()));
    assert_eq!(keys(index.iter().unwrap()), vec!["k", "only-frozen"]);
}

// =============================================================================
// Test 4: Rotating an empty tail is a no-op
// =============================================================================
#[test]
fn empty_rotation_noop() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    index.rotate_tail();
    assert_eq!(index.frozen_overlays(), 0);
}

// =============================================================================
// Test 5: Install drops frozen overlays the new watermark covers
// =============================================================================
#[test]
fn install_drops_covered_overlays() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();

    index.add(1, b"a", b"1");
    index.rotate_tail();
    index.add(2, b"b", b"2");
    index.rotate_tail();
    assert_eq!(index.frozen_overlays(), 2);

    index.install(table_index(dir.path(), &[("a", "1")], 1));
    assert_eq!(index.frozen_overlays(), 1);
    assert_eq!(index.last_persistent_lsn(), 1);
    assert_eq!(keys(index.iter().unwrap()), vec!["a", "b"]);
}

// =============================================================================
// Test 6: Writes at or below the watermark are ignored
// =============================================================================
#[test]
fn writes_below_watermark_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    index.install(table_index(dir.path(), &[("a", "persisted")], 5));

    index.add(5, b"a", b"stale");
    index.remove(4, b"a");
    assert_eq!(index.lookup(b"a").unwrap(), Some(b"persisted".to_vec()));
    assert_eq!(index.buffered_entries(), 0);
}

// =============================================================================
// Test 7: Range lookups are half-open and merge every layer
// =============================================================================
#[test]
fn range_lookup_merges_layers() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    index.install(table_index(dir.path(), &[("a", "1"), ("c", "3"), ("e", "5")], 3));

    index.add(4, b"b", b"2");
    index.remove(5, b"c");
    index.rotate_tail();
    index.add(6, b"d", b"4");

    assert_eq!(keys(index.range_lookup(b"a", b"e").unwrap()), vec!["a", "b", "d"]);
    assert_eq!(keys(index.range_lookup(b"b", b"b").unwrap()), Vec::<String>::new());
    assert_eq!(keys(index.range_lookup(b"c", b"z").unwrap()), vec!["d", "e"]);
}

// =============================================================================
// Test 8: An open range sees the snapshot it was created from
// =============================================================================
#[test]
fn range_survives_install() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    index.add(1, b"a", b"1");
    index.add(2, b"b", b"2");

    let range = index.range_lookup(b"a", b"z").unwrap();
    index.rotate_tail();
    index.install(table_index(dir.path(), &[("a", "1"), ("b", "2")], 2));

    assert_eq!(keys(range), vec!["a", "b"]);
}

// =============================================================================
// Test 9: Prefix lookup, and its refusal under an order that cannot seek it
// =============================================================================
#[test]
fn prefix_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    for (lsn, k) in ["app", "apple", "apply", "banana"].iter().enumerate() {
        index.add(lsn as u64 + 1, k.as_bytes(), b"v");
    }
    index.remove(5, b"apple");
    assert_eq!(keys(index.prefix_lookup(b"app").unwrap()), vec!["app", "apply"]);

    let reverse_dir = tempfile::tempdir().unwrap();
    let reverse = MergedIndex::open(reverse_dir.path(), "rev", Arc::new(Reverse)).unwrap();
    assert!(matches!(
        reverse.prefix_lookup(b"a"),
        Err(Error::InvalidArgument(_))
    ));
}

// =============================================================================
// Test 10: Unreferenced tables are reclaimed when the index opens
// =============================================================================
#[test]
fn orphans_reclaimed_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let orphan = table_index(dir.path(), &[("x", "y")], 7);
    let orphan_path = orphan.table_path().unwrap().to_path_buf();
    drop(orphan);
    std::fs::write(dir.path().join("CURRENT.tmp"), b"partial").unwrap();

    let index = MergedIndex::open(dir.path(), "users", bytewise()).unwrap();
    assert!(!orphan_path.exists());
    assert!(!dir.path().join("CURRENT.tmp").exists());
    assert_eq!(index.lookup(b"x").unwrap(), None);
}

// =============================================================================
// Test 11: A custom order must opt in before prefix lookups are served
// =============================================================================
struct LengthFirst;

impl KeyOrder for LengthFirst {
    fn name(&self) -> &str {
        "length-first"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

#[test]
fn custom_order_prefix_lookup_refused() {
    let dir = tempfile::tempdir().unwrap();
    let index = MergedIndex::open(dir.path(), "len", Arc::new(LengthFirst)).unwrap();
    index.add(1, b"ab", b"v");
    index.add(2, b"b", b"v");
    index.add(3, b"abc", b"v");

    assert!(matches!(
        index.prefix_lookup(b"ab"),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(keys(index.iter().unwrap()), vec!["b", "ab", "abc"]);
}
