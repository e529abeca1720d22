// Log section management tests: loading, rotation, iteration, cleanup.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use overlaydb::Error;
use overlaydb::wal::{Log, LogEntry, LogOptions, SyncPolicy};

fn options(section_bytes: u64) -> LogOptions {
    LogOptions {
        sync_policy: SyncPolicy::OnCommit,
        section_bytes,
    }
}

fn entry(lsn: u64) -> LogEntry {
    LogEntry::new(lsn, format!("op-{lsn}").into_bytes())
}

fn open_loaded(dir: &Path, section_bytes: u64) -> Log {
    let mut log = Log::open(dir, options(section_bytes)).unwrap();
    log.load_required_sections(0).unwrap();
    log
}

fn lsns(log: &mut Log, from: u64) -> Vec<u64> {
    log.iter(from).unwrap().map(|e| e.unwrap().lsn).collect()
}

fn section_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "log"))
        .count()
}

// =============================================================================
// Test 1: Appends are visible to iteration before commit
// =============================================================================
#[test]
fn appends_visible_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = open_loaded(dir.path(), 1 << 20);

    for lsn in 1..=3 {
        log.append(&entry(lsn)).unwrap();
    }
    assert_eq!(lsns(&mut log, 1), vec![1, 2, 3]);
    assert_eq!(lsns(&mut log, 2), vec![2, 3]);
    assert_eq!(log.last_lsn(), 3);
}

// =============================================================================
// Test 2: LSNs must strictly increase
// =============================================================================
#[test]
fn non_increasing_lsn_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = open_loaded(dir.path(), 1 << 20);

    log.append(&entry(5)).unwrap();
    assert!(matches!(
        log.append(&entry(5)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        log.append(&entry(4)),
        Err(Error::InvalidArgument(_))
    ));
    log.append(&entry(6)).unwrap();
}

// =============================================================================
// Test 3: Appending before sections are loaded is refused
// =============================================================================
#[test]
fn append_requires_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = Log::open(dir.path(), options(1 << 20)).unwrap();
    assert!(matches!(
        log.append(&entry(1)),
        Err(Error::InvalidArgument(_))
    ));
}

// =============================================================================
// Test 4: Small sections rotate, iteration spans all of them
// =============================================================================
#[test]
fn sections_rotate_by_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = open_loaded(dir.path(), 64);

    for lsn in 1..=20 {
        log.append(&entry(lsn)).unwrap();
    }
    log.commit().unwrap();

    assert!(log.sections().len() > 1);
    assert_eq!(section_files(dir.path()), log.sections().len());
    assert_eq!(lsns(&mut log, 1), (1..=20).collect::<Vec<_>>());
}

// =============================================================================
// Test 5: Reopen finds every committed entry
// =============================================================================
#[test]
fn reopen_recovers_entries() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = open_loaded(dir.path(), 64);
        for lsn in 1..=10 {
            log.append(&entry(lsn)).unwrap();
        }
        log.commit().unwrap();
    }

    let mut log = Log::open(dir.path(), options(64)).unwrap();
    assert_eq!(log.load_required_sections(0).unwrap(), 10);
    assert_eq!(lsns(&mut log, 1), (1..=10).collect::<Vec<_>>());

    log.append(&entry(11)).unwrap();
    assert_eq!(lsns(&mut log, 10), vec![10, 11]);
}

// =============================================================================
// Test 6: A torn tail is cut off at load and appends continue after it
// =============================================================================
#[test]
fn torn_tail_truncated_on_load() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = open_loaded(dir.path(), 1 << 20);
        for lsn in 1..=3 {
            log.append(&entry(lsn)).unwrap();
        }
        log.commit().unwrap();
    }

    let section = log_section(dir.path());
    let clean_len = fs::metadata(&section).unwrap().len();
    let partial = entry(4).encode();
    OpenOptions::new()
        .append(true)
        .open(&section)
        .unwrap()
        .write_all(&partial[..10])
        .unwrap();

    let mut log = Log::open(dir.path(), options(1 << 20)).unwrap();
    assert_eq!(log.load_required_sections(0).unwrap(), 3);
    assert_eq!(fs::metadata(&section).unwrap().len(), clean_len);

    log.append(&entry(4)).unwrap();
    assert_eq!(lsns(&mut log, 1), vec![1, 2, 3, 4]);
}

fn log_section(dir: &Path) -> std::path::PathBuf {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|ext| ext == "log"))
        .unwrap()
}

// =============================================================================
// Test 7: Corruption in a sealed section fails iteration
// =============================================================================
#[test]
fn corruption_in_sealed_section_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let first;
    {
        let mut log = open_loaded(dir.path(), 1 << 20);
        log.append(&entry(1)).unwrap();
        log.append(&entry(2)).unwrap();
        log.seal().unwrap();
        log.append(&entry(3)).unwrap();
        log.commit().unwrap();
        first = log.sections()[0].path.clone();
    }

    let mut bytes = fs::read(&first).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&first, bytes).unwrap();

    let mut log = Log::open(dir.path(), options(1 << 20)).unwrap();
    log.load_required_sections(0).unwrap();
    let results: Vec<_> = log.iter(1).unwrap().collect();
    assert!(matches!(results.last(), Some(Err(Error::Corruption(_)))));
}

// =============================================================================
// Test 8: Sections wholly at or below the floor are never read
// =============================================================================
#[test]
fn floor_skips_compacted_sections() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = open_loaded(dir.path(), 1 << 20);
        log.append(&entry(1)).unwrap();
        log.append(&entry(2)).unwrap();
        log.seal().unwrap();
        log.append(&entry(3)).unwrap();
        log.commit().unwrap();
    }

    // Damage the first section; with a floor of 2 it must not matter.
    let mut log = Log::open(dir.path(), options(1 << 20)).unwrap();
    let first = log.sections()[0].path.clone();
    fs::write(&first, b"garbage").unwrap();

    assert_eq!(log.load_required_sections(2).unwrap(), 3);
    assert_eq!(lsns(&mut log, 1), vec![3]);
}

// =============================================================================
// Test 9: Cleanup removes only sealed sections wholly at or below the bound
// =============================================================================
#[test]
fn cleanup_removes_covered_sections() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = open_loaded(dir.path(), 1 << 20);

    for lsn in 1..=2 {
        log.append(&entry(lsn)).unwrap();
    }
    log.seal().unwrap();
    for lsn in 3..=4 {
        log.append(&entry(lsn)).unwrap();
    }
    log.seal().unwrap();
    log.append(&entry(5)).unwrap();

    // Second section ends at 4, so only the first is covered by 3.
    assert_eq!(log.cleanup(3, None).unwrap(), 1);
    assert_eq!(lsns(&mut log, 1), vec![3, 4, 5]);

    // The open section is never removed.
    assert_eq!(log.cleanup(100, None).unwrap(), 1);
    assert_eq!(log.sections().len(), 1);
    assert_eq!(lsns(&mut log, 1), vec![5]);
}

// =============================================================================
// Test 10: Cleanup with a destination archives instead of deleting
// =============================================================================
#[test]
fn cleanup_archives_to_destination() {
    let dir = tempfile::tempdir().unwrap();
    let archive = tempfile::tempdir().unwrap();
    let mut log = open_loaded(dir.path(), 1 << 20);

    log.append(&entry(1)).unwrap();
    log.seal().unwrap();
    log.append(&entry(2)).unwrap();

    assert_eq!(log.cleanup(1, Some(archive.path())).unwrap(), 1);
    assert_eq!(section_files(archive.path()), 1);
    assert_eq!(section_files(dir.path()), 1);
}

// =============================================================================
// Test 11: A range iterator sees only entries up to its bound
// =============================================================================
#[test]
fn iter_range_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = open_loaded(dir.path(), 1 << 20);
    for lsn in 1..=6 {
        log.append(&entry(lsn)).unwrap();
    }

    let got: Vec<u64> = log.iter_range(2, 4).unwrap().map(|e| e.unwrap().lsn).collect();
    assert_eq!(got, vec![2, 3, 4]);
}

// =============================================================================
// Test 12: An iterator created earlier does not see later appends
// =============================================================================
#[test]
fn iterator_is_bounded_at_creation() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = open_loaded(dir.path(), 1 << 20);
    log.append(&entry(1)).unwrap();

    let iter = log.iter(1).unwrap();
    log.append(&entry(2)).unwrap();

    let got: Vec<u64> = iter.map(|e| e.unwrap().lsn).collect();
    assert_eq!(got, vec![1]);
}

// =============================================================================
// Test 13: A damaged record with valid records after it fails the load
// =============================================================================
#[test]
fn damaged_record_in_newest_section_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = open_loaded(dir.path(), 1 << 20);
        for lsn in 1..=4 {
            log.append(&entry(lsn)).unwrap();
        }
        log.commit().unwrap();
    }

    let section = log_section(dir.path());
    let mut bytes = fs::read(&section).unwrap();
    let frame = entry(1).encode().len();
    // Last payload byte of record 2.
    bytes[2 * frame - 1] ^= 0xFF;
    fs::write(&section, &bytes).unwrap();

    let mut log = Log::open(dir.path(), options(1 << 20)).unwrap();
    assert!(matches!(
        log.load_required_sections(0),
        Err(Error::Corruption(_))
    ));
    // Nothing was cut away.
    assert_eq!(fs::metadata(&section).unwrap().len(), bytes.len() as u64);
}

// =============================================================================
// Test 14: A damaged final record, or zero fill, is still a torn tail
// =============================================================================
#[test]
fn damaged_final_record_is_torn_tail() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = open_loaded(dir.path(), 1 << 20);
        for lsn in 1..=3 {
            log.append(&entry(lsn)).unwrap();
        }
        log.commit().unwrap();
    }

    let section = log_section(dir.path());
    let mut bytes = fs::read(&section).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    bytes.extend_from_slice(&[0u8; 32]);
    fs::write(&section, &bytes).unwrap();

    let mut log = Log::open(dir.path(), options(1 << 20)).unwrap();
    assert_eq!(log.load_required_sections(0).unwrap(), 2);
    assert_eq!(lsns(&mut log, 1), vec![1, 2]);

    log.append(&entry(3)).unwrap();
    assert_eq!(lsns(&mut log, 1), vec![1, 2, 3]);
}

// =============================================================================
// Test 15: An append that fills its section succeeds and rotates
// =============================================================================
#[test]
fn append_that_fills_section_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = open_loaded(dir.path(), 1);
        log.append(&entry(1)).unwrap();
        assert_eq!(section_files(dir.path()), 1);
        log.append(&entry(2)).unwrap();
        assert_eq!(section_files(dir.path()), 2);
        log.commit().unwrap();
    }

    let mut log = Log::open(dir.path(), options(1)).unwrap();
    assert_eq!(log.load_required_sections(0).unwrap(), 2);
    assert_eq!(lsns(&mut log, 1), vec![1, 2]);
}
