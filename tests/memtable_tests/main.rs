//! MemTable Tests
//!
//! Tests verify:
//! - Basic put/get/delete under sequence numbers
//! - Snapshot visibility of older versions
//! - Size and key accounting
//! - Reverse range lookups used by scans
//! - Sorted iteration of latest versions
//! - Concurrent access patterns

use std::ops::Bound;
use std::sync::Arc;
use std::thread;

use eventkv::memtable::{MemTable, MemTableEntry};

const LATEST: u64 = u64::MAX;

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_put_and_get() {
    let memtable = MemTable::new();

    memtable.put(1, b"key1".to_vec(), b"value1".to_vec());

    let result = memtable.get(b"key1", LATEST);
    assert_eq!(result, Some(MemTableEntry::Value(b"value1".to_vec())));
    assert_eq!(memtable.get(b"nonexistent", LATEST), None);
}

#[test]
fn test_delete_leaves_tombstone() {
    let memtable = MemTable::new();

    memtable.put(1, b"key".to_vec(), b"value".to_vec());
    memtable.delete(2, b"key".to_vec());

    assert_eq!(memtable.get(b"key", LATEST), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.entry_count(), 1);
}

// =============================================================================
// Sequence Visibility Tests
// =============================================================================

#[test]
fn test_older_sequence_sees_older_version() {
    let memtable = MemTable::new();

    memtable.put(1, b"key".to_vec(), b"v1".to_vec());
    memtable.put(3, b"key".to_vec(), b"v3".to_vec());
    memtable.delete(5, b"key".to_vec());

    assert_eq!(memtable.get(b"key", 0), None);
    assert_eq!(memtable.get(b"key", 1), Some(MemTableEntry::Value(b"v1".to_vec())));
    assert_eq!(memtable.get(b"key", 2), Some(MemTableEntry::Value(b"v1".to_vec())));
    assert_eq!(memtable.get(b"key", 4), Some(MemTableEntry::Value(b"v3".to_vec())));
    assert_eq!(memtable.get(b"key", 5), Some(MemTableEntry::Tombstone));
}

#[test]
fn test_last_write_in_one_batch_wins() {
    let memtable = MemTable::new();

    memtable.delete(7, b"key".to_vec());
    memtable.put(7, b"key".to_vec(), b"again".to_vec());

    assert_eq!(
        memtable.get(b"key", 7),
        Some(MemTableEntry::Value(b"again".to_vec()))
    );
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_grows_with_every_version() {
    let memtable = MemTable::new();

    let first = memtable.put(1, b"key".to_vec(), b"value".to_vec());
    assert!(first > 0);
    assert_eq!(memtable.size(), first);

    let second = memtable.put(2, b"key".to_vec(), b"value".to_vec());
    assert!(second > first);
    assert_eq!(memtable.entry_count(), 1);
}

#[test]
fn test_should_flush() {
    let memtable = MemTable::new();
    memtable.put(1, vec![0u8; 100], vec![0u8; 100]);

    assert!(memtable.should_flush(100));
    assert!(!memtable.should_flush(10_000));
}

// =============================================================================
// Reverse Lookup Tests
// =============================================================================

#[test]
fn test_entry_before_finds_greatest_key_in_range() {
    let memtable = MemTable::new();
    for key in [b"a1", b"a2", b"a3", b"b1"] {
        memtable.put(1, key.to_vec(), b"v".to_vec());
    }

    let (key, _) = memtable
        .entry_before(b"a", Bound::Excluded(b"b".as_slice()), LATEST)
        .unwrap();
    assert_eq!(key, b"a3");

    let (key, _) = memtable
        .entry_before(b"a", Bound::Excluded(b"a3".as_slice()), LATEST)
        .unwrap();
    assert_eq!(key, b"a2");

    let (key, _) = memtable
        .entry_before(b"a", Bound::Included(b"a2".as_slice()), LATEST)
        .unwrap();
    assert_eq!(key, b"a2");

    assert!(memtable
        .entry_before(b"c", Bound::Unbounded, LATEST)
        .is_none());
}

#[test]
fn test_entry_before_skips_invisible_keys() {
    let memtable = MemTable::new();
    memtable.put(1, b"k1".to_vec(), b"old".to_vec());
    memtable.put(5, b"k2".to_vec(), b"new".to_vec());

    let (key, entry) = memtable.entry_before(b"k", Bound::Unbounded, 4).unwrap();
    assert_eq!(key, b"k1");
    assert_eq!(entry, MemTableEntry::Value(b"old".to_vec()));
}

#[test]
fn test_entry_before_reports_tombstones() {
    let memtable = MemTable::new();
    memtable.put(1, b"k1".to_vec(), b"v".to_vec());
    memtable.delete(2, b"k1".to_vec());

    let (_, entry) = memtable.entry_before(b"k", Bound::Unbounded, LATEST).unwrap();
    assert_eq!(entry, MemTableEntry::Tombstone);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iter_sorted_latest_versions() {
    let memtable = MemTable::new();
    memtable.put(1, b"c".to_vec(), b"3".to_vec());
    memtable.put(2, b"a".to_vec(), b"1".to_vec());
    memtable.put(3, b"b".to_vec(), b"2".to_vec());
    memtable.put(4, b"a".to_vec(), b"1b".to_vec());
    memtable.delete(5, b"c".to_vec());

    let entries: Vec<_> = memtable.iter().collect();
    assert_eq!(
        entries,
        vec![
            (b"a".to_vec(), MemTableEntry::Value(b"1b".to_vec())),
            (b"b".to_vec(), MemTableEntry::Value(b"2".to_vec())),
            (b"c".to_vec(), MemTableEntry::Tombstone),
        ]
    );
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers_during_writes() {
    let memtable = Arc::new(MemTable::new());
    memtable.put(1, b"stable".to_vec(), b"value".to_vec());

    let writer = {
        let memtable = Arc::clone(&memtable);
        thread::spawn(move || {
            for i in 0..1000u64 {
                memtable.put(i + 2, format!("key{:04}", i).into_bytes(), b"v".to_vec());
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let memtable = Arc::clone(&memtable);
            thread::spawn(move || {
                for _ in 0..1000 {
                    assert_eq!(
                        memtable.get(b"stable", 1),
                        Some(MemTableEntry::Value(b"value".to_vec()))
                    );
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(memtable.entry_count(), 1001);
}
