//! Tests for SSTable builder, reader, and iterator
//!
//! These tests verify:
//! - Building SSTables from sorted entries
//! - Reading values and tombstones back
//! - Reverse range lookups from the in-memory index
//! - Sequential iteration
//! - Format validation

use std::fs;
use std::ops::Bound;
use std::path::PathBuf;

use eventkv::storage::{SSTableBuilder, SSTableReader};
use eventkv::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.sst");
    (temp_dir, path)
}

/// Build an SSTable; `None` values become tombstones
fn build_sstable(path: &PathBuf, entries: &[(&str, Option<&str>)]) {
    let mut builder = SSTableBuilder::new(path).unwrap();
    for (key, value) in entries {
        match value {
            Some(v) => builder.add(key.as_bytes(), v.as_bytes()).unwrap(),
            None => builder.add_tombstone(key.as_bytes()).unwrap(),
        }
    }
    builder.finish().unwrap();
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_tracks_metadata() {
    let (_temp, path) = setup_temp_dir();

    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"apple", b"1").unwrap();
    builder.add_tombstone(b"banana").unwrap();
    builder.add(b"cherry", b"3").unwrap();
    assert_eq!(builder.entry_count(), 3);
    let metadata = builder.finish().unwrap();

    assert!(path.exists());
    assert_eq!(metadata.entry_count, 3);
    assert_eq!(metadata.tombstone_count, 1);
    assert_eq!(metadata.min_key, b"apple");
    assert_eq!(metadata.max_key, b"cherry");
    assert_eq!(metadata.file_size, fs::metadata(&path).unwrap().len());
    assert!(metadata.might_contain(b"banana"));
    assert!(!metadata.might_contain(b"zebra"));
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, path) = setup_temp_dir();

    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"b", b"1").unwrap();
    assert!(matches!(builder.add(b"a", b"2"), Err(StoreError::Storage(_))));
    assert!(matches!(builder.add_tombstone(b"b"), Err(StoreError::Storage(_))));
}

#[test]
fn test_builder_empty_sstable() {
    let (_temp, path) = setup_temp_dir();
    build_sstable(&path, &[]);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 0);
    assert!(reader.min_key().is_none());
    assert!(!reader.might_contain(b"anything"));
    assert_eq!(reader.iter().unwrap().count(), 0);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_get() {
    let (_temp, path) = setup_temp_dir();
    build_sstable(
        &path,
        &[
            ("a", Some("1")),
            ("b", None),
            ("c", Some("")),
            ("d", Some("4")),
        ],
    );

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 4);
    assert_eq!(reader.tombstone_count(), 1);
    assert_eq!(reader.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(reader.get(b"b").unwrap(), None);
    assert_eq!(reader.get(b"c").unwrap(), Some(Vec::new()));
    assert_eq!(reader.get(b"d").unwrap(), Some(b"4".to_vec()));
    assert!(matches!(reader.get(b"e"), Err(StoreError::KeyNotFound)));
}

#[test]
fn test_reader_random_access() {
    let (_temp, path) = setup_temp_dir();
    let mut builder = SSTableBuilder::new(&path).unwrap();
    for i in 0..500u32 {
        builder
            .add(&i.to_be_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    for i in [499u32, 0, 250, 17, 333] {
        assert_eq!(
            reader.get(&i.to_be_bytes()).unwrap(),
            Some(format!("value{}", i).into_bytes())
        );
    }
}

#[test]
fn test_entry_before() {
    let (_temp, path) = setup_temp_dir();
    build_sstable(
        &path,
        &[
            ("k1", Some("v1")),
            ("k2", None),
            ("k3", Some("v3")),
            ("x1", Some("x")),
        ],
    );
    let reader = SSTableReader::open(&path).unwrap();

    let (key, entry) = reader.entry_before(b"k", Bound::Excluded(b"l".as_slice())).unwrap();
    assert_eq!(key, b"k3");
    assert_eq!(reader.read_value(key.len(), &entry).unwrap(), b"v3");

    let (key, entry) = reader.entry_before(b"k", Bound::Excluded(b"k3".as_slice())).unwrap();
    assert_eq!(key, b"k2");
    assert!(entry.is_tombstone());
    assert!(reader.read_value(key.len(), &entry).is_err());

    assert!(reader.entry_before(b"k", Bound::Excluded(b"k1".as_slice())).is_none());
    assert!(reader.entry_before(b"z", Bound::Unbounded).is_none());
}

#[test]
fn test_reader_rejects_bad_magic() {
    let (_temp, path) = setup_temp_dir();
    build_sstable(&path, &[("a", Some("1"))]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(SSTableReader::open(&path), Err(StoreError::Storage(_))));
}

#[test]
fn test_reader_rejects_tiny_file() {
    let (_temp, path) = setup_temp_dir();
    fs::write(&path, b"EVKV").unwrap();

    assert!(SSTableReader::open(&path).is_err());
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_returns_all_entries_in_order() {
    let (_temp, path) = setup_temp_dir();
    build_sstable(
        &path,
        &[("a", Some("1")), ("b", None), ("c", Some("3"))],
    );
    let reader = SSTableReader::open(&path).unwrap();

    let entries: Vec<_> = reader.iter().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(
        entries,
        vec![
            (b"a".to_vec(), Some(b"1".to_vec())),
            (b"b".to_vec(), None),
            (b"c".to_vec(), Some(b"3".to_vec())),
        ]
    );
}

#[test]
fn test_large_values() {
    let (_temp, path) = setup_temp_dir();
    let large = vec![0x5A; 256 * 1024];
    let mut builder = SSTableBuilder::new(&path).unwrap();
    builder.add(b"big", &large).unwrap();
    builder.add(b"small", b"s").unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.get(b"big").unwrap(), Some(large));
    assert_eq!(reader.get(b"small").unwrap(), Some(b"s".to_vec()));
}
