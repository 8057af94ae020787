//! Tests for WAL Reader
//!
//! These tests verify:
//! - Reading entries from a WAL file
//! - Iterator functionality
//! - Partial write handling
//! - Empty file handling

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use eventkv::wal::{Operation, WalEntry, WalReader, HEADER_SIZE};
use eventkv::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn entry(lsn: u64) -> WalEntry {
    WalEntry::new(
        lsn,
        vec![Operation::Put {
            key: format!("key{}", lsn).into_bytes(),
            value: format!("value{}", lsn).into_bytes(),
        }],
    )
}

fn write_entries_to_wal(path: &PathBuf, entries: &[WalEntry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        file.write_all(&entry.serialize().unwrap()).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Basic Reading Tests
// =============================================================================

#[test]
fn test_read_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_read_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let written = vec![entry(1), entry(2), entry(3)];
    write_entries_to_wal(&wal_path, &written);

    let mut reader = WalReader::open(&wal_path).unwrap();
    for expected in &written {
        assert_eq!(&reader.next_entry().unwrap().unwrap(), expected);
    }
    assert!(reader.next_entry().unwrap().is_none());

    let total: usize = written.iter().map(|e| e.serialized_size().unwrap()).sum();
    assert_eq!(reader.position(), total as u64);
}

#[test]
fn test_iterator_for_loop() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_to_wal(&wal_path, &[entry(1), entry(2)]);

    let mut lsns = Vec::new();
    for item in WalReader::open(&wal_path).unwrap().entries() {
        lsns.push(item.unwrap().lsn);
    }
    assert_eq!(lsns, vec![1, 2]);
}

// =============================================================================
// Partial Write Tests
// =============================================================================

#[test]
fn test_partial_header() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_to_wal(&wal_path, &[entry(1)]);
    {
        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&[0u8; HEADER_SIZE - 4]).unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.next_entry().unwrap().unwrap().lsn, 1);
    let valid = reader.position();

    assert!(matches!(reader.next_entry(), Err(StoreError::WalCorruption(_))));
    assert_eq!(reader.position(), valid);
}

#[test]
fn test_partial_data() {
    let (_temp, wal_path) = setup_temp_wal();
    let bytes = entry(1).serialize().unwrap();
    {
        let mut file = File::create(&wal_path).unwrap();
        file.write_all(&bytes[..bytes.len() - 3]).unwrap();
    }

    let mut iter = WalReader::open(&wal_path).unwrap().entries();
    assert!(matches!(iter.next(), Some(Err(StoreError::WalCorruption(_)))));
    assert!(iter.next().is_none());
}

#[test]
fn test_garbage_length_rejected() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut file = File::create(&wal_path).unwrap();
        let mut header = [0u8; HEADER_SIZE];
        header[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        file.write_all(&header).unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_entry(), Err(StoreError::WalCorruption(_))));
}
