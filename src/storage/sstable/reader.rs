//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups and reverse
//! neighbour searches via the in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::iterator::SSTableIterator;
use super::{IndexEntry, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// The file handle sits behind a mutex so one reader can be shared by every
/// snapshot and scan thread.
pub struct SSTableReader {
    /// Path to the table (iterators open their own handle)
    path: PathBuf,
    /// File handle for reading values
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → entry location
    index: BTreeMap<Vec<u8>, IndexEntry>,
    /// Metadata
    entry_count: u64,
    tombstone_count: u64,
    /// Ids below this were merged into this table
    replaces_below: u64,
    /// Index block starting offset (for iteration)
    index_offset: u64,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Loads the entire index into memory for fast lookups.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(StoreError::Storage(format!(
                "SSTable {} is too small ({} bytes)",
                path.display(),
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(StoreError::Storage(format!(
                "Invalid SSTable magic: expected EVKV, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(StoreError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = read_u64(&header[6..14]);
        let replaces_below = read_u64(&header[14..22]);

        // Read footer to get index offset
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = read_u64(&footer[0..8]);
        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(StoreError::Storage(format!(
                "SSTable {} has an out-of-range index offset {}",
                path.display(),
                index_offset
            )));
        }

        // Load index into memory
        let mut index = BTreeMap::new();
        let mut tombstone_count = 0;
        file.seek(SeekFrom::Start(index_offset))?;

        // Index block size = file_size - footer_size - index_offset
        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.read_exact(&mut index_data)?;

        // Parse index entries: [key_len(4)][offset(8)][val_len(4)][key]
        let mut pos = 0;
        while pos + 16 <= index_data.len() {
            let key_len = read_u32(&index_data[pos..pos + 4]) as usize;
            let offset = read_u64(&index_data[pos + 4..pos + 12]);
            let value_len = read_u32(&index_data[pos + 12..pos + 16]);
            pos += 16;

            if pos + key_len > index_data.len() {
                break;
            }
            let key = index_data[pos..pos + key_len].to_vec();
            pos += key_len;

            let entry = IndexEntry { offset, value_len };
            if entry.is_tombstone() {
                tombstone_count += 1;
            }
            index.insert(key, entry);
        }

        if index.len() as u64 != entry_count {
            return Err(StoreError::Storage(format!(
                "SSTable {} index holds {} entries, header says {}",
                path.display(),
                index.len(),
                entry_count
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            tombstone_count,
            replaces_below,
            index_offset,
            file_size,
        })
    }

    /// Get a value by key (O(log n) via the in-memory index)
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found with value
    /// - `Ok(None)`: key found but is a tombstone (deleted)
    /// - `Err(KeyNotFound)`: key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.index.get(key) {
            Some(entry) if entry.is_tombstone() => Ok(None),
            Some(entry) => self.read_value(key.len(), entry).map(Some),
            None => Err(StoreError::KeyNotFound),
        }
    }

    /// Greatest indexed key in `[lower, upper)` (per the given upper bound)
    pub fn entry_before(&self, lower: &[u8], upper: Bound<&[u8]>) -> Option<(Vec<u8>, IndexEntry)> {
        if let Bound::Included(u) | Bound::Excluded(u) = upper {
            if u < lower {
                return None;
            }
        }
        self.index
            .range::<[u8], _>((Bound::Included(lower), upper))
            .next_back()
            .map(|(k, e)| (k.clone(), *e))
    }

    /// Read the value an index entry points to
    ///
    /// Empty values are answered from the index alone.
    pub fn read_value(&self, key_len: usize, entry: &IndexEntry) -> Result<Vec<u8>> {
        if entry.is_tombstone() {
            return Err(StoreError::Storage(
                "attempted to read the value of a tombstone".to_string(),
            ));
        }
        if entry.value_len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        // Skip the entry header and the key
        file.seek(SeekFrom::Start(entry.offset + 8 + key_len as u64))?;
        let mut value = vec![0u8; entry.value_len as usize];
        file.read_exact(&mut value)?;
        Ok(value)
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Tables with a smaller id that this one supersedes (0 = none)
    pub fn replaces_below(&self) -> u64 {
        self.replaces_below
    }

    /// Number of tombstones held by this table
    pub fn tombstone_count(&self) -> u64 {
        self.tombstone_count
    }

    /// Size of the table file in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the table file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// Create a forward iterator over all entries (for compaction, debugging)
    pub fn iter(&self) -> Result<SSTableIterator> {
        let file = File::open(&self.path)?;
        SSTableIterator::new(BufReader::new(file), self.index_offset)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
