//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{Result, StoreError};

use super::{HEADER_SIZE, TOMBSTONE_MARKER};

/// Iterator over SSTable entries in sorted key order
///
/// Owns its own file handle so it can run alongside concurrent point reads.
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Stop reading when we reach this offset (start of index block)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
}

impl SSTableIterator {
    /// Create a new iterator starting from the data block
    pub(super) fn new(mut file: BufReader<File>, end_offset: u64) -> Result<Self> {
        // Seek to start of data (after header)
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        // Read entry header
        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        // Calculate entry size and update offset
        let mut entry_size = 8 + key_len as u64;
        if self.current_offset + entry_size > self.end_offset {
            return Err(StoreError::Storage(format!(
                "SSTable entry at offset {} runs into the index block",
                self.current_offset
            )));
        }

        // Read key
        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        // Read value (if not tombstone)
        let value = if val_len == TOMBSTONE_MARKER {
            None
        } else {
            let mut v = vec![0u8; val_len as usize];
            self.file.read_exact(&mut v)?;
            entry_size += val_len as u64;
            Some(v)
        };

        self.current_offset += entry_size;
        Ok((key, value))
    }
}

impl Iterator for SSTableIterator {
    /// (key, Option<value>), a None value means tombstone
    type Item = Result<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at index block
        if self.current_offset >= self.end_offset {
            return None;
        }

        match self.read_entry() {
            Ok(entry) => Some(Ok(entry)),
            Err(e) => {
                // Poison the iterator so a bad entry is reported once
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}
