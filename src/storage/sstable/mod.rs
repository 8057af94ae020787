//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (22 bytes)                                       │
//! │   Magic: "EVKV" (4) | Version: u16 (2) | Count: u64 (8) │
//! │   ReplacesBelow: u64 (8)                                │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry ...                       │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][ValLen: u32][Key]          │
//! │   ... repeated for each entry ...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | Padding (4) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The index repeats each value length so scans over empty-valued keys and
//! tombstones never touch the data block.
//!
//! `ReplacesBelow` is non-zero only for compaction output: every table with a
//! smaller id was merged into this one and is stale once this file exists.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying an eventkv SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"EVKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 3;

/// Header size: Magic (4) + Version (2) + EntryCount (8) + ReplacesBelow (8) = 22 bytes
pub(crate) const HEADER_SIZE: u64 = 22;

/// Footer size: IndexOffset (8) + DataCRC (4) + Padding (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

// =============================================================================
// SSTable Metadata
// =============================================================================

/// SSTable metadata returned when a table is built
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries in this SSTable
    pub entry_count: u64,
    /// Number of those entries that are tombstones
    pub tombstone_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: Vec<u8>,
    /// Largest key (for range filtering)
    pub max_key: Vec<u8>,
    /// File size in bytes
    pub file_size: u64,
    /// Tables with a smaller id that this one supersedes (0 = none)
    pub replaces_below: u64,
}

impl SSTable {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false if key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.entry_count > 0
            && key >= self.min_key.as_slice()
            && key <= self.max_key.as_slice()
    }
}

/// Location of one entry, as recorded in the index block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// File offset of the entry header in the data block
    pub offset: u64,
    /// Value length, or `TOMBSTONE_MARKER`
    pub value_len: u32,
}

impl IndexEntry {
    /// Whether the entry records a deletion
    pub fn is_tombstone(&self) -> bool {
        self.value_len == TOMBSTONE_MARKER
    }
}
