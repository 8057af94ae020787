//! Storage Module
//!
//! Persistent storage layer using an SSTable format.
//!
//! ## Responsibilities
//! - Persist memtable contents to disk in sorted format
//! - Point lookups and reverse neighbour searches through in-memory indexes
//! - Compaction: merge tables, drop shadowed versions and tombstones
//!
//! See [`sstable`] for the on-disk layout.

pub mod sstable;
mod manager;

pub use manager::StorageManager;
pub use sstable::{IndexEntry, SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
