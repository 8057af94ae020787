//! Storage Manager
//!
//! Owns the SSTable directory: naming, discovery, flush and compaction.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Create new SSTables from MemTable flushes
//! - Merge a set of SSTables into one, dropping shadowed entries and tombstones
//! - Allocate SSTable IDs
//!
//! The list of live tables belongs to the engine; this type only produces
//! and removes files, so a table can keep serving readers after it has been
//! replaced.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::memtable::{MemTable, MemTableEntry};

use super::{SSTableBuilder, SSTableIterator, SSTableReader};

/// Manages the SSTable files of one engine
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// Returns the manager together with readers for every existing table,
    /// ordered newest → oldest. Leftovers of an interrupted compaction are
    /// removed: temporary files, and input tables already merged into a
    /// table whose header says it replaces them.
    pub fn open(path: &Path) -> Result<(Self, Vec<Arc<SSTableReader>>)> {
        // Create directory if it doesn't exist
        fs::create_dir_all(path)?;

        // Discover existing SSTables
        let mut sstable_ids: Vec<u64> = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();

            if !file_path.is_file() {
                continue;
            }
            if file_path.extension().map_or(false, |ext| ext == "tmp") {
                tracing::warn!("removing unfinished table {}", file_path.display());
                fs::remove_file(&file_path)?;
                continue;
            }
            if let Some(id) = Self::parse_sstable_id(&file_path) {
                sstable_ids.push(id);
            }
        }

        // Sort newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut opened = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            let reader = SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?;
            opened.push((*id, Arc::new(reader)));
        }

        let replaced_below = opened
            .iter()
            .map(|(_, table)| table.replaces_below())
            .max()
            .unwrap_or(0);
        let mut tables = Vec::with_capacity(opened.len());
        for (id, table) in opened {
            if id < replaced_below {
                tracing::warn!(
                    "removing {} left over from an interrupted compaction",
                    table.path().display()
                );
                let stale = table.path().to_path_buf();
                drop(table);
                fs::remove_file(&stale)?;
                continue;
            }
            tables.push(table);
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        tracing::debug!("opened {} sstables in {}", tables.len(), path.display());

        Ok((
            Self {
                data_dir: path.to_path_buf(),
                next_sstable_id: AtomicU64::new(next_id),
            },
            tables,
        ))
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Writes the latest version of every key, tombstones included, and
    /// returns a reader for the new file.
    pub fn flush(&self, memtable: &MemTable) -> Result<Arc<SSTableReader>> {
        if memtable.is_empty() {
            return Err(StoreError::Storage(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        // Entries come out of the BTreeMap already sorted
        let mut builder = SSTableBuilder::new(&path)?;
        for (key, entry) in memtable.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        let metadata = builder.finish()?;

        tracing::debug!(
            "flushed {} entries to {} ({} bytes)",
            metadata.entry_count,
            path.display(),
            metadata.file_size
        );

        Ok(Arc::new(SSTableReader::open(&path)?))
    }

    /// Merge `inputs` (ordered newest → oldest) into a single table
    ///
    /// The caller must pass every table older than the newest input, since
    /// tombstones are dropped from the output. The merged file takes the
    /// place of the newest input and records that it replaces every older
    /// id, so inputs that survive a crash are discarded by the next `open`.
    /// Returns `None` when nothing live remains.
    pub fn compact(&self, inputs: &[Arc<SSTableReader>]) -> Result<Option<Arc<SSTableReader>>> {
        let target = match inputs.first() {
            Some(newest) => newest.path().to_path_buf(),
            None => return Ok(None),
        };
        let target_id = Self::parse_sstable_id(&target).ok_or_else(|| {
            StoreError::Storage(format!("{} is not an sstable name", target.display()))
        })?;
        let tmp_path = target.with_extension("tmp");

        let mut merge = MergeIterator::new(inputs)?;
        let mut builder = SSTableBuilder::new(&tmp_path)?;
        builder.replace_tables_below(target_id);
        let mut dropped = 0u64;
        while let Some((key, value)) = merge.next_entry()? {
            match value {
                Some(v) => builder.add(&key, &v)?,
                None => dropped += 1,
            }
        }

        let output = if builder.entry_count() == 0 {
            drop(builder);
            fs::remove_file(&tmp_path)?;
            None
        } else {
            let metadata = builder.finish()?;
            fs::rename(&tmp_path, &target)?;
            tracing::debug!(
                "compacted {} tables into {} ({} entries, {} tombstones dropped)",
                inputs.len(),
                target.display(),
                metadata.entry_count,
                dropped
            );
            Some(Arc::new(SSTableReader::open(&target)?))
        };

        // Oldest first: until the newest input goes, its tombstones still
        // hide whatever the removed older inputs held
        let stale = if output.is_some() { &inputs[1..] } else { inputs };
        for input in stale.iter().rev() {
            fs::remove_file(input.path())?;
        }

        Ok(output)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Generate the file path for an SSTable with given ID
    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    /// Generate SSTable path given a directory and ID
    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }
}

// =============================================================================
// K-way merge over table iterators
// =============================================================================

/// Head entry of one input table
struct MergeHead {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    /// Position of the source in the input list (0 = newest)
    source: usize,
}

impl PartialEq for MergeHead {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for MergeHead {}

impl Ord for MergeHead {
    // BinaryHeap is a max-heap: smallest key first, then newest source
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for MergeHead {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Ascending merge yielding each key once, with the newest table's entry
struct MergeIterator {
    sources: Vec<SSTableIterator>,
    heap: BinaryHeap<MergeHead>,
}

impl MergeIterator {
    fn new(inputs: &[Arc<SSTableReader>]) -> Result<Self> {
        let mut merge = Self {
            sources: Vec::with_capacity(inputs.len()),
            heap: BinaryHeap::with_capacity(inputs.len()),
        };
        for (source, table) in inputs.iter().enumerate() {
            merge.sources.push(table.iter()?);
            merge.advance(source)?;
        }
        Ok(merge)
    }

    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(item) = self.sources[source].next() {
            let (key, value) = item?;
            self.heap.push(MergeHead { key, value, source });
        }
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        let head = match self.heap.pop() {
            Some(head) => head,
            None => return Ok(None),
        };
        self.advance(head.source)?;

        // Older copies of the same key are shadowed
        while self.heap.peek().map_or(false, |next| next.key == head.key) {
            if let Some(stale) = self.heap.pop() {
                self.advance(stale.source)?;
            }
        }

        Ok(Some((head.key, head.value)))
    }
}
