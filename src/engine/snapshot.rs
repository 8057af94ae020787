//! Read snapshots
//!
//! A snapshot pins one memtable, one list of tables and the last committed
//! write sequence. Writes committed afterwards are invisible to it, and
//! flushes or compactions never disturb it because it holds its own `Arc`s.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::{IndexEntry, SSTableReader};

/// Consistent read-only view of the engine
#[derive(Clone)]
pub struct Snapshot {
    memtable: Arc<MemTable>,
    tables: Arc<Vec<Arc<SSTableReader>>>,
    seq: u64,
}

impl Snapshot {
    pub(crate) fn new(
        memtable: Arc<MemTable>,
        tables: Arc<Vec<Arc<SSTableReader>>>,
        seq: u64,
    ) -> Self {
        Self {
            memtable,
            tables,
            seq,
        }
    }

    /// Sequence number of the last write this snapshot can see
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (versions at or below the snapshot sequence)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key, self.seq) {
            return match entry {
                MemTableEntry::Value(value) => Ok(Some(value)),
                MemTableEntry::Tombstone => Ok(None),
            };
        }

        for table in self.tables.iter() {
            if !table.might_contain(key) {
                continue;
            }
            match table.get(key) {
                Ok(found) => return Ok(found),
                Err(StoreError::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Iterate live keys starting with `prefix`, in descending key order
    pub fn scan_prefix_rev(&self, prefix: &[u8]) -> ReverseScan {
        let upper = match prefix_successor(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        self.scan_rev(prefix, upper)
    }

    /// Iterate live keys starting with `prefix` that are `<= start`,
    /// in descending key order
    pub fn scan_rev_from(&self, prefix: &[u8], start: &[u8]) -> ReverseScan {
        self.scan_rev(prefix, Bound::Included(start.to_vec()))
    }

    /// Iterate live keys in `[prefix, upper)` in descending key order
    ///
    /// Keys that do not start with `prefix` are never returned, whatever the
    /// upper bound.
    pub fn scan_rev(&self, prefix: &[u8], upper: Bound<Vec<u8>>) -> ReverseScan {
        let upper = match (prefix_successor(prefix), upper) {
            (Some(end), Bound::Unbounded) => Bound::Excluded(end),
            (Some(end), Bound::Included(k)) | (Some(end), Bound::Excluded(k)) if k >= end => {
                Bound::Excluded(end)
            }
            (_, upper) => upper,
        };

        let mut sources = Vec::with_capacity(self.tables.len() + 1);
        sources.push(Cursor::new(Source::Memtable, upper.clone()));
        for index in 0..self.tables.len() {
            sources.push(Cursor::new(Source::Table(index), upper.clone()));
        }

        ReverseScan {
            snapshot: self.clone(),
            prefix: prefix.to_vec(),
            sources,
            done: false,
        }
    }

    /// Number of tables in this view
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Smallest key greater than every key that starts with `prefix`
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

// =============================================================================
// Reverse merge scan
// =============================================================================

#[derive(Clone, Copy)]
enum Source {
    Memtable,
    Table(usize),
}

enum Head {
    Mem(MemTableEntry),
    Table(IndexEntry),
}

/// Per-source position: the next key to report lies strictly below `upper`
/// (or at it, for the initial inclusive bound)
struct Cursor {
    source: Source,
    upper: Bound<Vec<u8>>,
    head: Option<(Vec<u8>, Head)>,
    exhausted: bool,
}

impl Cursor {
    fn new(source: Source, upper: Bound<Vec<u8>>) -> Self {
        Self {
            source,
            upper,
            head: None,
            exhausted: false,
        }
    }
}

/// Descending iterator over live `(key, value)` pairs of a snapshot
///
/// Sources are merged by key; for equal keys the memtable wins, then the
/// newest table. Tombstones hide older values and are not reported. Table
/// values are read lazily, only for keys that survive the merge.
pub struct ReverseScan {
    snapshot: Snapshot,
    prefix: Vec<u8>,
    sources: Vec<Cursor>,
    done: bool,
}

impl ReverseScan {
    fn fill(&mut self) {
        let snapshot = &self.snapshot;
        let prefix = self.prefix.as_slice();
        for cursor in self.sources.iter_mut() {
            if cursor.head.is_some() || cursor.exhausted {
                continue;
            }
            let upper = match &cursor.upper {
                Bound::Included(k) => Bound::Included(k.as_slice()),
                Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
                Bound::Unbounded => Bound::Unbounded,
            };
            let found = match cursor.source {
                Source::Memtable => snapshot
                    .memtable
                    .entry_before(prefix, upper, snapshot.seq)
                    .map(|(k, e)| (k, Head::Mem(e))),
                Source::Table(index) => snapshot.tables[index]
                    .entry_before(prefix, upper)
                    .map(|(k, e)| (k, Head::Table(e))),
            };
            match found {
                Some(head) => cursor.head = Some(head),
                None => cursor.exhausted = true,
            }
        }
    }

    /// Pick the winning entry among the current heads and move every
    /// source holding that key past it
    fn step(&mut self) -> Option<(Vec<u8>, Source, Head)> {
        self.fill();

        let mut winner: Option<usize> = None;
        for (i, cursor) in self.sources.iter().enumerate() {
            if let Some((key, _)) = &cursor.head {
                let better = match winner {
                    None => true,
                    Some(w) => match &self.sources[w].head {
                        Some((best, _)) => key > best,
                        None => true,
                    },
                };
                if better {
                    winner = Some(i);
                }
            }
        }

        let w = winner?;
        let (key, head) = self.sources[w].head.take()?;
        let source = self.sources[w].source;
        self.sources[w].upper = Bound::Excluded(key.clone());

        for cursor in self.sources.iter_mut() {
            let same = matches!(&cursor.head, Some((k, _)) if *k == key);
            if same {
                cursor.head = None;
                cursor.upper = Bound::Excluded(key.clone());
            }
        }

        Some((key, source, head))
    }
}

impl Iterator for ReverseScan {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let (key, source, head) = match self.step() {
                Some(item) => item,
                None => {
                    self.done = true;
                    return None;
                }
            };

            match (source, head) {
                (_, Head::Mem(MemTableEntry::Value(value))) => return Some(Ok((key, value))),
                (_, Head::Mem(MemTableEntry::Tombstone)) => continue,
                (_, Head::Table(entry)) if entry.is_tombstone() => continue,
                (Source::Table(index), Head::Table(entry)) => {
                    return match self.snapshot.tables[index].read_value(key.len(), &entry) {
                        Ok(value) => Some(Ok((key, value))),
                        Err(e) => {
                            self.done = true;
                            Some(Err(e))
                        }
                    };
                }
                (Source::Memtable, Head::Table(_)) => continue,
            }
        }
    }
}
