//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// Fixed accounting overhead per stored version (seq + tag)
const VERSION_OVERHEAD: usize = 16;

/// One version of a key
#[derive(Debug, Clone)]
struct Version {
    seq: u64,
    entry: MemTableEntry,
}

/// In-memory table for recent writes
///
/// Every write carries the sequence number of the batch that produced it.
/// Reads pass the sequence of their snapshot and only see versions at or
/// below it; `u64::MAX` reads the latest state.
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, Vec<Version>>>,
    size: AtomicUsize,
    entry_count: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            entry_count: AtomicUsize::new(0),
        }
    }

    /// Put a key-value pair written by batch `seq`, returning the new size
    pub fn put(&self, seq: u64, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.insert(seq, key, MemTableEntry::Value(value))
    }

    /// Record a tombstone written by batch `seq`, returning the new size
    pub fn delete(&self, seq: u64, key: Vec<u8>) -> usize {
        self.insert(seq, key, MemTableEntry::Tombstone)
    }

    fn insert(&self, seq: u64, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let added = key.len()
            + VERSION_OVERHEAD
            + match &entry {
                MemTableEntry::Value(v) => v.len(),
                MemTableEntry::Tombstone => 0,
            };

        let mut data = self.data.write();
        let chain = data.entry(key).or_insert_with(|| {
            self.entry_count.fetch_add(1, Ordering::Relaxed);
            Vec::new()
        });
        chain.push(Version { seq, entry });

        self.size.fetch_add(added, Ordering::Relaxed) + added
    }

    /// Get the newest version of `key` visible at `seq`
    pub fn get(&self, key: &[u8], seq: u64) -> Option<MemTableEntry> {
        let data = self.data.read();
        data.get(key).and_then(|chain| visible(chain, seq)).cloned()
    }

    /// Greatest key in `[lower, upper)` (per the given upper bound) that has a
    /// version visible at `seq`
    pub fn entry_before(
        &self,
        lower: &[u8],
        upper: Bound<&[u8]>,
        seq: u64,
    ) -> Option<(Vec<u8>, MemTableEntry)> {
        if let Bound::Included(u) | Bound::Excluded(u) = upper {
            if u < lower {
                return None;
            }
        }
        let data = self.data.read();
        data.range::<[u8], _>((Bound::Included(lower), upper))
            .rev()
            .find_map(|(key, chain)| visible(chain, seq).map(|e| (key.clone(), e.clone())))
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get the number of distinct keys
    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    /// Check if the memtable holds no entries
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Latest version of every key in sorted key order (for flush)
    pub fn iter(&self) -> MemTableIterator {
        let data = self.data.read();
        let entries: Vec<_> = data
            .iter()
            .filter_map(|(key, chain)| chain.last().map(|v| (key.clone(), v.entry.clone())))
            .collect();
        MemTableIterator {
            inner: entries.into_iter(),
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest version with `seq <= snapshot`; chains are appended in sequence order
fn visible(chain: &[Version], snapshot: u64) -> Option<&MemTableEntry> {
    chain
        .iter()
        .rev()
        .find(|v| v.seq <= snapshot)
        .map(|v| &v.entry)
}

/// Iterator over MemTable entries
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, MemTableEntry)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, MemTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
