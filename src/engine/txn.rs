//! Write transactions
//!
//! A transaction reads through a snapshot taken when it starts and buffers
//! its writes. The engine commits the buffer as one WAL entry, so either
//! every write of the transaction survives a crash or none does.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::wal::Operation;

use super::snapshot::{ReverseScan, Snapshot};

/// Pending writes plus a read view, handed to [`Engine::update`](super::Engine::update)
pub struct WriteTxn {
    snapshot: Snapshot,
    batch: Vec<Operation>,
    /// Latest pending write per key (`None` = delete) for read-your-writes
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteTxn {
    pub(crate) fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            batch: Vec::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Get a value, including writes made earlier in this transaction
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => self.snapshot.get(key),
        }
    }

    /// Descending scan over committed keys with `prefix`
    ///
    /// Pending writes of this transaction are not visible to scans.
    pub fn scan_prefix_rev(&self, prefix: &[u8]) -> ReverseScan {
        self.snapshot.scan_prefix_rev(prefix)
    }

    /// Highest committed key starting with `prefix`, if any
    pub fn seek_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.snapshot.scan_prefix_rev(prefix).next() {
            Some(Ok((key, _))) => Ok(Some(key)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Queue a put
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending.insert(key.clone(), Some(value.clone()));
        self.batch.push(Operation::Put { key, value });
    }

    /// Queue a delete
    pub fn delete(&mut self, key: Vec<u8>) {
        self.pending.insert(key.clone(), None);
        self.batch.push(Operation::Delete { key });
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// The snapshot this transaction reads from
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub(crate) fn into_batch(self) -> Vec<Operation> {
        self.batch
    }
}
