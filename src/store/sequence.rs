//! Raw record serial allocator
//!
//! Serials are handed out from an atomic counter. The next free value is
//! written under the sequence marker in the same transaction as every save,
//! so a restart continues where the last committed save left off and a
//! serial is never reused.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::{Engine, WriteTxn};
use crate::error::{Result, StoreError};

use super::keys;

/// Monotonic allocator of raw record serials
pub struct SequenceAllocator {
    /// Next serial to hand out; `u32::MAX + 1` once exhausted
    next: AtomicU64,
}

impl SequenceAllocator {
    /// Restore the allocator from the persisted marker
    ///
    /// Without a marker the highest raw record serial plus one is used.
    pub fn load(engine: &Engine) -> Result<Self> {
        let snapshot = engine.snapshot();
        let next = match snapshot.get(&[keys::SEQUENCE_KEY])? {
            Some(bytes) => decode_marker(&bytes)?,
            None => match snapshot.scan_prefix_rev(&[keys::RAW_PREFIX]).next() {
                Some(item) => {
                    let (key, _) = item?;
                    let serial = keys::raw_serial(&key).ok_or_else(|| {
                        StoreError::Storage(format!("malformed raw key {}", hex::encode(&key)))
                    })?;
                    serial as u64 + 1
                }
                None => 0,
            },
        };
        tracing::debug!("sequence allocator starts at {}", next);
        Ok(Self {
            next: AtomicU64::new(next),
        })
    }

    /// Take the next serial and persist the new high-water mark in `txn`
    ///
    /// Allocation happens under the engine's write lock, so serials are
    /// assigned in commit order. A transaction that aborts after allocating
    /// leaves a gap, never a reuse.
    pub fn allocate(&self, txn: &mut WriteTxn) -> Result<u32> {
        let serial = self.next.fetch_add(1, Ordering::SeqCst);
        if serial > u32::MAX as u64 {
            self.next.store(u32::MAX as u64 + 1, Ordering::SeqCst);
            return Err(StoreError::Storage("event serials exhausted".to_string()));
        }
        txn.put(vec![keys::SEQUENCE_KEY], (serial + 1).to_be_bytes().to_vec());
        Ok(serial as u32)
    }

    /// Serial the next save will receive
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

fn decode_marker(bytes: &[u8]) -> Result<u64> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Storage(format!("malformed sequence marker of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(buf))
}
