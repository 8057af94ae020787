//! Schema migrations
//!
//! The on-disk layout version lives under the schema-version marker as a
//! big-endian `u16`. Version 0 (no marker, records present) predates the
//! index layout in [`keys`](super::keys); moving to version 1 rebuilds every
//! index from the raw records.

use crate::engine::{Engine, WriteTxn};
use crate::error::{Result, StoreError};
use crate::event::Event;

use super::keys;

/// Layout version written by this build
pub const CURRENT_VERSION: u16 = 1;

/// Bring the store up to [`CURRENT_VERSION`] before it accepts traffic
pub fn run_migrations(engine: &Engine) -> Result<()> {
    let snapshot = engine.snapshot();
    let version = match snapshot.get(&[keys::DB_VERSION_KEY])? {
        Some(bytes) => decode_version(&bytes)?,
        None => {
            let has_records = snapshot
                .scan_prefix_rev(&[keys::RAW_PREFIX])
                .next()
                .transpose()?
                .is_some();
            if !has_records {
                // fresh store
                engine.update(|txn| {
                    write_version(txn, CURRENT_VERSION);
                    Ok(())
                })?;
                return Ok(());
            }
            0
        }
    };

    if version > CURRENT_VERSION {
        return Err(StoreError::Storage(format!(
            "store layout version {} is newer than supported version {}",
            version, CURRENT_VERSION
        )));
    }

    if version < 1 {
        tracing::info!("migrating store layout 0 -> 1: rebuilding indexes");
        let rebuilt = engine.update(|txn| {
            let rebuilt = rebuild_indexes(txn)?;
            write_version(txn, 1);
            Ok(rebuilt)
        })?;
        tracing::info!("migration to layout 1 indexed {} events", rebuilt);
    }

    Ok(())
}

/// Drop every index entry and derive it again from the raw records
///
/// Records that fail to decode are left in place without index entries.
/// Returns the number of events indexed.
pub fn rebuild_indexes(txn: &mut WriteTxn) -> Result<usize> {
    let snapshot = txn.snapshot().clone();

    for prefix in keys::INDEX_PREFIXES {
        for item in snapshot.scan_prefix_rev(&[prefix]) {
            let (key, _) = item?;
            txn.delete(key);
        }
    }

    let mut indexed = 0;
    for item in snapshot.scan_prefix_rev(&[keys::RAW_PREFIX]) {
        let (key, value) = item?;
        let serial = match keys::raw_serial(&key) {
            Some(serial) => serial,
            None => {
                tracing::warn!("skipping malformed raw key {}", hex::encode(&key));
                continue;
            }
        };
        let event: Event = match bincode::deserialize(&value) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("cannot reindex record {}: {}", serial, e);
                continue;
            }
        };
        match keys::derive_index_keys(&event, serial) {
            Ok(index_keys) => {
                for index_key in index_keys {
                    txn.put(index_key, Vec::new());
                }
                indexed += 1;
            }
            Err(e) => tracing::warn!("cannot reindex record {}: {}", serial, e),
        }
    }

    Ok(indexed)
}

fn write_version(txn: &mut WriteTxn, version: u16) {
    txn.put(vec![keys::DB_VERSION_KEY], version.to_be_bytes().to_vec());
}

fn decode_version(bytes: &[u8]) -> Result<u16> {
    let buf: [u8; 2] = bytes.try_into().map_err(|_| {
        StoreError::Storage(format!("malformed layout version of {} bytes", bytes.len()))
    })?;
    Ok(u16::from_be_bytes(buf))
}
