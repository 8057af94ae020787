//! Event Store Module
//!
//! Persists events on top of the key-value engine and answers filter queries.
//!
//! ## Responsibilities
//! - Raw record store: serial → bincode-encoded event
//! - Index maintenance: every derived index key written and removed in the
//!   same transaction as its raw record
//! - Query planning, concurrent scans and newest-first merging
//! - Save / delete / count
//! - Sequence allocation, schema migrations, compaction scheduling
//!
//! ## Write path
//! ```text
//! save_event ──▶ Engine::update ─┬─ probe by-id (Duplicate?)
//!                                ├─ allocate serial (+ sequence marker)
//!                                ├─ put raw record
//!                                └─ put derived index keys (empty values)
//! ```
//!
//! ## Read path
//! ```text
//! query_events ──▶ plan ──▶ snapshot ──▶ EventStream (scan threads + merge)
//! count_events ──▶ plan ──▶ snapshot ──▶ sequential scans
//! ```

pub mod keys;
pub mod planner;

mod compaction;
mod merge;
mod migrate;
mod sequence;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::engine::{Engine, Snapshot};
use crate::error::{Result, StoreError};
use crate::event::{Event, Filter};

pub use compaction::CompactionScheduler;
pub use merge::{CancelToken, EventStream};
pub use migrate::CURRENT_VERSION;
pub use planner::{effective_limit, plan, QueryPlan, ScanDescriptor};
pub use sequence::SequenceAllocator;

use merge::{load_event, scan_index};

/// Default cap on query results when the configured one is zero
const DEFAULT_MAX_LIMIT: usize = 500;

/// Everything that lives between `open` and `close`
struct Inner {
    engine: Arc<Engine>,
    sequence: SequenceAllocator,
    compaction: CompactionScheduler,
}

/// Embedded event store
///
/// All methods take `&self`; the store can be shared across threads behind
/// an `Arc`. After [`close`](EventStore::close) every operation fails with
/// [`StoreError::Closed`].
pub struct EventStore {
    config: Config,
    inner: RwLock<Option<Arc<Inner>>>,
}

impl EventStore {
    /// Open the store at `config.data_dir`
    ///
    /// Recovers the engine, applies pending layout migrations and restores
    /// the serial allocator before returning.
    pub fn open(mut config: Config) -> Result<Self> {
        if config.max_limit == 0 {
            config.max_limit = DEFAULT_MAX_LIMIT;
        }

        let engine = Arc::new(Engine::open(config.clone())?);
        migrate::run_migrations(&engine)?;
        let sequence = SequenceAllocator::load(&engine)?;

        tracing::info!(
            "event store open at {} (next serial {})",
            config.data_dir.display(),
            sequence.peek()
        );

        Ok(Self {
            inner: RwLock::new(Some(Arc::new(Inner {
                engine,
                sequence,
                compaction: CompactionScheduler::new(config.compaction),
            }))),
            config,
        })
    }

    /// Flush and release the store; a second call fails with `Closed`
    pub fn close(&self) -> Result<()> {
        let inner = self.inner.write().take().ok_or(StoreError::Closed)?;
        inner.compaction.wait();
        inner.engine.close()?;
        tracing::info!("event store at {} closed", self.config.data_dir.display());
        Ok(())
    }

    fn inner(&self) -> Result<Arc<Inner>> {
        self.inner.read().clone().ok_or(StoreError::Closed)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Persist and index `event`
    ///
    /// Fails with [`StoreError::Duplicate`] if an event with the same id is
    /// already stored; nothing is written in that case.
    pub fn save_event(&self, event: &Event) -> Result<()> {
        validate_event(event)?;
        let inner = self.inner()?;

        let raw = bincode::serialize(event).map_err(|e| StoreError::Serialization(e.to_string()))?;

        inner.engine.update(|txn| {
            if find_by_id(txn.snapshot(), &event.id, None)?.is_some() {
                return Err(StoreError::Duplicate);
            }

            let serial = inner.sequence.allocate(txn)?;
            let index_keys = keys::derive_index_keys(event, serial)?;
            txn.put(keys::raw_key(serial), raw);
            for key in index_keys {
                txn.put(key, Vec::new());
            }
            Ok(())
        })
    }

    /// Remove `event` and every index entry derived from it
    ///
    /// Deleting an event that is not stored is a no-op. Returns whether
    /// anything was removed.
    pub fn delete_event(&self, event: &Event) -> Result<bool> {
        self.delete_inner(&event.id, Some(event))
    }

    /// Remove the event with hex id `id`, if stored
    pub fn delete_by_id(&self, id: &str) -> Result<bool> {
        self.delete_inner(id, None)
    }

    fn delete_inner(&self, id: &str, event: Option<&Event>) -> Result<bool> {
        keys::hex_selector(id).map_err(|e| StoreError::InvalidEvent(e.to_string()))?;
        let inner = self.inner()?;

        let removed = inner.engine.update(|txn| {
            let found = match find_by_id(txn.snapshot(), id, event)? {
                Some(found) => found,
                None => return Ok(false),
            };

            match &found.event {
                Some(stored) => {
                    for key in keys::derive_index_keys(stored, found.serial)? {
                        txn.delete(key);
                    }
                }
                None => {
                    tracing::warn!(
                        "record {} does not decode, sweeping the indexes for it",
                        found.serial
                    );
                    for key in index_keys_for_serial(txn.snapshot(), found.serial)? {
                        txn.delete(key);
                    }
                }
            }
            txn.delete(keys::raw_key(found.serial));
            Ok(true)
        })?;

        if removed {
            inner.compaction.record_deletion(&inner.engine);
        }
        Ok(removed)
    }

    /// Rebuild every index from the raw records in one atomic write
    ///
    /// Returns the number of events indexed.
    pub fn reindex(&self) -> Result<usize> {
        let inner = self.inner()?;
        let indexed = inner.engine.update(migrate::rebuild_indexes)?;
        tracing::info!("reindexed {} events", indexed);
        Ok(indexed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Stream the events matching `filter`, newest first
    ///
    /// Invalid filters are rejected before any scan starts. The stream reads
    /// from a snapshot taken now and yields at most
    /// [`effective_limit`]`(filter.limit, max_limit)` events.
    pub fn query_events(&self, filter: &Filter) -> Result<EventStream> {
        let plan = planner::plan(filter)?;
        let inner = self.inner()?;
        let limit = effective_limit(filter.limit, self.config.max_limit);
        EventStream::start(
            inner.engine.snapshot(),
            plan,
            limit,
            self.config.scan_channel_depth,
        )
    }

    /// Number of stored events matching `filter` (the limit is ignored)
    ///
    /// Index hits are counted without decoding unless the plan has residual
    /// constraints. Storage errors fail the whole count.
    pub fn count_events(&self, filter: &Filter) -> Result<i64> {
        let plan = planner::plan(filter)?;
        let inner = self.inner()?;
        let snapshot = inner.engine.snapshot();
        let never = CancelToken::new();

        let dedupe = plan.scans.len() > 1;
        let mut seen = HashSet::new();
        let mut count: i64 = 0;

        for scan in &plan.scans {
            scan_index(&snapshot, scan, plan.since, &never, |serial| {
                if dedupe && !seen.insert(serial) {
                    return Ok(true);
                }
                match &plan.residual {
                    None => count += 1,
                    Some(residual) => {
                        if let Some(event) = load_event(&snapshot, serial)? {
                            if residual.matches(&event) {
                                count += 1;
                            }
                        }
                    }
                }
                Ok(true)
            })?;
        }

        Ok(count)
    }

    /// Serial of the stored event with hex id `id`
    pub fn lookup_serial(&self, id: &str) -> Result<Option<u32>> {
        keys::hex_selector(id)?;
        let inner = self.inner()?;
        Ok(find_by_id(&inner.engine.snapshot(), id, None)?.map(|found| found.serial))
    }

    /// Consistent read view of the underlying keys
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.inner()?.engine.snapshot())
    }

    /// The underlying engine
    pub fn engine(&self) -> Result<Arc<Engine>> {
        Ok(self.inner()?.engine.clone())
    }

    /// Wait for a background compaction started by deletions, if any
    pub fn wait_for_compaction(&self) -> Result<()> {
        self.inner()?.compaction.wait();
        Ok(())
    }

    /// Deletions recorded since open
    pub fn deletion_count(&self) -> Result<u64> {
        Ok(self.inner()?.compaction.deletions())
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            tracing::error!("closing event store on drop failed: {}", e);
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_event(event: &Event) -> Result<()> {
    keys::hex_selector(&event.id)
        .and_then(|_| keys::hex_selector(&event.pubkey))
        .map(|_| ())
        .map_err(|e| StoreError::InvalidEvent(e.to_string()))
}

/// Result of resolving an id through the by-id index
struct Found {
    serial: u32,
    /// Decoded record, `None` if it does not decode
    event: Option<Event>,
}

/// Resolve a full hex id to its serial
///
/// By-id keys hold only an 8-byte id prefix, so every candidate's record is
/// checked against the full id. A candidate whose record cannot be read is
/// accepted only for a `claimed` event whose every derived index key points
/// at that serial.
fn find_by_id(snapshot: &Snapshot, id: &str, claimed: Option<&Event>) -> Result<Option<Found>> {
    let prefix = keys::id_prefix(id)?;
    let mut unreadable = None;

    for item in snapshot.scan_prefix_rev(&prefix) {
        let (id_key, _) = item?;
        let serial = match keys::index_serial(&id_key) {
            Some(serial) if id_key.len() == prefix.len() + 4 => serial,
            _ => continue,
        };
        match load_event(snapshot, serial)? {
            Some(event) if event.id.eq_ignore_ascii_case(id) => {
                return Ok(Some(Found {
                    serial,
                    event: Some(event),
                }));
            }
            Some(_) => {}
            None => {
                if unreadable.is_some() {
                    continue;
                }
                if let Some(claimed) = claimed {
                    if indexed_under(snapshot, claimed, serial)? {
                        unreadable = Some(Found {
                            serial,
                            event: None,
                        });
                    }
                }
            }
        }
    }

    Ok(unreadable)
}

/// Whether every index key `event` derives for `serial` is present
fn indexed_under(snapshot: &Snapshot, event: &Event, serial: u32) -> Result<bool> {
    for key in keys::derive_index_keys(event, serial)? {
        if snapshot.get(&key)?.is_none() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Every index key, in any family, that points at `serial`
fn index_keys_for_serial(snapshot: &Snapshot, serial: u32) -> Result<Vec<Vec<u8>>> {
    let mut found = Vec::new();
    for prefix in keys::INDEX_PREFIXES {
        for item in snapshot.scan_prefix_rev(&[prefix]) {
            let (key, _) = item?;
            if keys::index_serial(&key) == Some(serial) {
                found.push(key);
            }
        }
    }
    Ok(found)
}
