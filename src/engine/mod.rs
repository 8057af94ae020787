//! Engine Module
//!
//! The sorted key-value engine the event store is built on.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Atomic multi-key write transactions
//! - Consistent snapshots for readers
//! - Trigger flushes when MemTable is full
//! - Compaction to reclaim space held by deleted keys
//! - Crash recovery on startup

mod snapshot;
mod txn;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::memtable::MemTable;
use crate::storage::{SSTableReader, StorageManager};
use crate::wal::{Operation, WalRecovery, WalWriter};

pub use snapshot::{ReverseScan, Snapshot};
pub use txn::WriteTxn;

/// The tables a reader sees: the active memtable plus on-disk tables,
/// newest first. Replaced wholesale on flush and compaction.
struct Version {
    memtable: Arc<MemTable>,
    tables: Arc<Vec<Arc<SSTableReader>>>,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (update/put/delete/flush): Serialized by `write_lock`
///   - Only ONE write batch at a time
///   - Order: write_lock → WAL → memtable → publish sequence
///
/// - **Reads** go through a [`Snapshot`]
///   - Taken under a short read lock on the current version
///   - Memtable versions newer than the snapshot sequence are skipped
///   - Never blocked by writers or flushes
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory for all data files (SSTables)
    storage_dir: PathBuf,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Current memtable and table list
    version: RwLock<Version>,

    /// SSTable file manager
    storage: StorageManager,

    /// Sequence of the last batch visible to new snapshots
    last_seq: AtomicU64,

    /// Serializes write operations (update/put/delete/flush)
    write_lock: Mutex<()>,

    /// Set while a compaction is running
    compacting: AtomicBool,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load existing SSTables
    /// 3. Replay the WAL, flush what it held, then truncate it
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        if config.memtable_size_limit == 0 {
            return Err(StoreError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        fs::create_dir_all(&config.data_dir)?;

        // Paths are derived from data_dir, not configurable
        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let (storage, mut tables) = StorageManager::open(&storage_dir)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;
            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }

            for entry in entries {
                for op in entry.batch {
                    match op {
                        Operation::Put { key, value } => {
                            memtable.put(entry.lsn, key, value);
                        }
                        Operation::Delete { key } => {
                            memtable.delete(entry.lsn, key);
                        }
                    }
                }
            }
        }

        // Recovered writes become durable in a table before the log is cut
        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        if !memtable.is_empty() {
            tracing::info!("flushing {} recovered keys", memtable.entry_count());
            tables.insert(0, storage.flush(&memtable)?);
        }
        wal.truncate()?;

        let last_seq = wal.current_lsn().saturating_sub(1);

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            version: RwLock::new(Version {
                memtable: Arc::new(MemTable::new()),
                tables: Arc::new(tables),
            }),
            storage,
            last_seq: AtomicU64::new(last_seq),
            write_lock: Mutex::new(()),
            compacting: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Take a consistent read view of everything committed so far
    pub fn snapshot(&self) -> Snapshot {
        let version = self.version.read();
        let seq = self.last_seq.load(Ordering::Acquire);
        Snapshot::new(version.memtable.clone(), version.tables.clone(), seq)
    }

    /// Get a value by key from the latest committed state
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.snapshot().get(key)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Run `f` as a single atomic write transaction
    ///
    /// The queued writes are committed only if `f` returns `Ok`; an error
    /// discards them. Transactions are serialized with every other write.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteTxn) -> Result<T>,
    {
        let _write_guard = self.lock_writes()?;

        let mut txn = WriteTxn::new(self.snapshot());
        let out = f(&mut txn)?;
        if !txn.is_empty() {
            self.apply_batch(txn.into_batch())?;
        }
        Ok(out)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _write_guard = self.lock_writes()?;
        self.apply_batch(vec![Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let _write_guard = self.lock_writes()?;
        self.apply_batch(vec![Operation::Delete { key: key.to_vec() }])
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.lock_writes()?;
        self.flush_locked()
    }

    /// Apply a batch (called with write lock held)
    ///
    /// Steps:
    /// 1. Append the whole batch to the WAL as one entry
    /// 2. Write every operation to the memtable under the entry's LSN
    /// 3. Publish the LSN to new snapshots
    /// 4. Flush if the memtable is full
    fn apply_batch(&self, batch: Vec<Operation>) -> Result<()> {
        let seq = self.lock_wal()?.append(&batch)?;

        let memtable = self.version.read().memtable.clone();
        let mut size = memtable.size();
        for op in batch {
            size = match op {
                Operation::Put { key, value } => memtable.put(seq, key, value),
                Operation::Delete { key } => memtable.delete(seq, key),
            };
        }

        self.last_seq.store(seq, Ordering::Release);

        if size >= self.config.memtable_size_limit {
            self.flush_locked()?;
        }
        Ok(())
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_locked(&self) -> Result<()> {
        let memtable = self.version.read().memtable.clone();
        if memtable.is_empty() {
            return Ok(());
        }

        // Step 1: Write the memtable out as a new table
        let table = self.storage.flush(&memtable)?;

        // Step 2: Publish the table and a fresh memtable together
        {
            let mut version = self.version.write();
            let mut tables = Vec::with_capacity(version.tables.len() + 1);
            tables.push(table);
            tables.extend(version.tables.iter().cloned());
            version.tables = Arc::new(tables);
            version.memtable = Arc::new(MemTable::new());
        }

        // Step 3: Truncate WAL (entries are now durable in SSTable)
        self.lock_wal()?.truncate()?;

        Ok(())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Merge every table into one, dropping deleted and overwritten keys
    ///
    /// Returns `false` when another compaction was already running or there
    /// was nothing to reclaim. Readers holding older snapshots keep working.
    pub fn compact(&self) -> Result<bool> {
        if self.compacting.swap(true, Ordering::AcqRel) {
            tracing::debug!("compaction already running, skipping");
            return Ok(false);
        }
        let result = self.compact_inner();
        self.compacting.store(false, Ordering::Release);
        result
    }

    fn compact_inner(&self) -> Result<bool> {
        self.flush()?;

        let inputs = self.version.read().tables.clone();
        let tombstones: u64 = inputs.iter().map(|t| t.tombstone_count()).sum();
        if inputs.len() < 2 && tombstones == 0 {
            return Ok(false);
        }

        let output = self.storage.compact(&inputs)?;

        let mut version = self.version.write();
        let mut tables: Vec<Arc<SSTableReader>> = version
            .tables
            .iter()
            .filter(|t| !inputs.iter().any(|input| Arc::ptr_eq(t, input)))
            .cloned()
            .collect();
        tables.extend(output);
        tracing::info!(
            "compaction merged {} tables ({} tombstones), {} tables remain",
            inputs.len(),
            tombstones,
            tables.len()
        );
        version.tables = Arc::new(tables);

        Ok(true)
    }

    /// Whether a compaction is running right now
    pub fn is_compacting(&self) -> bool {
        self.compacting.load(Ordering::Acquire)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        self.lock_wal()?.sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.version.read().memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.version.read().memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.version.read().tables.len()
    }

    /// Sequence of the last committed batch
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("Write lock poisoned: {}", e)))
    }

    fn lock_wal(&self) -> Result<MutexGuard<'_, WalWriter>> {
        self.wal
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("WAL lock poisoned: {}", e)))
    }
}
