//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, StoreError};

use super::{Operation, WalEntry, WalReader};

/// Writes entries to the WAL file
pub struct WalWriter {
    /// Path of the log (for diagnostics)
    path: PathBuf,

    /// Append handle
    file: File,

    /// LSN the next append will receive
    current_lsn: u64,

    /// How often to fsync
    sync_strategy: WalSyncStrategy,

    /// Entries written since the last fsync
    uncommitted: usize,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing log is scanned so LSNs continue after the last valid entry;
    /// anything after that entry is cut off so new appends stay readable.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut last_lsn = 0;
        let mut valid_len = 0;
        if path.exists() {
            let mut reader = WalReader::open(path)?;
            while let Ok(Some(entry)) = reader.next_entry() {
                last_lsn = entry.lsn;
            }
            valid_len = reader.position();
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        if file.metadata()?.len() > valid_len {
            tracing::warn!(
                "discarding unreadable WAL tail of {} after lsn {}",
                path.display(),
                last_lsn
            );
            file.set_len(valid_len)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            current_lsn: last_lsn + 1,
            sync_strategy,
            uncommitted: 0,
        })
    }

    /// Append one write batch as a single entry, returning its LSN
    pub fn append(&mut self, batch: &[Operation]) -> Result<u64> {
        let lsn = self.current_lsn;
        let entry = WalEntry::new(lsn, batch.to_vec());
        let bytes = entry.serialize()?;

        self.file.write_all(&bytes).map_err(|e| {
            StoreError::WalWrite(format!("append to {} failed: {}", self.path.display(), e))
        })?;
        self.current_lsn += 1;
        self.uncommitted += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count.max(1),
        };
        if should_sync {
            self.sync()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Discard every entry (their effects are durable elsewhere)
    ///
    /// LSNs keep increasing across truncations.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Get the LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Entries appended since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }
}
