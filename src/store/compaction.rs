//! Deletion-driven compaction scheduling
//!
//! Deletes only write tombstones; the space is reclaimed when the engine
//! compacts. The scheduler counts deletions and starts a background
//! compaction when the configured policy says so. At most one runs at a time;
//! a trigger that arrives while one is running is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::CompactionPolicy;
use crate::engine::Engine;

pub struct CompactionScheduler {
    policy: CompactionPolicy,
    deletions: AtomicU64,
    last_run: Mutex<Instant>,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl CompactionScheduler {
    pub fn new(policy: CompactionPolicy) -> Self {
        Self {
            policy,
            deletions: AtomicU64::new(0),
            last_run: Mutex::new(Instant::now()),
            running: Mutex::new(None),
        }
    }

    /// Note one successful deletion, compacting in the background when due
    ///
    /// Returns whether a compaction was started.
    pub fn record_deletion(&self, engine: &Arc<Engine>) -> bool {
        let total = self.deletions.fetch_add(1, Ordering::AcqRel) + 1;
        let due = match self.policy {
            CompactionPolicy::Disabled => false,
            CompactionPolicy::EveryNDeletions { count } => total % count.max(1) == 0,
            CompactionPolicy::Interval { period } => {
                let mut last_run = self.last_run.lock();
                if last_run.elapsed() >= period {
                    *last_run = Instant::now();
                    true
                } else {
                    false
                }
            }
        };
        due && self.spawn(engine)
    }

    /// Total deletions seen
    pub fn deletions(&self) -> u64 {
        self.deletions.load(Ordering::Acquire)
    }

    fn spawn(&self, engine: &Arc<Engine>) -> bool {
        let mut running = self.running.lock();
        if let Some(handle) = running.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("compaction still running, skipping trigger");
                return false;
            }
        }
        if let Some(finished) = running.take() {
            let _ = finished.join();
        }

        let engine = engine.clone();
        let spawned = thread::Builder::new()
            .name("eventkv-compaction".to_string())
            .spawn(move || match engine.compact() {
                Ok(true) => tracing::debug!("background compaction finished"),
                Ok(false) => tracing::debug!("background compaction had nothing to do"),
                Err(e) => tracing::error!("background compaction failed: {}", e),
            });
        match spawned {
            Ok(handle) => {
                *running = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!("cannot start compaction thread: {}", e);
                false
            }
        }
    }

    /// Wait for a running compaction to finish
    pub fn wait(&self) {
        let handle = self.running.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("compaction thread panicked");
            }
        }
    }
}
