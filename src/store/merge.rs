//! Merge engine
//!
//! Each scan of a plan runs on its own thread against the shared snapshot
//! and pushes raw-record serials into a bounded channel. The consumer side
//! fetches and decodes records, applies the residual filter and merges the
//! streams newest-first with a binary heap.
//!
//! ```text
//!   scan 0 ──▶ [chan] ──▶ reader 0 ─┐
//!   scan 1 ──▶ [chan] ──▶ reader 1 ─┼─▶ heap ──▶ EventStream::next()
//!   scan n ──▶ [chan] ──▶ reader n ─┘
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver};

use crate::engine::Snapshot;
use crate::error::{Result, StoreError};
use crate::event::{Event, Filter};

use super::keys;
use super::planner::{QueryPlan, ScanDescriptor};

/// Shared flag telling scan threads to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Walk one index scan, handing each serial to `sink`
///
/// Stops at the first key older than `since`, when `sink` returns
/// `Ok(false)`, or when `cancel` is set.
pub(crate) fn scan_index<F>(
    snapshot: &Snapshot,
    scan: &ScanDescriptor,
    since: u32,
    cancel: &CancelToken,
    mut sink: F,
) -> Result<()>
where
    F: FnMut(u32) -> Result<bool>,
{
    let expected_len = scan.start.len();
    for item in snapshot.scan_rev_from(&scan.prefix, &scan.start) {
        if cancel.is_cancelled() {
            break;
        }
        let (key, _) = item?;
        if key.len() != expected_len {
            tracing::warn!("skipping malformed index key {}", hex::encode(&key));
            continue;
        }
        if !scan.skip_timestamp() {
            match keys::index_created_at(&key) {
                Some(created_at) if created_at < since => break,
                Some(_) => {}
                None => continue,
            }
        }
        let serial = match keys::index_serial(&key) {
            Some(serial) => serial,
            None => continue,
        };
        if !sink(serial)? {
            break;
        }
    }
    Ok(())
}

/// Load and decode the raw record at `serial`
///
/// Missing and undecodable records are logged and reported as `None`;
/// storage failures are errors.
pub(crate) fn load_event(snapshot: &Snapshot, serial: u32) -> Result<Option<Event>> {
    let bytes = match snapshot.get(&keys::raw_key(serial))? {
        Some(bytes) => bytes,
        None => {
            tracing::warn!("index entry points at missing record {}", serial);
            return Ok(None);
        }
    };
    match bincode::deserialize::<Event>(&bytes) {
        Ok(event) => Ok(Some(event)),
        Err(e) => {
            tracing::warn!("skipping undecodable record {}: {}", serial, e);
            Ok(None)
        }
    }
}

// =============================================================================
// Consumer side
// =============================================================================

/// Receiving end of one scan
struct StreamReader {
    rx: Receiver<Result<u32>>,
    finished: bool,
}

/// Event waiting in the merge heap
struct Candidate {
    event: Event,
    serial: u32,
    stream: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    // Newest first; on equal timestamps the lower stream index wins
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.event
            .created_at
            .cmp(&other.event.created_at)
            .then_with(|| other.stream.cmp(&self.stream))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Lazy, newest-first sequence of query results
///
/// Not restartable: running the query again takes a fresh snapshot.
/// Dropping the stream early cancels and joins every scan thread.
pub struct EventStream {
    snapshot: Snapshot,
    residual: Option<Filter>,
    readers: Vec<StreamReader>,
    heap: BinaryHeap<Candidate>,
    seeded: bool,
    limit: usize,
    emitted: usize,
    seen: HashSet<u32>,
    errors: Vec<StoreError>,
    cancel: CancelToken,
    handles: Vec<JoinHandle<()>>,
}

impl EventStream {
    /// Start one scan thread per descriptor of `plan`
    pub(crate) fn start(
        snapshot: Snapshot,
        plan: QueryPlan,
        limit: usize,
        channel_depth: usize,
    ) -> Result<Self> {
        let cancel = CancelToken::new();
        let mut stream = Self {
            snapshot: snapshot.clone(),
            residual: plan.residual,
            readers: Vec::with_capacity(plan.scans.len()),
            heap: BinaryHeap::with_capacity(plan.scans.len()),
            seeded: false,
            limit,
            emitted: 0,
            seen: HashSet::new(),
            errors: Vec::new(),
            cancel: cancel.clone(),
            handles: Vec::with_capacity(plan.scans.len()),
        };
        if limit == 0 {
            return Ok(stream);
        }

        let since = plan.since;
        for (i, scan) in plan.scans.into_iter().enumerate() {
            let (tx, rx) = bounded::<Result<u32>>(channel_depth.max(1));
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();

            // On spawn failure `stream` is dropped, which cancels and joins
            // the threads already started
            let handle = thread::Builder::new()
                .name(format!("eventkv-scan-{}", i))
                .spawn(move || {
                    let result = scan_index(&snapshot, &scan, since, &cancel, |serial| {
                        if cancel.is_cancelled() {
                            return Ok(false);
                        }
                        Ok(tx.send(Ok(serial)).is_ok())
                    });
                    if let Err(e) = result {
                        if !cancel.is_cancelled() {
                            let _ = tx.send(Err(e));
                        }
                    }
                })?;

            stream.readers.push(StreamReader {
                rx,
                finished: false,
            });
            stream.handles.push(handle);
        }

        Ok(stream)
    }

    /// Storage errors that ended individual scans early
    ///
    /// Results from the remaining scans are still merged and emitted.
    pub fn errors(&self) -> &[StoreError] {
        &self.errors
    }

    /// Pull the next matching event of stream `index` into the heap
    fn refill(&mut self, index: usize) {
        loop {
            let reader = &mut self.readers[index];
            if reader.finished {
                return;
            }
            let serial = match reader.rx.recv() {
                Ok(Ok(serial)) => serial,
                Ok(Err(e)) => {
                    tracing::warn!("scan {} failed: {}", index, e);
                    reader.finished = true;
                    self.errors.push(e);
                    return;
                }
                Err(_) => {
                    reader.finished = true;
                    return;
                }
            };

            match load_event(&self.snapshot, serial) {
                Ok(Some(event)) => {
                    let keep = self.residual.as_ref().map_or(true, |f| f.matches(&event));
                    if keep {
                        self.heap.push(Candidate {
                            event,
                            serial,
                            stream: index,
                        });
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("scan {} failed reading record {}: {}", index, serial, e);
                    self.readers[index].finished = true;
                    self.errors.push(e);
                    return;
                }
            }
        }
    }

    /// Cancel producers, release the channels and join the threads
    fn shutdown(&mut self) {
        self.cancel.cancel();
        self.readers.clear();
        self.heap.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("scan thread panicked");
            }
        }
    }
}

impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.emitted >= self.limit {
            self.shutdown();
            return None;
        }
        if !self.seeded {
            self.seeded = true;
            for index in 0..self.readers.len() {
                self.refill(index);
            }
        }

        loop {
            let top = match self.heap.pop() {
                Some(top) => top,
                None => {
                    self.shutdown();
                    return None;
                }
            };
            self.refill(top.stream);

            if !self.seen.insert(top.serial) {
                continue;
            }

            self.emitted += 1;
            if self.emitted >= self.limit {
                self.shutdown();
            }
            return Some(top.event);
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
