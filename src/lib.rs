//! # eventkv
//!
//! An embedded event store for relays of signed events, with:
//! - Raw records plus seven derived index families kept consistent per write
//! - A query planner choosing prefix-bounded reverse index scans per filter
//! - Concurrent scans merged newest-first under a result cap
//! - Write-Ahead Logging (WAL) and crash recovery underneath
//! - Deletion-driven background compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       EventStore                             │
//! │        save / delete / query / count / reindex               │
//! └──────────┬───────────────────────────────┬──────────────────┘
//!            │ write txn                     │ snapshot
//!            ▼                               ▼
//!   ┌─────────────────┐            ┌──────────────────────┐
//!   │ Index keys +    │            │ Planner → scan       │
//!   │ raw record      │            │ threads → heap merge │
//!   └────────┬────────┘            └──────────┬───────────┘
//!            │                                │
//! ┌──────────▼────────────────────────────────▼─────────────────┐
//! │                         Engine                               │
//! │            (Single Writer / Snapshot Readers)                │
//! └──────────┬───────────────────────────────┬──────────────────┘
//!            │                               │
//!            ▼                               ▼
//!   ┌─────────────┐                  ┌─────────────┐
//!   │     WAL     │                  │  MemTable   │
//!   │  (Append)   │                  │ (versioned) │
//!   └─────────────┘                  └──────┬──────┘
//!                                           │ flush / compact
//!                                           ▼
//!                                   ┌─────────────┐
//!                                   │   Storage   │
//!                                   │  (SSTable)  │
//!                                   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;

pub mod event;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{CompactionPolicy, Config, WalSyncStrategy};
pub use engine::{Engine, Snapshot};
pub use event::{Event, Filter, Tag};
pub use store::{EventStore, EventStream};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of eventkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
