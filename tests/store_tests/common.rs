//! Shared fixtures for the event store tests

use eventkv::config::{CompactionPolicy, Config, WalSyncStrategy};
use eventkv::event::{Event, Tag};
use eventkv::store::EventStore;
use tempfile::TempDir;

/// Deterministic 64-char hex public key
pub fn pubkey(n: u8) -> String {
    format!("{:02x}", n).repeat(32)
}

pub fn config_for(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .memtable_size_limit(1024 * 1024)
        .compaction(CompactionPolicy::Disabled)
        .build()
}

pub fn setup_temp_store() -> (TempDir, EventStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = EventStore::open(config_for(&temp_dir)).unwrap();
    (temp_dir, store)
}

/// Build an event with a correct id
pub fn make_event(author: &str, created_at: u32, kind: u16, tags: &[&[&str]], content: &str) -> Event {
    let mut event = Event {
        id: String::new(),
        pubkey: author.to_string(),
        created_at,
        kind,
        tags: tags
            .iter()
            .map(|t| Tag(t.iter().map(|s| s.to_string()).collect()))
            .collect(),
        content: content.to_string(),
        sig: "00".repeat(64),
    };
    event.id = event.compute_id().unwrap();
    event
}

/// Plain text note without tags
pub fn note(author: &str, created_at: u32) -> Event {
    make_event(author, created_at, 1, &[], &format!("note at {}", created_at))
}

pub fn timestamps(events: &[Event]) -> Vec<u32> {
    events.iter().map(|e| e.created_at).collect()
}
