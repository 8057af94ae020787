//! Key layouts
//!
//! Every key starts with a one-byte family discriminator. Index keys end in
//! `[created_at u32 BE][serial u32 BE]` (the by-id family omits the
//! timestamp), so a reverse scan over a selector prefix yields newest first
//! and the trailing four bytes always point at the raw record.
//!
//! ```text
//! raw            [0][serial]
//! created_at     [1][created_at][serial]
//! id             [2][id[..8]][serial]
//! kind           [3][kind u16][created_at][serial]
//! pubkey         [4][pubkey[..8]][created_at][serial]
//! pubkey+kind    [5][pubkey[..8]][kind u16][created_at][serial]
//! tag            [6][name byte][token 8][created_at][serial]
//! tag-address    [7][kind u16][pubkey[..8]][sha256(d)[..8]][created_at][serial]
//! sequence       [254]
//! schema version [255]
//! ```

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::event::Event;

pub const RAW_PREFIX: u8 = 0;
pub const CREATED_AT_PREFIX: u8 = 1;
pub const ID_PREFIX: u8 = 2;
pub const KIND_PREFIX: u8 = 3;
pub const PUBKEY_PREFIX: u8 = 4;
pub const PUBKEY_KIND_PREFIX: u8 = 5;
pub const TAG_PREFIX: u8 = 6;
pub const TAG_ADDRESS_PREFIX: u8 = 7;
pub const SEQUENCE_KEY: u8 = 254;
pub const DB_VERSION_KEY: u8 = 255;

/// Every index discriminator, for audits and rebuilds
pub const INDEX_PREFIXES: [u8; 7] = [
    CREATED_AT_PREFIX,
    ID_PREFIX,
    KIND_PREFIX,
    PUBKEY_PREFIX,
    PUBKEY_KIND_PREFIX,
    TAG_PREFIX,
    TAG_ADDRESS_PREFIX,
];

/// Bytes of an id or pubkey kept in index selectors
pub const SELECTOR_LEN: usize = 8;

/// Width of the `[created_at][serial]` tail
pub const TAIL_LEN: usize = 8;

/// Index family of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFamily {
    CreatedAt,
    Id,
    Kind,
    Pubkey,
    PubkeyKind,
    Tag,
    TagAddress,
}

impl IndexFamily {
    pub fn prefix_byte(self) -> u8 {
        match self {
            IndexFamily::CreatedAt => CREATED_AT_PREFIX,
            IndexFamily::Id => ID_PREFIX,
            IndexFamily::Kind => KIND_PREFIX,
            IndexFamily::Pubkey => PUBKEY_PREFIX,
            IndexFamily::PubkeyKind => PUBKEY_KIND_PREFIX,
            IndexFamily::Tag => TAG_PREFIX,
            IndexFamily::TagAddress => TAG_ADDRESS_PREFIX,
        }
    }

    /// Whether keys of this family carry a timestamp
    pub fn has_timestamp(self) -> bool {
        self != IndexFamily::Id
    }
}

// =============================================================================
// Selectors
// =============================================================================

/// Decode the first 8 bytes of a 64-char hex id or pubkey
pub fn hex_selector(hex_str: &str) -> Result<[u8; SELECTOR_LEN]> {
    if hex_str.len() != 64 {
        return Err(StoreError::InvalidFilter(format!(
            "expected 64 hex characters, got {} in '{}'",
            hex_str.len(),
            hex_str
        )));
    }
    if !hex_str.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StoreError::InvalidFilter(format!("invalid hex '{}'", hex_str)));
    }
    let mut out = [0u8; SELECTOR_LEN];
    hex::decode_to_slice(&hex_str[..SELECTOR_LEN * 2], &mut out)
        .map_err(|e| StoreError::InvalidFilter(format!("invalid hex '{}': {}", hex_str, e)))?;
    Ok(out)
}

/// Fixed-width token for a tag value
///
/// A 64-char hex value (event id, pubkey) contributes its first 8 decoded
/// bytes; anything else the first 8 bytes of its SHA-256.
pub fn tag_token(value: &str) -> [u8; SELECTOR_LEN] {
    let mut out = [0u8; SELECTOR_LEN];
    if value.len() == 64
        && value.bytes().all(|b| b.is_ascii_hexdigit())
        && hex::decode_to_slice(&value[..SELECTOR_LEN * 2], &mut out).is_ok()
    {
        return out;
    }
    out.copy_from_slice(&Sha256::digest(value.as_bytes())[..SELECTOR_LEN]);
    out
}

/// First 8 bytes of SHA-256 of a `d` identifier
pub fn address_token(d: &str) -> [u8; SELECTOR_LEN] {
    let mut out = [0u8; SELECTOR_LEN];
    out.copy_from_slice(&Sha256::digest(d.as_bytes())[..SELECTOR_LEN]);
    out
}

/// Byte naming an indexable tag: a single-character ASCII name
pub fn tag_name_byte(name: &str) -> Option<u8> {
    match name.as_bytes() {
        [b] if b.is_ascii() => Some(*b),
        _ => None,
    }
}

// =============================================================================
// Prefixes
// =============================================================================

pub fn id_prefix(id_hex: &str) -> Result<Vec<u8>> {
    let mut key = vec![ID_PREFIX];
    key.extend_from_slice(&hex_selector(id_hex)?);
    Ok(key)
}

pub fn kind_prefix(kind: u16) -> Vec<u8> {
    let mut key = vec![KIND_PREFIX];
    key.extend_from_slice(&kind.to_be_bytes());
    key
}

pub fn pubkey_prefix(pubkey_hex: &str) -> Result<Vec<u8>> {
    let mut key = vec![PUBKEY_PREFIX];
    key.extend_from_slice(&hex_selector(pubkey_hex)?);
    Ok(key)
}

pub fn pubkey_kind_prefix(pubkey_hex: &str, kind: u16) -> Result<Vec<u8>> {
    let mut key = vec![PUBKEY_KIND_PREFIX];
    key.extend_from_slice(&hex_selector(pubkey_hex)?);
    key.extend_from_slice(&kind.to_be_bytes());
    Ok(key)
}

pub fn tag_prefix(name: u8, value: &str) -> Vec<u8> {
    let mut key = vec![TAG_PREFIX, name];
    key.extend_from_slice(&tag_token(value));
    key
}

pub fn address_prefix(kind: u16, pubkey_hex: &str, d: &str) -> Result<Vec<u8>> {
    let mut key = vec![TAG_ADDRESS_PREFIX];
    key.extend_from_slice(&kind.to_be_bytes());
    key.extend_from_slice(&hex_selector(pubkey_hex)?);
    key.extend_from_slice(&address_token(d));
    Ok(key)
}

// =============================================================================
// Full keys
// =============================================================================

pub fn raw_key(serial: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(RAW_PREFIX);
    key.extend_from_slice(&serial.to_be_bytes());
    key
}

/// Serial of a raw record key
pub fn raw_serial(key: &[u8]) -> Option<u32> {
    match key {
        [RAW_PREFIX, a, b, c, d] => Some(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

/// Trailing serial of any index key
pub fn index_serial(key: &[u8]) -> Option<u32> {
    let tail = key.len().checked_sub(4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&key[tail..]);
    Some(u32::from_be_bytes(buf))
}

/// Timestamp of an index key that carries one
pub fn index_created_at(key: &[u8]) -> Option<u32> {
    let start = key.len().checked_sub(TAIL_LEN)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&key[start..start + 4]);
    Some(u32::from_be_bytes(buf))
}

fn with_tail(mut prefix: Vec<u8>, created_at: u32, serial: u32) -> Vec<u8> {
    prefix.extend_from_slice(&created_at.to_be_bytes());
    prefix.extend_from_slice(&serial.to_be_bytes());
    prefix
}

/// Complete set of index keys that exist while `event` is stored at `serial`
///
/// Pure: save writes exactly this set and delete removes exactly this set.
pub fn derive_index_keys(event: &Event, serial: u32) -> Result<BTreeSet<Vec<u8>>> {
    let invalid = |e: StoreError| StoreError::InvalidEvent(e.to_string());
    let ca = event.created_at;
    let mut keys = BTreeSet::new();

    let mut id_key = id_prefix(&event.id).map_err(invalid)?;
    id_key.extend_from_slice(&serial.to_be_bytes());
    keys.insert(id_key);

    keys.insert(with_tail(vec![CREATED_AT_PREFIX], ca, serial));
    keys.insert(with_tail(kind_prefix(event.kind), ca, serial));
    keys.insert(with_tail(pubkey_prefix(&event.pubkey).map_err(invalid)?, ca, serial));
    keys.insert(with_tail(
        pubkey_kind_prefix(&event.pubkey, event.kind).map_err(invalid)?,
        ca,
        serial,
    ));

    for tag in &event.tags {
        if tag.0.len() < 2 {
            continue;
        }
        if let Some(name) = tag.name().and_then(tag_name_byte) {
            keys.insert(with_tail(tag_prefix(name, &tag.0[1]), ca, serial));
        }
    }

    if event.is_parameterized_replaceable() {
        let prefix = address_prefix(event.kind, &event.pubkey, event.d_tag()).map_err(invalid)?;
        keys.insert(with_tail(prefix, ca, serial));
    }

    Ok(keys)
}
