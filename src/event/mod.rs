//! Event Module
//!
//! The signed event record and the query filter.
//!
//! Events are immutable once signed. The store persists them verbatim and
//! derives every index key from these fields alone.

mod filter;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

pub use filter::Filter;

/// First kind of the parameterized replaceable range
pub const PARAM_REPLACEABLE_MIN: u16 = 30000;

/// Last kind of the parameterized replaceable range
pub const PARAM_REPLACEABLE_MAX: u16 = 39999;

/// Wrapper for a tag expressed as an array of strings.
///
/// The first element names the tag, the following elements hold data:
///
/// - `p` – references another author's public key
/// - `e` – links to another event ID
/// - `d` – identifier of a parameterized replaceable event
/// - `t` – free-form topic or hashtag
///
/// Tags are stored verbatim so uncommon or custom tags are preserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name (first element)
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First data element
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// A signed event as published by clients.
///
/// ```json
/// {
///   "id": "4376c65d...",
///   "pubkey": "6e468422...",
///   "created_at": 1700000000,
///   "kind": 1,
///   "tags": [["t", "news"], ["p", "f7234bd4..."]],
///   "content": "hello",
///   "sig": "908a15e4..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of the SHA-256 of the canonical form)
    pub id: String,
    /// Author public key (hex)
    pub pubkey: String,
    /// Unix timestamp of creation, in seconds
    pub created_at: u32,
    /// Kind number, e.g. `1` or `30023`
    pub kind: u16,
    /// Ordered tags
    pub tags: Vec<Tag>,
    /// Event content body
    pub content: String,
    /// Schnorr signature over the id (checked upstream, not by the store)
    pub sig: String,
}

impl Event {
    /// Parse an event from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::InvalidEvent(e.to_string()))
    }

    /// Serialize the event to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Hex SHA-256 of `[0, pubkey, created_at, kind, tags, content]`
    pub fn compute_id(&self) -> Result<String> {
        let canonical = serde_json::to_string(&(
            0u8,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Whether `id` matches the canonical hash of the other fields
    pub fn has_valid_id(&self) -> bool {
        self.compute_id()
            .map(|id| id.eq_ignore_ascii_case(&self.id))
            .unwrap_or(false)
    }

    /// Kinds 30000..=39999
    pub fn is_parameterized_replaceable(&self) -> bool {
        (PARAM_REPLACEABLE_MIN..=PARAM_REPLACEABLE_MAX).contains(&self.kind)
    }

    /// Kinds 0, 3 and 10000..=19999
    pub fn is_replaceable(&self) -> bool {
        self.kind == 0 || self.kind == 3 || (10000..20000).contains(&self.kind)
    }

    /// Value of the first `d` tag, or the empty string
    pub fn d_tag(&self) -> &str {
        self.tags
            .iter()
            .find(|t| t.name() == Some("d"))
            .and_then(Tag::value)
            .unwrap_or("")
    }

    /// Values of every tag named `name` that has a value
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.name() == Some(name))
            .filter_map(Tag::value)
    }
}
