//! Query planner
//!
//! Turns a filter into prefix-bounded reverse index scans plus the residual
//! constraints the chosen index cannot enforce.
//!
//! Selection precedence (first match wins):
//! 1. `ids` → one by-id scan per id
//! 2. `authors` without `kinds` → one by-pubkey scan per author
//! 3. `authors` and `kinds` → one by-pubkey+kind scan per pair, or one
//!    tag-address scan per (author, kind, d) when every kind is
//!    parameterized replaceable and `#d` is constrained
//! 4. `tags` → one by-tag scan per (name, value)
//! 5. `kinds` → one by-kind scan per kind
//! 6. otherwise a single scan of the global created_at index

use crate::error::{Result, StoreError};
use crate::event::{Filter, PARAM_REPLACEABLE_MAX, PARAM_REPLACEABLE_MIN};

use super::keys::{self, IndexFamily};

/// One prefix-bounded reverse range scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDescriptor {
    pub family: IndexFamily,
    /// Every key of the scan starts with this
    pub prefix: Vec<u8>,
    /// Inclusive key the reverse scan starts from
    pub start: Vec<u8>,
}

impl ScanDescriptor {
    fn new(family: IndexFamily, prefix: Vec<u8>, until: u32) -> Self {
        let mut start = prefix.clone();
        if family.has_timestamp() {
            start.extend_from_slice(&until.to_be_bytes());
        }
        start.extend_from_slice(&u32::MAX.to_be_bytes());
        Self {
            family,
            prefix,
            start,
        }
    }

    /// By-id keys carry no timestamp, so the `since` cut-off does not apply
    pub fn skip_timestamp(&self) -> bool {
        !self.family.has_timestamp()
    }
}

/// Output of [`plan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub scans: Vec<ScanDescriptor>,
    /// Constraints checked against decoded records; `None` when the scans
    /// alone are exact
    pub residual: Option<Filter>,
    /// Scans stop at the first entry older than this
    pub since: u32,
    pub until: u32,
}

/// Number of events a query may return
///
/// A positive filter limit is capped by `max_limit`; anything else means
/// `max_limit`.
pub fn effective_limit(limit: Option<i32>, max_limit: usize) -> usize {
    match limit {
        Some(l) if l > 0 => (l as usize).min(max_limit),
        _ => max_limit,
    }
}

/// Choose the scans for `filter`
pub fn plan(filter: &Filter) -> Result<QueryPlan> {
    let since = filter.since.unwrap_or(0);
    let until = filter.until.unwrap_or(u32::MAX);

    let mut scans = Vec::new();
    let mut residual = Filter::default();

    if !filter.ids.is_empty() {
        for id in &filter.ids {
            scans.push(ScanDescriptor::new(IndexFamily::Id, keys::id_prefix(id)?, until));
        }
        residual.authors = filter.authors.clone();
        residual.kinds = filter.kinds.clone();
        residual.tags = filter.tags.clone();
        residual.since = filter.since;
        residual.until = filter.until;
    } else if !filter.authors.is_empty() {
        if filter.kinds.is_empty() {
            for author in &filter.authors {
                scans.push(ScanDescriptor::new(
                    IndexFamily::Pubkey,
                    keys::pubkey_prefix(author)?,
                    until,
                ));
            }
        } else if let Some(ds) = address_lookup(filter) {
            for author in &filter.authors {
                for &kind in &filter.kinds {
                    for d in ds {
                        scans.push(ScanDescriptor::new(
                            IndexFamily::TagAddress,
                            keys::address_prefix(kind, author, d)?,
                            until,
                        ));
                    }
                }
            }
        } else {
            for author in &filter.authors {
                for &kind in &filter.kinds {
                    scans.push(ScanDescriptor::new(
                        IndexFamily::PubkeyKind,
                        keys::pubkey_kind_prefix(author, kind)?,
                        until,
                    ));
                }
            }
        }
        residual.tags = filter.tags.clone();
    } else if !filter.tags.is_empty() {
        let values: usize = filter.tags.values().map(Vec::len).sum();
        if values == 0 {
            return Err(StoreError::InvalidFilter("empty tag filters".to_string()));
        }

        for (name, values) in &filter.tags {
            if values.is_empty() {
                continue;
            }
            let name_byte = keys::tag_name_byte(name).ok_or_else(|| {
                StoreError::InvalidFilter(format!("tag '{}' is not a single character", name))
            })?;
            for value in values {
                scans.push(ScanDescriptor::new(
                    IndexFamily::Tag,
                    keys::tag_prefix(name_byte, value),
                    until,
                ));
            }
        }

        // Tokens are value prefixes or hashes, so hits are rechecked against
        // the full values, and the index enforces only one name anyway
        residual.kinds = filter.kinds.clone();
        residual.tags = filter.tags.clone();
    } else if !filter.kinds.is_empty() {
        for &kind in &filter.kinds {
            scans.push(ScanDescriptor::new(IndexFamily::Kind, keys::kind_prefix(kind), until));
        }
    } else {
        scans.push(ScanDescriptor::new(
            IndexFamily::CreatedAt,
            vec![keys::CREATED_AT_PREFIX],
            until,
        ));
    }

    Ok(QueryPlan {
        scans,
        residual: if is_unconstrained(&residual) {
            None
        } else {
            Some(residual)
        },
        since,
        until,
    })
}

/// `#d` values when the filter addresses parameterized replaceable events
fn address_lookup(filter: &Filter) -> Option<&Vec<String>> {
    let all_addressable = filter
        .kinds
        .iter()
        .all(|k| (PARAM_REPLACEABLE_MIN..=PARAM_REPLACEABLE_MAX).contains(k));
    if !all_addressable {
        return None;
    }
    filter.tags.get("d").filter(|ds| !ds.is_empty())
}

fn is_unconstrained(filter: &Filter) -> bool {
    filter.ids.is_empty()
        && filter.authors.is_empty()
        && filter.kinds.is_empty()
        && filter.tags.values().all(Vec::is_empty)
        && filter.since.is_none()
        && filter.until.is_none()
}
