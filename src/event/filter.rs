//! Query filter
//!
//! JSON shape as sent by clients:
//!
//! ```json
//! {"ids": [..], "authors": [..], "kinds": [1, 7], "#e": [..], "#t": ["news"],
//!  "since": 1700000000, "until": 1700100000, "limit": 50}
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

use super::Event;

/// Constraints over stored events
///
/// Every present constraint must hold. Tag constraints are ANDed across tag
/// names and ORed across the values given for one name. Empty lists count as
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub ids: Vec<String>,
    pub authors: Vec<String>,
    pub kinds: Vec<u16>,
    /// Tag name (without the `#`) → accepted values
    pub tags: BTreeMap<String, Vec<String>>,
    pub since: Option<u32>,
    pub until: Option<u32>,
    pub limit: Option<i32>,
}

impl Filter {
    /// Whether `event` satisfies every constraint of this filter
    pub fn matches(&self, event: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| id.eq_ignore_ascii_case(&event.id)) {
            return false;
        }
        if !self.authors.is_empty()
            && !self
                .authors
                .iter()
                .any(|a| a.eq_ignore_ascii_case(&event.pubkey))
        {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        self.tags.iter().all(|(name, values)| {
            values.is_empty()
                || event
                    .tag_values(name)
                    .any(|v| values.iter().any(|want| want == v))
        })
    }

    /// Parse a filter from its JSON object form
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| StoreError::InvalidFilter("filter must be a JSON object".to_string()))?;

        let mut filter = Filter::default();
        for (key, field) in object {
            match key.as_str() {
                "ids" => filter.ids = string_list(key, field)?,
                "authors" => filter.authors = string_list(key, field)?,
                "kinds" => {
                    filter.kinds = array(key, field)?
                        .iter()
                        .map(|k| {
                            k.as_u64()
                                .and_then(|k| u16::try_from(k).ok())
                                .ok_or_else(|| invalid(key, "expected 16-bit kinds"))
                        })
                        .collect::<Result<_>>()?;
                }
                "since" => filter.since = Some(timestamp(key, field)?),
                "until" => filter.until = Some(timestamp(key, field)?),
                "limit" => {
                    let limit = field
                        .as_i64()
                        .ok_or_else(|| invalid(key, "expected an integer"))?;
                    filter.limit = Some(limit.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
                }
                tag if tag.starts_with('#') => {
                    filter
                        .tags
                        .insert(tag[1..].to_string(), string_list(key, field)?);
                }
                // unknown fields are ignored
                _ => {}
            }
        }
        Ok(filter)
    }

    /// Parse a filter from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
        Self::from_value(&value)
    }

    /// JSON object form of this filter
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        if !self.ids.is_empty() {
            object.insert("ids".into(), Value::from(self.ids.clone()));
        }
        if !self.authors.is_empty() {
            object.insert("authors".into(), Value::from(self.authors.clone()));
        }
        if !self.kinds.is_empty() {
            object.insert("kinds".into(), Value::from(self.kinds.clone()));
        }
        for (name, values) in &self.tags {
            object.insert(format!("#{}", name), Value::from(values.clone()));
        }
        if let Some(since) = self.since {
            object.insert("since".into(), Value::from(since));
        }
        if let Some(until) = self.until {
            object.insert("until".into(), Value::from(until));
        }
        if let Some(limit) = self.limit {
            object.insert("limit".into(), Value::from(limit));
        }
        Value::Object(object)
    }
}

fn invalid(key: &str, reason: &str) -> StoreError {
    StoreError::InvalidFilter(format!("{}: {}", key, reason))
}

fn array<'a>(key: &str, value: &'a Value) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| invalid(key, "expected an array"))
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>> {
    array(key, value)?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(key, "expected strings"))
        })
        .collect()
}

fn timestamp(key: &str, value: &Value) -> Result<u32> {
    value
        .as_u64()
        .map(|t| t.min(u32::MAX as u64) as u32)
        .ok_or_else(|| invalid(key, "expected a unix timestamp"))
}
