//! Cache state: the three co-indexed tables
//!
//! One [`CacheState`] value is a full immutable snapshot. Transitions
//! (see the reducer) never mutate in place; they produce a replacement
//! snapshot, and consumers treat prior snapshots as history.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;

use crate::error::FetchError;

/// Entity type name -> (canonical id -> entity record).
///
/// Records are held behind `Arc` so "unchanged since the last
/// snapshot" is observable by pointer identity; the reducer keeps the
/// existing allocation whenever a merge produces an equal value.
pub type EntityTable = BTreeMap<String, BTreeMap<String, Arc<Value>>>;

/// The normalized shape stored per fetch key.
///
/// Mirrors the schema that produced it: a single id for an entity
/// schema, a list for a list schema, an object for an object schema,
/// and verbatim values for schema-less fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape {
    /// Reference to one entity
    Id(String),
    /// Ordered references
    List(Vec<ResultShape>),
    /// Structurally nested references
    Object(BTreeMap<String, ResultShape>),
    /// A plain value with no schema (passes through unchanged)
    Value(Value),
}

impl ResultShape {
    /// Short name used in shape-mismatch diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ResultShape::Id(_) => "single id",
            ResultShape::List(_) => "list",
            ResultShape::Object(_) => "object",
            ResultShape::Value(_) => "plain value",
        }
    }

    /// Render as a JSON value, for embedding references inside an
    /// entity record (a child entity field becomes its id, a child
    /// list becomes an array of ids, and so on)
    pub fn to_value(&self) -> Value {
        match self {
            ResultShape::Id(id) => Value::String(id.clone()),
            ResultShape::List(items) => {
                Value::Array(items.iter().map(ResultShape::to_value).collect())
            }
            ResultShape::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            ResultShape::Value(v) => v.clone(),
        }
    }
}

/// Freshness metadata for one fetch key.
///
/// Absence of a meta entry means "never fetched".
#[derive(Debug, Clone, PartialEq)]
pub struct FetchMeta {
    /// Time of the last successful or failed completion
    pub date: SystemTime,
    /// Moment the entry goes stale; `None` never expires
    pub expires_at: Option<SystemTime>,
    /// Last transport failure, if the completion was an error
    pub error: Option<FetchError>,
}

impl FetchMeta {
    /// Whether the entry's freshness window has elapsed
    pub fn is_stale(&self, now: SystemTime) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }
}

/// One immutable snapshot of the whole cache
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    /// Entity type -> id -> record
    pub entities: EntityTable,
    /// Fetch key -> normalized result shape
    pub results: HashMap<String, ResultShape>,
    /// Fetch key -> freshness metadata
    pub meta: HashMap<String, FetchMeta>,
}

impl CacheState {
    /// The empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one entity record
    pub fn entity(&self, entity_key: &str, id: &str) -> Option<&Arc<Value>> {
        self.entities.get(entity_key)?.get(id)
    }

    /// Look up the stored result shape for a fetch key
    pub fn result(&self, fetch_key: &str) -> Option<&ResultShape> {
        self.results.get(fetch_key)
    }

    /// Look up freshness metadata for a fetch key
    pub fn meta(&self, fetch_key: &str) -> Option<&FetchMeta> {
        self.meta.get(fetch_key)
    }

    /// Whether a fetch key has a completion inside its freshness window
    pub fn is_fresh(&self, fetch_key: &str, now: SystemTime) -> bool {
        match self.meta.get(fetch_key) {
            Some(meta) => !meta.is_stale(now),
            None => false,
        }
    }
}
