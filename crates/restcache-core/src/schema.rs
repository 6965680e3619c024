//! Declarative schema model
//!
//! Schemas describe how a JSON shape maps onto typed entities. Three
//! kinds compose recursively: an entity schema (one addressable record
//! type), a list schema (a child schema applied per element), and an
//! object schema (fixed-shape nesting, non-schema fields pass through).
//!
//! Entity schemas may reference each other, including cyclically
//! (article -> comments -> article); cycles are closed after
//! construction via [`EntitySchema::define`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Derives an identity string from (value, parent value, structural key)
pub type IdExtractor = dyn Fn(&Value, Option<&Value>, Option<&str>) -> Option<String> + Send + Sync;

/// Transforms a raw record before its fields are normalized
pub type ProcessStrategy = dyn Fn(Value) -> Value + Send + Sync;

/// Combines two partial copies of the same entity
pub type MergeStrategy = dyn Fn(&Value, &Value) -> Value + Send + Sync;

/// Canonical string form of an identity value.
///
/// Ids arrive as JSON numbers or strings; lookups must not depend on
/// which one the server chose, so both map to the same string.
pub fn canonical_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    }
}

/// Schema for one addressable record type.
///
/// Identity, processing and merging are pluggable strategies with
/// defaults matching common REST payloads: identity from the `"id"`
/// field, no processing, and a shallow merge where only fields present
/// in the incoming copy override existing ones.
pub struct EntitySchema {
    key: String,
    id_extractor: Box<IdExtractor>,
    process: Box<ProcessStrategy>,
    merge: Box<MergeStrategy>,
    // Interior mutability lets schemas reference each other cyclically:
    // build both, then define() the edges.
    definitions: RwLock<BTreeMap<String, Schema>>,
}

/// Default merge: shallow override, incoming wins for the fields it defines
pub fn merge_defined(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            for (k, v) in b {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

impl EntitySchema {
    /// Create an entity schema with default strategies
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id_extractor: Box::new(|value, _parent, _key| {
                value.get("id").and_then(canonical_id)
            }),
            process: Box::new(|value| value),
            merge: Box::new(merge_defined),
            definitions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Replace the identity extraction rule
    pub fn id_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, Option<&Value>, Option<&str>) -> Option<String> + Send + Sync + 'static,
    {
        self.id_extractor = Box::new(f);
        self
    }

    /// Replace the processing strategy applied to raw records
    pub fn process_strategy<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.process = Box::new(f);
        self
    }

    /// Replace the merge strategy for partial copies
    pub fn merge_strategy<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.merge = Box::new(f);
        self
    }

    /// Finish construction, yielding a shareable handle
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Declare that `field` of this entity is shaped by `schema`.
    ///
    /// Takes `&self` so already-shared schemas can reference each other.
    pub fn define(&self, field: impl Into<String>, schema: Schema) {
        self.definitions.write().insert(field.into(), schema);
    }

    /// The globally unique type name for this entity
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Derive the identity of a record, falling back to the structural key
    pub fn id_of(
        &self,
        value: &Value,
        parent: Option<&Value>,
        key: Option<&str>,
    ) -> Option<String> {
        (self.id_extractor)(value, parent, key).or_else(|| key.map(str::to_string))
    }

    /// Apply the processing strategy
    pub fn process(&self, value: Value) -> Value {
        (self.process)(value)
    }

    /// Apply the merge strategy
    pub fn merge(&self, existing: &Value, incoming: &Value) -> Value {
        (self.merge)(existing, incoming)
    }

    /// Snapshot of the field -> schema definitions
    pub fn definitions(&self) -> Vec<(String, Schema)> {
        self.definitions
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("key", &self.key)
            .field(
                "definitions",
                &self.definitions.read().keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A recursive description of how a JSON shape maps to entities
#[derive(Debug, Clone)]
pub enum Schema {
    /// A single addressable record
    Entity(Arc<EntitySchema>),
    /// An array of values, each shaped by the child schema
    List(Box<Schema>),
    /// A fixed-shape object; unlisted fields pass through verbatim
    Object(BTreeMap<String, Schema>),
}

impl Schema {
    /// Schema for a single entity
    pub fn entity(entity: &Arc<EntitySchema>) -> Self {
        Schema::Entity(entity.clone())
    }

    /// Schema for an array of `child`
    pub fn list(child: Schema) -> Self {
        Schema::List(Box::new(child))
    }

    /// Schema for a fixed-shape object
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Schema::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Every entity schema reachable from this node, keyed by type name.
    ///
    /// Cycle-safe: each type is visited once.
    pub fn entity_schemas(&self) -> HashMap<String, Arc<EntitySchema>> {
        let mut found = HashMap::new();
        self.collect_entities(&mut found);
        found
    }

    fn collect_entities(&self, found: &mut HashMap<String, Arc<EntitySchema>>) {
        match self {
            Schema::Entity(entity) => {
                if found.contains_key(entity.key()) {
                    return;
                }
                found.insert(entity.key().to_string(), entity.clone());
                for (_, child) in entity.definitions() {
                    child.collect_entities(found);
                }
            }
            Schema::List(child) => child.collect_entities(found),
            Schema::Object(fields) => {
                for child in fields.values() {
                    child.collect_entities(found);
                }
            }
        }
    }

    /// The single entity schema a detail read resolves to, if any.
    ///
    /// An entity schema directly, or the first entity-bearing field of
    /// an object schema (e.g. `{ data: Article }`). List schemas have
    /// no single entity.
    pub fn detail_entity(&self) -> Option<Arc<EntitySchema>> {
        match self {
            Schema::Entity(entity) => Some(entity.clone()),
            Schema::List(_) => None,
            Schema::Object(fields) => fields.values().find_map(|child| child.detail_entity()),
        }
    }
}

impl From<&Arc<EntitySchema>> for Schema {
    fn from(entity: &Arc<EntitySchema>) -> Self {
        Schema::Entity(entity.clone())
    }
}
