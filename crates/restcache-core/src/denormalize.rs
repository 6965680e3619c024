//! Denormalization engine
//!
//! Reconstructs the object graph a caller expects from the entity
//! tables plus a stored result shape, resolving identity references
//! back into full records. Every entity touched during the walk is
//! recorded as a dependency (including observed absences) so the
//! selector can memoize on exactly the slice of state that matters.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::normalize::value_kind;
use crate::schema::{EntitySchema, Schema, canonical_id};
use crate::state::{CacheState, ResultShape};

/// One entity observation made during a walk.
///
/// `observed: None` records that the entity was looked up and absent;
/// the output is invalidated if it later appears.
#[derive(Debug, Clone)]
pub struct Dep {
    pub entity_key: String,
    pub id: String,
    pub observed: Option<Arc<Value>>,
}

impl Dep {
    /// Whether the same lookup against `state` would observe the same
    /// record (by pointer identity) or the same absence
    pub fn holds_in(&self, state: &CacheState) -> bool {
        match (state.entity(&self.entity_key, &self.id), &self.observed) {
            (Some(current), Some(observed)) => Arc::ptr_eq(current, observed),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Output of a denormalization walk
#[derive(Debug)]
pub struct Denormalized {
    /// `None` means the root entity was not cached
    pub value: Option<Value>,
    /// Every entity slice the output depends on
    pub deps: Vec<Dep>,
}

/// Walk `seed` against `schema`, resolving references from `state`.
///
/// `context` names the read (normally its fetch key) for diagnostics.
pub fn denormalize(
    state: &CacheState,
    seed: &ResultShape,
    schema: &Schema,
    context: &str,
) -> Result<Denormalized> {
    let mut walker = Walker {
        state,
        context,
        deps: Vec::new(),
        visiting: Vec::new(),
    };
    let value = walker.resolve(seed, schema)?;
    Ok(Denormalized {
        value,
        deps: walker.deps,
    })
}

struct Walker<'a> {
    state: &'a CacheState,
    context: &'a str,
    deps: Vec<Dep>,
    // Entities on the current resolution path, for cyclic data
    visiting: Vec<(String, String)>,
}

impl Walker<'_> {
    fn mismatch(&self, expected: &'static str, found: &'static str) -> CacheError {
        CacheError::ShapeMismatch {
            context: self.context.to_string(),
            expected,
            found,
        }
    }

    fn resolve(&mut self, seed: &ResultShape, schema: &Schema) -> Result<Option<Value>> {
        if let ResultShape::Value(Value::Null) = seed {
            return Ok(None);
        }
        match (schema, seed) {
            (Schema::Entity(entity), ResultShape::Id(id)) => self.resolve_entity(entity, id),
            (Schema::Entity(entity), ResultShape::Value(value)) => match canonical_id(value) {
                Some(id) => self.resolve_entity(entity, &id),
                None => Err(self.mismatch("single id", value_kind(value))),
            },
            (Schema::Entity(_), other) => Err(self.mismatch("single id", other.kind())),

            (Schema::List(child), ResultShape::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    // A reference whose entity was evicted is dropped,
                    // not retained as null.
                    if let Some(value) = self.resolve(item, child)? {
                        out.push(value);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            (Schema::List(child), ResultShape::Value(Value::Array(items))) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = self.resolve(&ResultShape::Value(item.clone()), child)? {
                        out.push(value);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            (Schema::List(_), ResultShape::Value(value)) => {
                Err(self.mismatch("list", value_kind(value)))
            }
            (Schema::List(_), other) => Err(self.mismatch("list", other.kind())),

            (Schema::Object(fields), ResultShape::Object(seed_fields)) => {
                let mut out = serde_json::Map::new();
                for (field, field_seed) in seed_fields {
                    match fields.get(field) {
                        Some(child) => {
                            let resolved = self.resolve(field_seed, child)?;
                            out.insert(field.clone(), resolved.unwrap_or(Value::Null));
                        }
                        None => {
                            out.insert(field.clone(), field_seed.to_value());
                        }
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            (Schema::Object(fields), ResultShape::Value(Value::Object(seed_fields))) => {
                let mut out = serde_json::Map::new();
                for (field, field_value) in seed_fields {
                    match fields.get(field) {
                        Some(child) => {
                            let resolved =
                                self.resolve(&ResultShape::Value(field_value.clone()), child)?;
                            out.insert(field.clone(), resolved.unwrap_or(Value::Null));
                        }
                        None => {
                            out.insert(field.clone(), field_value.clone());
                        }
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            (Schema::Object(_), ResultShape::Value(value)) => {
                Err(self.mismatch("object", value_kind(value)))
            }
            (Schema::Object(_), other) => Err(self.mismatch("object", other.kind())),
        }
    }

    fn resolve_entity(
        &mut self,
        entity: &Arc<EntitySchema>,
        id: &str,
    ) -> Result<Option<Value>> {
        let observed = self.state.entity(entity.key(), id).cloned();
        self.deps.push(Dep {
            entity_key: entity.key().to_string(),
            id: id.to_string(),
            observed: observed.clone(),
        });
        let Some(record) = observed else {
            return Ok(None);
        };

        let path = (entity.key().to_string(), id.to_string());
        if self.visiting.contains(&path) {
            // Cyclic data: emit the record once more with its reference
            // fields unexpanded, guaranteeing termination.
            return Ok(Some((*record).clone()));
        }
        self.visiting.push(path);

        let mut out = (*record).clone();
        for (field, child) in entity.definitions() {
            let Some(field_value) = record.get(&field) else {
                continue;
            };
            let resolved = self.resolve(&ResultShape::Value(field_value.clone()), &child)?;
            if let Value::Object(map) = &mut out {
                map.insert(field, resolved.unwrap_or(Value::Null));
            }
        }

        self.visiting.pop();
        Ok(Some(out))
    }
}
