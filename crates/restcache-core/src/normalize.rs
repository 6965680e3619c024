//! Normalization engine
//!
//! Walks a raw JSON payload against a schema, extracting every
//! embedded entity into a flat per-type table and replacing embedded
//! records with identity references. The returned result mirrors the
//! payload's shape with entities replaced by their ids.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::schema::Schema;
use crate::state::ResultShape;

/// Output of one normalization pass.
///
/// `entities` is keyed by type name then canonical id; records here
/// are plain values, merged into the shared state by the reducer.
#[derive(Debug)]
pub struct Normalized {
    pub entities: BTreeMap<String, BTreeMap<String, Value>>,
    pub result: ResultShape,
}

/// Short name for a JSON value's shape, used in diagnostics
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize `payload` against `schema`.
///
/// Fails loudly with [`CacheError::MissingIdentity`] when an entity
/// yields no usable id, except inside lists where the offending
/// element is skipped and the rest of the list survives.
pub fn normalize(payload: &Value, schema: &Schema) -> Result<Normalized> {
    let mut entities = BTreeMap::new();
    let result = visit(payload, None, None, schema, &mut entities)?;
    Ok(Normalized { entities, result })
}

fn visit(
    value: &Value,
    parent: Option<&Value>,
    key: Option<&str>,
    schema: &Schema,
    entities: &mut BTreeMap<String, BTreeMap<String, Value>>,
) -> Result<ResultShape> {
    match schema {
        Schema::Entity(entity) => {
            let id = entity
                .id_of(value, parent, key)
                .ok_or_else(|| CacheError::MissingIdentity {
                    entity: entity.key().to_string(),
                })?;

            let mut processed = entity.process(value.clone());
            for (field, child) in entity.definitions() {
                let child_value = match processed.get(&field) {
                    Some(v) => v.clone(),
                    None => continue,
                };
                let child_result = visit(&child_value, Some(value), Some(&field), &child, entities)?;
                if let Value::Object(map) = &mut processed {
                    map.insert(field, child_result.to_value());
                }
            }

            let table = entities.entry(entity.key().to_string()).or_default();
            let record = match table.get(&id) {
                // Same entity seen more than once in this pass: merge so
                // the most complete composite is kept.
                Some(existing) => entity.merge(existing, &processed),
                None => processed,
            };
            table.insert(id.clone(), record);
            Ok(ResultShape::Id(id))
        }
        Schema::List(child) => {
            let Value::Array(items) = value else {
                return Err(CacheError::ShapeMismatch {
                    context: "normalization against a list schema".to_string(),
                    expected: "array",
                    found: value_kind(value),
                });
            };
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                match visit(item, parent, key, child, entities) {
                    Ok(result) => results.push(result),
                    // An unaddressable element is dropped, not fatal to
                    // the whole list.
                    Err(CacheError::MissingIdentity { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(ResultShape::List(results))
        }
        Schema::Object(fields) => {
            let Value::Object(map) = value else {
                return Err(CacheError::ShapeMismatch {
                    context: "normalization against an object schema".to_string(),
                    expected: "object",
                    found: value_kind(value),
                });
            };
            let mut results = BTreeMap::new();
            for (field, field_value) in map {
                match fields.get(field) {
                    Some(child) => {
                        let result =
                            visit(field_value, Some(value), Some(field), child, entities)?;
                        results.insert(field.clone(), result);
                    }
                    // Fields without a schema (pagination cursors etc.)
                    // pass through verbatim.
                    None => {
                        results.insert(field.clone(), ResultShape::Value(field_value.clone()));
                    }
                }
            }
            Ok(ResultShape::Object(results))
        }
    }
}
