//! Memoized schema selectors
//!
//! A [`Selector`] reconstructs the denormalized value for a fetch key
//! and keeps it referentially stable: repeated reads against state
//! where nothing *reachable from this read* changed return the exact
//! same `Arc`, so equality-based change detection upstream never fires
//! spuriously. The memo is keyed on the seed shape plus every entity
//! slice the previous walk touched, not on the state reference, so an
//! unrelated entity update elsewhere never invalidates it while any
//! dependency update always does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde_json::Value;

use crate::denormalize::{Dep, denormalize};
use crate::error::{CacheError, Result};
use crate::schema::Schema;
use crate::state::{CacheState, ResultShape};

#[derive(Debug)]
struct MemoEntry {
    seed: ResultShape,
    deps: Vec<Dep>,
    output: Option<Arc<Value>>,
}

impl MemoEntry {
    fn holds_in(&self, seed: &ResultShape, state: &CacheState) -> bool {
        self.seed == *seed && self.deps.iter().all(|dep| dep.holds_in(state))
    }
}

/// A reusable, memoizing read over cache state for one schema
#[derive(Debug)]
pub struct Selector {
    schema: Schema,
    memo: Mutex<HashMap<String, MemoEntry>>,
}

impl Selector {
    /// Build a selector, validating the schema up front.
    ///
    /// A schema with no reachable entity schema cannot resolve
    /// anything and is rejected as [`CacheError::InvalidSchema`].
    pub fn new(schema: Schema) -> Result<Self> {
        if schema.entity_schemas().is_empty() {
            return Err(CacheError::InvalidSchema(
                "no entity schema reachable from selector schema".to_string(),
            ));
        }
        Ok(Self {
            schema,
            memo: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve the denormalized value for `fetch_key`.
    ///
    /// Seed resolution order: the results table is authoritative when
    /// an entry exists; otherwise, for single-entity schemas, a
    /// primary key derived from `params` is tried, which lets a caller
    /// who already knows the identity read a record before any list
    /// query has refreshed. No seed means not cached: `Ok(None)`.
    pub fn select(
        &self,
        state: &CacheState,
        fetch_key: &str,
        params: &Value,
    ) -> Result<Option<Arc<Value>>> {
        let (seed, schema) = match state.result(fetch_key) {
            Some(seed) => (seed.clone(), self.schema.clone()),
            None => {
                let Some(entity) = self.schema.detail_entity() else {
                    return Ok(None);
                };
                let Some(id) = entity.id_of(params, None, None) else {
                    return Ok(None);
                };
                (ResultShape::Id(id), Schema::Entity(entity))
            }
        };

        let mut memo = self.memo.lock();
        if let Some(entry) = memo.get(fetch_key) {
            if entry.holds_in(&seed, state) {
                return Ok(entry.output.clone());
            }
        }

        let walked = denormalize(state, &seed, &schema, fetch_key)?;
        let output = walked.value.map(Arc::new);
        memo.insert(
            fetch_key.to_string(),
            MemoEntry {
                seed,
                deps: walked.deps,
                output: output.clone(),
            },
        );
        Ok(output)
    }

    /// [`select`](Self::select) under a staleness policy: when
    /// `invalid_if_stale` is set, a stale-but-present entry reads as
    /// not available, forcing the caller to refetch instead of
    /// rendering expired data.
    pub fn select_fresh(
        &self,
        state: &CacheState,
        fetch_key: &str,
        params: &Value,
        now: SystemTime,
        invalid_if_stale: bool,
    ) -> Result<Option<Arc<Value>>> {
        if invalid_if_stale && !state.is_fresh(fetch_key, now) {
            return Ok(None);
        }
        self.select(state, fetch_key, params)
    }

    /// The schema this selector reads through
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{Action, reduce};
    use crate::schema::EntitySchema;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn article() -> Arc<EntitySchema> {
        EntitySchema::new("Article").shared()
    }

    fn receive(fetch_key: &str, schema: &Schema, payload: Value) -> Action {
        Action::Receive {
            fetch_key: fetch_key.to_string(),
            schema: schema.clone(),
            payload,
            date: SystemTime::now(),
            expires_at: Some(SystemTime::now() + Duration::from_secs(60)),
        }
    }

    #[test]
    fn test_empty_state_is_none() {
        let selector = Selector::new(Schema::entity(&article())).unwrap();
        let out = selector
            .select(&CacheState::new(), "GET /article/5", &json!({ "id": 5 }))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_finds_value_through_results() {
        let schema = Schema::entity(&article());
        let selector = Selector::new(schema.clone()).unwrap();
        let payload = json!({ "id": 5, "title": "bob", "content": "head" });
        let state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, payload.clone()),
        )
        .unwrap();

        let out = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap();
        assert_eq!(*out.unwrap(), payload);
    }

    #[test]
    fn test_result_without_entity_is_none() {
        let schema = Schema::entity(&article());
        let selector = Selector::new(schema.clone()).unwrap();
        let mut state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, json!({ "id": 5 })),
        )
        .unwrap();
        state.entities.get_mut("Article").unwrap().remove("5");

        let out = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_primary_key_fallback() {
        let schema = Schema::entity(&article());
        let selector = Selector::new(schema.clone()).unwrap();
        // Entity cached under a different fetch key; no results entry
        // exists for the detail read yet.
        let payload = json!({ "id": 5, "title": "bob" });
        let state = reduce(
            &CacheState::new(),
            receive("POST /article/", &schema, payload.clone()),
        )
        .unwrap();

        let out = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap();
        assert_eq!(*out.unwrap(), payload);

        // Unknown id resolves to nothing.
        let out = selector
            .select(&state, "GET /article/543", &json!({ "id": 543 }))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_primary_key_fallback_through_nested_schema() {
        let entity = article();
        let schema = Schema::object([("data", Schema::entity(&entity))]);
        let selector = Selector::new(schema).unwrap();
        let payload = json!({ "id": 5, "title": "bob" });
        let state = reduce(
            &CacheState::new(),
            receive("POST /article/", &Schema::entity(&entity), payload.clone()),
        )
        .unwrap();

        // The fallback resolves the entity itself, skipping the wrapper.
        let out = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap();
        assert_eq!(*out.unwrap(), payload);
    }

    #[test]
    fn test_no_fallback_for_list_schema() {
        let selector = Selector::new(Schema::list(Schema::entity(&article()))).unwrap();
        let state = reduce(
            &CacheState::new(),
            receive(
                "POST /article/",
                &Schema::entity(&article()),
                json!({ "id": 5 }),
            ),
        )
        .unwrap();

        let out = selector
            .select(&state, "GET /article/", &json!({}))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_corrupt_result_shape_is_loud() {
        let schema = Schema::entity(&article());
        let selector = Selector::new(schema).unwrap();

        let mut state = CacheState::new();
        state.results.insert(
            "GET /article/5".to_string(),
            ResultShape::List(vec![
                ResultShape::Id("5".to_string()),
                ResultShape::Id("6".to_string()),
            ]),
        );
        let err = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap_err();
        assert!(matches!(err, CacheError::ShapeMismatch { .. }));

        state.results.insert(
            "GET /article/5".to_string(),
            ResultShape::Object(BTreeMap::from([(
                "results".to_string(),
                ResultShape::Id("5".to_string()),
            )])),
        );
        let err = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap_err();
        assert!(matches!(err, CacheError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_invalid_schema_rejected_at_construction() {
        let err = Selector::new(Schema::object([(
            "happy",
            Schema::object([("go", Schema::list(Schema::Object(BTreeMap::new())))]),
        )]))
        .unwrap_err();
        assert!(matches!(err, CacheError::InvalidSchema(_)));
    }

    #[test]
    fn test_referential_stability() {
        let schema = Schema::entity(&article());
        let selector = Selector::new(schema.clone()).unwrap();
        let state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, json!({ "id": 5, "title": "bob" })),
        )
        .unwrap();

        let first = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap()
            .unwrap();
        let again = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // An update to an unrelated entity type leaves the output alone.
        let user_schema = Schema::entity(&EntitySchema::new("User").shared());
        let unrelated = reduce(
            &state,
            receive("GET /user/23", &user_schema, json!({ "id": 23 })),
        )
        .unwrap();
        let after_unrelated = selector
            .select(&unrelated, "GET /article/5", &json!({ "id": 5 }))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &after_unrelated));

        // An update to the dependency itself produces a new value.
        let updated = reduce(
            &unrelated,
            receive(
                "PATCH /article/5",
                &schema,
                json!({ "id": 5, "title": "sam" }),
            ),
        )
        .unwrap();
        let after_update = selector
            .select(&updated, "GET /article/5", &json!({ "id": 5 }))
            .unwrap()
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &after_update));
        assert_eq!(*after_update, json!({ "id": 5, "title": "sam" }));
    }

    #[test]
    fn test_stability_through_nested_dependency() {
        let entity = article();
        let user = EntitySchema::new("User").shared();
        entity.define("author", Schema::entity(&user));
        let schema = Schema::entity(&entity);
        let selector = Selector::new(schema.clone()).unwrap();

        let state = reduce(
            &CacheState::new(),
            receive(
                "GET /article/5",
                &schema,
                json!({ "id": 5, "author": { "id": 23, "username": "anne" } }),
            ),
        )
        .unwrap();
        let first = selector
            .select(&state, "GET /article/5", &json!({ "id": 5 }))
            .unwrap()
            .unwrap();

        // Updating the nested author must invalidate the article read.
        let updated = reduce(
            &state,
            receive(
                "GET /user/23",
                &Schema::entity(&user),
                json!({ "id": 23, "username": "anne2" }),
            ),
        )
        .unwrap();
        let after = selector
            .select(&updated, "GET /article/5", &json!({ "id": 5 }))
            .unwrap()
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &after));
        assert_eq!(after["author"]["username"], json!("anne2"));
    }

    #[test]
    fn test_select_fresh_staleness_policy() {
        let schema = Schema::entity(&article());
        let selector = Selector::new(schema.clone()).unwrap();
        let date = SystemTime::now();
        let state = reduce(
            &CacheState::new(),
            Action::Receive {
                fetch_key: "GET /article/5".to_string(),
                schema: schema.clone(),
                payload: json!({ "id": 5 }),
                date,
                expires_at: Some(date + Duration::from_secs(5)),
            },
        )
        .unwrap();
        let later = date + Duration::from_secs(6);

        // invalid_if_stale hides expired data and forces a refetch.
        let out = selector
            .select_fresh(&state, "GET /article/5", &json!({ "id": 5 }), later, true)
            .unwrap();
        assert!(out.is_none());

        // Without the flag the stale value is still served.
        let out = selector
            .select_fresh(&state, "GET /article/5", &json!({ "id": 5 }), later, false)
            .unwrap();
        assert!(out.is_some());
    }
}
