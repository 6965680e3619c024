//! Pure state-transition function
//!
//! `reduce(state, action)` is the only way entities, results and meta
//! change. Transitions are total for structurally valid actions;
//! malformed schema/payload combinations fail in the normalization
//! engine before any replacement state exists, so a reducer error
//! never leaves a partially-applied snapshot behind.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::error::{FetchError, Result};
use crate::normalize::normalize;
use crate::schema::{Schema, merge_defined};
use crate::state::{CacheState, FetchMeta};

/// A cache state transition
#[derive(Debug)]
pub enum Action {
    /// Mark a fetch as issued. No committed state changes; in-flight
    /// tracking lives in the fetch coordinator.
    Request { fetch_key: String },
    /// A fetch completed successfully with `payload`
    Receive {
        fetch_key: String,
        schema: Schema,
        payload: Value,
        date: SystemTime,
        /// `None` never expires
        expires_at: Option<SystemTime>,
    },
    /// A fetch failed; the error becomes meta state, retryable after
    /// `error_expiry`
    ReceiveError {
        fetch_key: String,
        error: FetchError,
        date: SystemTime,
        error_expiry: Duration,
    },
    /// Drop freshness metadata so the next read refetches. Results and
    /// entities survive, so stale-tolerant readers can still render.
    Invalidate { fetch_key: String },
    /// Clear all three tables
    Reset,
}

/// Whether `date` is older than the last completion recorded for the
/// key. An old slow response must never clobber a newer fast one.
fn regressed(state: &CacheState, fetch_key: &str, date: SystemTime) -> bool {
    state.meta.get(fetch_key).is_some_and(|meta| date < meta.date)
}

/// Apply one action, producing the replacement snapshot
pub fn reduce(state: &CacheState, action: Action) -> Result<CacheState> {
    match action {
        Action::Request { .. } => Ok(state.clone()),
        Action::Receive {
            fetch_key,
            schema,
            payload,
            date,
            expires_at,
        } => {
            if regressed(state, &fetch_key, date) {
                return Ok(state.clone());
            }

            // Normalize before touching any table.
            let normalized = normalize(&payload, &schema)?;
            let mergers = schema.entity_schemas();

            let mut next = state.clone();
            for (entity_key, records) in normalized.entities {
                let merger = mergers.get(&entity_key).cloned();
                let table = next.entities.entry(entity_key).or_default();
                for (id, incoming) in records {
                    let record = match table.get(&id) {
                        Some(existing) => {
                            let merged = match &merger {
                                Some(entity) => entity.merge(existing, &incoming),
                                None => merge_defined(existing, &incoming),
                            };
                            // Keep the existing allocation when the merge
                            // changed nothing: selector memoization relies
                            // on pointer identity meaning "unchanged".
                            if merged == **existing {
                                Arc::clone(existing)
                            } else {
                                Arc::new(merged)
                            }
                        }
                        None => Arc::new(incoming),
                    };
                    table.insert(id, record);
                }
            }
            next.results.insert(fetch_key.clone(), normalized.result);
            next.meta.insert(
                fetch_key,
                FetchMeta {
                    date,
                    expires_at,
                    error: None,
                },
            );
            Ok(next)
        }
        Action::ReceiveError {
            fetch_key,
            error,
            date,
            error_expiry,
        } => {
            if regressed(state, &fetch_key, date) {
                return Ok(state.clone());
            }
            let mut next = state.clone();
            next.meta.insert(
                fetch_key,
                FetchMeta {
                    date,
                    expires_at: Some(date + error_expiry),
                    error: Some(error),
                },
            );
            Ok(next)
        }
        Action::Invalidate { fetch_key } => {
            let mut next = state.clone();
            next.meta.remove(&fetch_key);
            Ok(next)
        }
        Action::Reset => Ok(CacheState::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntitySchema;
    use crate::state::ResultShape;
    use serde_json::json;

    fn receive(fetch_key: &str, schema: &Schema, payload: Value, date: SystemTime) -> Action {
        Action::Receive {
            fetch_key: fetch_key.to_string(),
            schema: schema.clone(),
            payload,
            date,
            expires_at: Some(date + Duration::from_secs(60)),
        }
    }

    #[test]
    fn test_receive_populates_all_tables() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let now = SystemTime::now();
        let state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, json!({ "id": 5, "title": "hi" }), now),
        )
        .unwrap();

        assert_eq!(
            **state.entity("Article", "5").unwrap(),
            json!({ "id": 5, "title": "hi" })
        );
        assert_eq!(
            state.result("GET /article/5"),
            Some(&ResultShape::Id("5".to_string()))
        );
        let meta = state.meta("GET /article/5").unwrap();
        assert_eq!(meta.date, now);
        assert!(meta.error.is_none());
    }

    #[test]
    fn test_merge_idempotence_keeps_allocation() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let now = SystemTime::now();
        let payload = json!({ "id": 5, "title": "hi" });

        let first = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, payload.clone(), now),
        )
        .unwrap();
        let second = reduce(
            &first,
            receive("GET /article/5", &schema, payload, now + Duration::from_secs(1)),
        )
        .unwrap();

        assert!(Arc::ptr_eq(
            first.entity("Article", "5").unwrap(),
            second.entity("Article", "5").unwrap()
        ));
    }

    #[test]
    fn test_partial_merge() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let now = SystemTime::now();

        let state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, json!({ "id": 5, "title": "A" }), now),
        )
        .unwrap();
        let state = reduce(
            &state,
            receive(
                "PATCH /article/5",
                &schema,
                json!({ "id": 5, "content": "B" }),
                now + Duration::from_secs(1),
            ),
        )
        .unwrap();

        assert_eq!(
            **state.entity("Article", "5").unwrap(),
            json!({ "id": 5, "title": "A", "content": "B" })
        );
    }

    #[test]
    fn test_receive_error_touches_only_meta() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let now = SystemTime::now();
        let state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, json!({ "id": 5 }), now),
        )
        .unwrap();

        let errored = reduce(
            &state,
            Action::ReceiveError {
                fetch_key: "GET /article/5".to_string(),
                error: FetchError::with_status("boom", 500),
                date: now + Duration::from_secs(2),
                error_expiry: Duration::from_secs(1),
            },
        )
        .unwrap();

        assert!(errored.entity("Article", "5").is_some());
        assert!(errored.result("GET /article/5").is_some());
        let meta = errored.meta("GET /article/5").unwrap();
        assert_eq!(meta.error.as_ref().unwrap().status, Some(500));
        assert_eq!(meta.expires_at, Some(now + Duration::from_secs(3)));
    }

    #[test]
    fn test_success_clears_prior_error() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let now = SystemTime::now();

        let state = reduce(
            &CacheState::new(),
            Action::ReceiveError {
                fetch_key: "GET /article/5".to_string(),
                error: FetchError::new("boom"),
                date: now,
                error_expiry: Duration::from_secs(1),
            },
        )
        .unwrap();
        let state = reduce(
            &state,
            receive(
                "GET /article/5",
                &schema,
                json!({ "id": 5 }),
                now + Duration::from_secs(1),
            ),
        )
        .unwrap();

        assert!(state.meta("GET /article/5").unwrap().error.is_none());
    }

    #[test]
    fn test_invalidate_drops_meta_only() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let now = SystemTime::now();
        let state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, json!({ "id": 5 }), now),
        )
        .unwrap();

        let state = reduce(
            &state,
            Action::Invalidate {
                fetch_key: "GET /article/5".to_string(),
            },
        )
        .unwrap();

        assert!(state.meta("GET /article/5").is_none());
        assert!(state.result("GET /article/5").is_some());
        assert!(state.entity("Article", "5").is_some());
    }

    #[test]
    fn test_stale_completion_is_rejected() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let now = SystemTime::now();

        let state = reduce(
            &CacheState::new(),
            receive(
                "GET /article/5",
                &schema,
                json!({ "id": 5, "title": "new" }),
                now,
            ),
        )
        .unwrap();
        // A fetch that started earlier settles later: its date regresses.
        let state = reduce(
            &state,
            receive(
                "GET /article/5",
                &schema,
                json!({ "id": 5, "title": "old" }),
                now - Duration::from_secs(10),
            ),
        )
        .unwrap();

        assert_eq!(
            **state.entity("Article", "5").unwrap(),
            json!({ "id": 5, "title": "new" })
        );
    }

    #[test]
    fn test_reset_clears_everything() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let state = reduce(
            &CacheState::new(),
            receive("GET /article/5", &schema, json!({ "id": 5 }), SystemTime::now()),
        )
        .unwrap();

        let state = reduce(&state, Action::Reset).unwrap();
        assert!(state.entities.is_empty());
        assert!(state.results.is_empty());
        assert!(state.meta.is_empty());
    }

    #[test]
    fn test_malformed_payload_leaves_state_untouched() {
        let schema = Schema::entity(&EntitySchema::new("Article").shared());
        let state = CacheState::new();
        let err = reduce(
            &state,
            receive("GET /article/5", &schema, json!({ "title": "no id" }), SystemTime::now()),
        )
        .unwrap_err();

        assert!(matches!(err, crate::error::CacheError::MissingIdentity { .. }));
        assert!(state.entities.is_empty());
    }
}
