//! Single-flight fetch coordinator
//!
//! At most one network operation is in flight per fetch key;
//! concurrent callers for the same key join the pending operation and
//! observe the same outcome. The operation itself runs detached:
//! callers abandoning interest never abort it, so its result still
//! lands in the cache for other observers. Settlement feeds the
//! reducer before waiters resume.

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use restcache_core::{Action, CacheError, FetchError};

use crate::shape::{RequestShape, ShapeKind};
use crate::store::CacheStore;

/// Shared outcome of one coalesced fetch: the raw payload, or the
/// error every waiter observes
pub type FetchOutcome = std::result::Result<Value, CacheError>;

/// Process-wide table of pending operations, keyed by fetch key
#[derive(Clone, Default)]
pub struct FetchCoordinator {
    inflight: Arc<DashMap<String, broadcast::Sender<FetchOutcome>>>,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Whether an operation is currently in flight for `fetch_key`
    pub fn is_pending(&self, fetch_key: &str) -> bool {
        self.inflight.contains_key(fetch_key)
    }

    /// Join or start the fetch for `shape` + `params`.
    ///
    /// If an operation is already pending for the fetch key, wait on
    /// it. Otherwise run `perform` in a detached task; on settlement
    /// the entry is removed, the matching receive/error/invalidate
    /// transition is dispatched to `store`, and the outcome fans out
    /// to every waiter.
    pub async fn acquire<F, Fut>(
        &self,
        store: Arc<CacheStore>,
        shape: &RequestShape,
        params: &Value,
        perform: F,
    ) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, FetchError>> + Send + 'static,
    {
        let fetch_key = shape.fetch_key(params);

        // Scoped so the map entry lock drops before awaiting.
        let role = {
            match self.inflight.entry(fetch_key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(pending) => {
                    Ok(pending.get().subscribe())
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    let (tx, rx) = broadcast::channel(1);
                    slot.insert(tx.clone());
                    Err((tx, rx))
                }
            }
        };

        let mut rx = match role {
            Ok(rx) => {
                trace!(fetch_key = %fetch_key, "joining in-flight fetch");
                rx
            }
            Err((tx, rx)) => {
                let kind = shape.kind;
                let schema = shape.schema.clone();
                let data_expiry = shape.options.data_expiry;
                let error_expiry = shape.options.error_expiry;
                let invalidated = shape.invalidated_fetch_key(params);
                let inflight = self.inflight.clone();
                let key = fetch_key.clone();
                let fut = perform();

                // Detached: caller cancellation must not abort the
                // network operation or lose its cache update.
                tokio::spawn(async move {
                    let result = fut.await;
                    let date = SystemTime::now();
                    let outcome: FetchOutcome = match result {
                        Ok(payload) => {
                            let action = match kind {
                                ShapeKind::Read | ShapeKind::Mutate => Action::Receive {
                                    fetch_key: key.clone(),
                                    schema,
                                    payload: payload.clone(),
                                    date,
                                    expires_at: data_expiry.map(|expiry| date + expiry),
                                },
                                ShapeKind::Delete => Action::Invalidate {
                                    fetch_key: invalidated.unwrap_or_else(|| key.clone()),
                                },
                            };
                            match store.dispatch(action) {
                                Ok(()) => Ok(payload),
                                Err(e) => {
                                    warn!(fetch_key = %key, error = %e, "commit of fetch result failed");
                                    Err(e)
                                }
                            }
                        }
                        Err(error) => {
                            warn!(fetch_key = %key, error = %error, "fetch failed");
                            let _ = store.dispatch(Action::ReceiveError {
                                fetch_key: key.clone(),
                                error: error.clone(),
                                date,
                                error_expiry,
                            });
                            Err(CacheError::Fetch(error))
                        }
                    };

                    // Remove before fan-out so a late joiner starts a
                    // fresh operation instead of waiting forever.
                    inflight.remove(&key);
                    if tx.receiver_count() > 0 {
                        let _ = tx.send(outcome);
                    }
                });
                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            // Leader task dropped without sending (panic); surfaced as
            // a transport-level failure so the key stays retryable.
            Err(_) => Err(CacheError::Fetch(FetchError::new(
                "in-flight fetch dropped before settling",
            ))),
        }
    }
}
