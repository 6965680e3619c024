//! State container and high-level client
//!
//! [`CacheStore`] is the single logical owner of cache state per
//! application instance: dispatches are serialized through one write
//! lock and each produces a wholesale replacement snapshot. Readers
//! take cheap `Arc` snapshots and never block each other.
//!
//! [`CacheClient`] ties the store, a transport and the single-flight
//! coordinator together into the read/mutate entry points.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use restcache_core::{Action, CacheState, Result, Selector, reduce};

use crate::coordinator::{FetchCoordinator, FetchOutcome};
use crate::shape::RequestShape;
use crate::transport::Transport;

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::Request { .. } => "request",
        Action::Receive { .. } => "receive",
        Action::ReceiveError { .. } => "receive_error",
        Action::Invalidate { .. } => "invalidate",
        Action::Reset => "reset",
    }
}

/// The single owner of cache state
#[derive(Debug)]
pub struct CacheStore {
    state: RwLock<Arc<CacheState>>,
}

impl CacheStore {
    /// Create a store holding the empty state
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(CacheState::new())),
        }
    }

    /// The current immutable snapshot
    pub fn snapshot(&self) -> Arc<CacheState> {
        self.state.read().clone()
    }

    /// Apply one transition.
    ///
    /// The write lock serializes transitions in dispatch order. On
    /// error the previous snapshot stays in place untouched.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        let mut guard = self.state.write();
        debug!(action = action_name(&action), "dispatch");
        let next = reduce(&guard, action)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// High-level cache client over a transport
pub struct CacheClient<T: Transport> {
    store: Arc<CacheStore>,
    transport: Arc<T>,
    coordinator: FetchCoordinator,
}

impl<T: Transport> CacheClient<T> {
    /// Create a client with a fresh store
    pub fn new(transport: T) -> Self {
        Self::with_store(transport, Arc::new(CacheStore::new()))
    }

    /// Create a client over an existing store
    pub fn with_store(transport: T, store: Arc<CacheStore>) -> Self {
        Self {
            store,
            transport: Arc::new(transport),
            coordinator: FetchCoordinator::new(),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// The current immutable snapshot
    pub fn snapshot(&self) -> Arc<CacheState> {
        self.store.snapshot()
    }

    /// Apply one transition directly
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.store.dispatch(action)
    }

    /// Issue (or join) the fetch for `shape` + `params`.
    ///
    /// Single-flight per fetch key: concurrent callers share one
    /// network operation and observe the same outcome. Completion
    /// feeds the reducer before callers resume.
    pub async fn fetch(
        &self,
        shape: &RequestShape,
        params: &Value,
        body: Option<Value>,
    ) -> FetchOutcome {
        let url = shape.url(params);
        let method = shape.method;
        let transport = self.transport.clone();
        self.coordinator
            .acquire(self.store.clone(), shape, params, move || async move {
                transport.perform_fetch(method, &url, body.as_ref()).await
            })
            .await
    }

    /// Read the denormalized value for `shape` + `params`.
    ///
    /// Fresh cache hits return immediately. Stale-but-present data is
    /// served as-is unless the shape sets `invalid_if_stale`, in which
    /// case (as for a miss) the coalesced fetch is awaited first and
    /// the value is selected from the updated snapshot. A fresh *error*
    /// completion reads as `Ok(None)` until its error expiry elapses;
    /// callers can inspect `meta` for the recorded failure.
    pub async fn read(
        &self,
        shape: &RequestShape,
        selector: &Selector,
        params: &Value,
    ) -> Result<Option<Arc<Value>>> {
        let fetch_key = shape.fetch_key(params);
        let state = self.snapshot();
        let now = SystemTime::now();

        if state.is_fresh(&fetch_key, now) {
            return selector.select(&state, &fetch_key, params);
        }
        // Stale or never fetched: the staleness policy in select_fresh
        // decides whether the old value is still servable.
        if let Some(value) = selector.select_fresh(
            &state,
            &fetch_key,
            params,
            now,
            shape.options.invalid_if_stale,
        )? {
            return Ok(Some(value));
        }

        self.fetch(shape, params, None).await?;
        let state = self.snapshot();
        selector.select(&state, &fetch_key, params)
    }
}

impl<T: Transport> Clone for CacheClient<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: self.transport.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}
