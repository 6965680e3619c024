//! Request shapes and per-shape options
//!
//! A [`RequestShape`] is a stateless value object describing one
//! logical operation: its schema, how to build its URL and fetch key,
//! and its freshness policy. Shapes are built by [`Resource`]
//! constructors but can be composed or overridden field by field.
//!
//! [`Resource`]: crate::resource::Resource

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use restcache_core::Schema;

use crate::transport::Method;

/// What a shape's completion does to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// GET single/list; completion feeds a receive transition
    Read,
    /// Create/update/partial-update; completion also feeds receive
    Mutate,
    /// Delete; completion invalidates the corresponding detail read
    Delete,
}

/// Freshness policy and scheduling hints for one shape
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// How long a successful completion stays fresh; `None` forever
    pub data_expiry: Option<Duration>,
    /// How long a failed completion blocks retries
    pub error_expiry: Duration,
    /// Polling interval hint for the view layer
    pub poll_frequency: Option<Duration>,
    /// When set, stale entries read as missing and force a refetch
    /// instead of being served
    pub invalid_if_stale: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            data_expiry: Some(Duration::from_secs(60)),
            error_expiry: Duration::from_secs(1),
            poll_frequency: None,
            invalid_if_stale: false,
        }
    }
}

impl RequestOptions {
    /// Set the data freshness window
    pub fn data_expiry(mut self, duration: Duration) -> Self {
        self.data_expiry = Some(duration);
        self
    }

    /// Successful completions never go stale
    pub fn never_expires(mut self) -> Self {
        self.data_expiry = None;
        self
    }

    /// Set the error retry-block window
    pub fn error_expiry(mut self, duration: Duration) -> Self {
        self.error_expiry = duration;
        self
    }

    /// Set the polling interval hint
    pub fn poll_frequency(mut self, duration: Duration) -> Self {
        self.poll_frequency = Some(duration);
        self
    }

    /// Treat stale entries as missing
    pub fn invalid_if_stale(mut self) -> Self {
        self.invalid_if_stale = true;
        self
    }
}

/// Builds a URL (or fetch key) from request params
pub type UrlBuilder = dyn Fn(&Value) -> String + Send + Sync;

/// Declarative description of one operation against the API
#[derive(Clone)]
pub struct RequestShape {
    pub kind: ShapeKind,
    pub method: Method,
    pub schema: Schema,
    pub options: RequestOptions,
    url: Arc<UrlBuilder>,
    // Fetch key this shape's completion invalidates (delete shapes)
    invalidates: Option<Arc<UrlBuilder>>,
}

impl RequestShape {
    /// Assemble a shape from its parts
    pub fn new<F>(
        kind: ShapeKind,
        method: Method,
        schema: Schema,
        options: RequestOptions,
        url: F,
    ) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        Self {
            kind,
            method,
            schema,
            options,
            url: Arc::new(url),
            invalidates: None,
        }
    }

    /// Declare the fetch key this shape's completion invalidates
    pub fn invalidates<F>(mut self, fetch_key: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.invalidates = Some(Arc::new(fetch_key));
        self
    }

    /// Replace the schema (e.g. to include nested relations)
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Replace the options
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// The URL this shape targets for `params`
    pub fn url(&self, params: &Value) -> String {
        (self.url)(params)
    }

    /// The deterministic key identifying this logical request.
    ///
    /// Pure function of (shape, params): method plus canonical URL.
    pub fn fetch_key(&self, params: &Value) -> String {
        format!("{} {}", self.method, self.url(params))
    }

    /// Fetch key invalidated when this shape completes, if any
    pub fn invalidated_fetch_key(&self, params: &Value) -> Option<String> {
        self.invalidates.as_ref().map(|f| f(params))
    }
}

impl fmt::Debug for RequestShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestShape")
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("schema", &self.schema)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
