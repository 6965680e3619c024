//! restcache: normalized client-side cache for REST APIs
//!
//! # Features
//!
//! - **Normalized entity store**: nested JSON responses are flattened
//!   into per-type tables keyed by identity, so one record has one
//!   source of truth no matter how many responses embed it
//! - **Memoized denormalization** with referentially stable outputs
//! - **Single-flight fetching**: concurrent reads of one logical
//!   request share a single network operation
//! - **Per-shape staleness policy** (data/error expiries,
//!   `invalid_if_stale`)
//!
//! # Quick start
//!
//! ```rust,no_run
//! use restcache::prelude::*;
//! use serde_json::json;
//!
//! # struct HttpTransport;
//! # #[async_trait::async_trait]
//! # impl Transport for HttpTransport {
//! #     async fn perform_fetch(
//! #         &self,
//! #         _method: Method,
//! #         _url: &str,
//! #         _body: Option<&serde_json::Value>,
//! #     ) -> std::result::Result<serde_json::Value, FetchError> {
//! #         unimplemented!()
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let articles = Resource::new("Article", "http://example.com/article/");
//!     let client = CacheClient::new(HttpTransport);
//!
//!     let shape = articles.detail_shape();
//!     let selector = Selector::new(shape.schema.clone())?;
//!     if let Some(article) = client.read(&shape, &selector, &json!({ "id": 5 })).await? {
//!         println!("{article}");
//!     }
//!     Ok(())
//! }
//! ```

mod coordinator;
mod registry;
mod resource;
mod shape;
mod store;
mod transport;

// Re-export core
pub use restcache_core::*;

pub use coordinator::{FetchCoordinator, FetchOutcome};
pub use registry::SchemaRegistry;
pub use resource::Resource;
pub use shape::{RequestOptions, RequestShape, ShapeKind, UrlBuilder};
pub use store::{CacheClient, CacheStore};
pub use transport::{Method, Transport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Action, CacheClient, CacheError, CacheState, CacheStore, EntitySchema, FetchError, Method,
        RequestOptions, RequestShape, Resource, Result, Schema, SchemaRegistry, Selector,
        ShapeKind, Transport,
    };
}
