//! restcache-core: normalization engine, cache state and selectors
//!
//! The pure, synchronous heart of restcache: schemas describe how
//! nested JSON maps onto typed entities, the normalization engine
//! flattens payloads into per-type tables, a pure reducer applies
//! request/receive/error/invalidate transitions over immutable state
//! snapshots, and memoized selectors reconstruct object graphs with
//! referentially stable outputs.
//!
//! Everything here is CPU-bound, reentrant and side-effect-free; the
//! async fetch layer lives in the `restcache` crate.

mod denormalize;
mod error;
mod normalize;
mod reducer;
mod schema;
mod selector;
mod state;

pub use denormalize::{Denormalized, Dep, denormalize};
pub use error::{CacheError, FetchError, Result};
pub use normalize::{Normalized, normalize};
pub use reducer::{Action, reduce};
pub use schema::{
    EntitySchema, IdExtractor, MergeStrategy, ProcessStrategy, Schema, canonical_id, merge_defined,
};
pub use selector::Selector;
pub use state::{CacheState, EntityTable, FetchMeta, ResultShape};
