//! Explicit schema registry
//!
//! Maps resource keys to shared entity schemas so that every resource
//! definition referring to the same key resolves to the same schema
//! instance. Owned by application configuration with explicit
//! init/teardown, replacing any implicit process-wide cache. Resource
//! definitions opt in via [`Resource::with_registry`].
//!
//! [`Resource::with_registry`]: crate::resource::Resource::with_registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use restcache_core::EntitySchema;

/// Resource key -> shared entity schema
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: RwLock<HashMap<String, Arc<EntitySchema>>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its own key, returning the instance to
    /// use. If the key is already registered, the existing schema wins
    /// so all holders share one identity.
    pub fn register(&self, schema: Arc<EntitySchema>) -> Arc<EntitySchema> {
        let mut entries = self.entries.write();
        entries
            .entry(schema.key().to_string())
            .or_insert(schema)
            .clone()
    }

    /// Look up the schema for a resource key
    pub fn get(&self, key: &str) -> Option<Arc<EntitySchema>> {
        self.entries.read().get(key).cloned()
    }

    /// Number of registered schemas
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry holds no schemas
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Teardown: drop every registration
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
