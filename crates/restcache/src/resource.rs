//! Resource definitions
//!
//! A [`Resource`] is a plain data record describing one REST resource:
//! its entity key, URL root, schema and default request options.
//! Variations (custom ids, nested relations, different expiries) are
//! composed by overriding fields, not by subclassing. Each shape
//! constructor conforms to common REST patterns: detail under
//! `<root><pk>`, lists under `<root>` with sorted query parameters.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use url::form_urlencoded;

use restcache_core::{EntitySchema, Schema};

use crate::registry::SchemaRegistry;
use crate::shape::{RequestOptions, RequestShape, ShapeKind};
use crate::transport::Method;

/// One REST resource as a data record
#[derive(Debug, Clone)]
pub struct Resource {
    key: String,
    url_root: String,
    schema: Arc<EntitySchema>,
    options: RequestOptions,
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

impl Resource {
    /// Define a resource with a default entity schema and options.
    ///
    /// The entity key doubles as the resource key.
    pub fn new(key: impl Into<String>, url_root: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            schema: EntitySchema::new(key.clone()).shared(),
            key,
            url_root: url_root.into(),
            options: RequestOptions::default(),
        }
    }

    /// Define a resource whose entity schema is shared through
    /// `registry`: every resource built against the same registry and
    /// key resolves to one schema instance, so records normalize into
    /// one entity table no matter which definition fetched them.
    pub fn with_registry(
        key: impl Into<String>,
        url_root: impl Into<String>,
        registry: &SchemaRegistry,
    ) -> Self {
        let key = key.into();
        Self {
            schema: registry.register(EntitySchema::new(key.clone()).shared()),
            key,
            url_root: url_root.into(),
            options: RequestOptions::default(),
        }
    }

    /// Override the entity schema (custom id extraction, relations...)
    pub fn with_schema(mut self, schema: Arc<EntitySchema>) -> Self {
        self.schema = schema;
        self
    }

    /// Override the default request options for every shape
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// The resource's globally unique key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The entity schema records of this resource normalize into
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// URL for a single record: explicit `url` param wins, then the
    /// primary key derived from params, else the root
    pub fn url(&self, params: &Value) -> String {
        if let Some(Value::String(explicit)) = params.get("url") {
            return explicit.clone();
        }
        match self.schema.id_of(params, None, None) {
            Some(id) => format!("{}{}", self.url_root, id),
            None => self.url_root.clone(),
        }
    }

    /// URL for a collection, with canonically sorted query parameters
    pub fn list_url(&self, params: &Value) -> String {
        let pairs: BTreeMap<String, String> = match params {
            Value::Object(map) if !map.is_empty() => map
                .iter()
                .map(|(k, v)| (k.clone(), query_value(v)))
                .collect(),
            _ => return self.url_root.clone(),
        };
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
        format!("{}?{}", self.url_root, query.finish())
    }

    /// Shape to get a single record
    pub fn detail_shape(&self) -> RequestShape {
        let this = self.clone();
        RequestShape::new(
            ShapeKind::Read,
            Method::Get,
            Schema::entity(&self.schema),
            self.options.clone(),
            move |params| this.url(params),
        )
    }

    /// Shape to get a list of records
    pub fn list_shape(&self) -> RequestShape {
        let this = self.clone();
        RequestShape::new(
            ShapeKind::Read,
            Method::Get,
            Schema::list(Schema::entity(&self.schema)),
            self.options.clone(),
            move |params| this.list_url(params),
        )
    }

    /// Shape to create a record (POST to the collection)
    pub fn create_shape(&self) -> RequestShape {
        let this = self.clone();
        RequestShape::new(
            ShapeKind::Mutate,
            Method::Post,
            Schema::entity(&self.schema),
            self.options.clone(),
            move |params| this.list_url(params),
        )
    }

    /// Shape to replace a record (PUT)
    pub fn update_shape(&self) -> RequestShape {
        let this = self.clone();
        RequestShape::new(
            ShapeKind::Mutate,
            Method::Put,
            Schema::entity(&self.schema),
            self.options.clone(),
            move |params| this.url(params),
        )
    }

    /// Shape to update a subset of fields (PATCH)
    pub fn partial_update_shape(&self) -> RequestShape {
        let this = self.clone();
        RequestShape::new(
            ShapeKind::Mutate,
            Method::Patch,
            Schema::entity(&self.schema),
            self.options.clone(),
            move |params| this.url(params),
        )
    }

    /// Shape to delete a record; completion invalidates the detail read
    pub fn delete_shape(&self) -> RequestShape {
        let this = self.clone();
        let detail = self.clone();
        RequestShape::new(
            ShapeKind::Delete,
            Method::Delete,
            Schema::entity(&self.schema),
            self.options.clone(),
            move |params| this.url(params),
        )
        .invalidates(move |params| format!("GET {}", detail.url(params)))
    }
}
