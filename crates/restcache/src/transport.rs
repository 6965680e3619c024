//! Transport collaborator trait
//!
//! The cache never issues HTTP itself; it hands a method, URL and
//! optional body to a [`Transport`] and reacts to the parsed-JSON
//! success or failure. Status codes, headers, retries and timeouts
//! are all the transport's business.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use restcache_core::FetchError;

/// HTTP method of a request shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Uppercase wire form, also used in fetch keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performs one network operation, resolving with a parsed JSON body
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue the request and parse its body as JSON
    async fn perform_fetch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, FetchError>;
}
