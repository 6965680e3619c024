//! Error types for cache operations

use thiserror::Error;

/// Main error type for all cache operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// An entity schema could not derive an identity from a record.
    ///
    /// Almost always means a malformed response: an entity without a
    /// usable identity cannot be addressed in the entity table.
    #[error("missing usable identity while normalizing entity '{entity}'")]
    MissingIdentity { entity: String },

    /// A value's shape disagrees with the schema it is read through
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A selector was constructed with a schema it cannot resolve
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Transport failure, recorded into fetch metadata rather than thrown
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// A failed network completion.
///
/// Stored in `meta[fetch_key].error` as recoverable cache state: the
/// same fetch key may be retried once its error expiry elapses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct FetchError {
    /// Human-readable failure description from the transport
    pub message: String,
    /// HTTP status code, when the transport saw one
    pub status: Option<u16>,
}

impl FetchError {
    /// Create a transport error without a status code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Create a transport error carrying an HTTP status
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
