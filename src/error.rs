//! Error types for the tiered cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Store Error Enum ==
/// Failures reported by a memory or persistent store collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry does not fit the store's per-item limit
    #[error("entry of {size} bytes exceeds the {limit} byte limit")]
    ValueTooLarge { size: usize, limit: usize },

    /// Key cannot be represented by the store
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key is not held by the store
    #[error("key not found: {0}")]
    NotFound(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache facade.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bad constructor or enable arguments
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The persistent tier could not be opened
    #[error("error creating disk cache: {0}")]
    StoreInit(#[source] StoreError),

    /// The memory tier rejected a write
    #[error("error setting key {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Reserved extension point
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Lifecycle call made from the wrong tier state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Key not found in either tier (HTTP layer only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data (HTTP layer only)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::InvalidConfiguration(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Write { source, .. } => match source {
                StoreError::ValueTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            CacheError::InvalidState(_) => StatusCode::CONFLICT,
            CacheError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            CacheError::StoreInit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
