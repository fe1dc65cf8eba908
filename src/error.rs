//! Error types for the portal cache
//!
//! Provides unified error handling using thiserror. Cache tiers report
//! `StoreError` internally and never hand it to callers; the data-access
//! facade surfaces `PortalError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Remote Error Enum ==
/// Failures reported by the remote document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The requested document does not exist
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// The store refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Network or service failure
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

// == Store Error Enum ==
/// Failures inside a cache tier's backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write would exceed the store's byte quota
    #[error("Quota exceeded writing {key}: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    /// The store could not be opened or is not usable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored entry could not be decoded
    #[error("Corrupted entry {key}: {reason}")]
    Corrupted { key: String, reason: String },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

// == Portal Error Enum ==
/// Unified error type for the data-access facade.
///
/// `Clone` because a single outcome is broadcast to every caller sharing a
/// deduplicated request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data, rejected before any remote write
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The remote store failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Internal(format!("serialization failed: {}", err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = match &self {
            PortalError::NotFound(_) => StatusCode::NOT_FOUND,
            PortalError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PortalError::Remote(RemoteError::NotFound { .. }) => StatusCode::NOT_FOUND,
            PortalError::Remote(RemoteError::PermissionDenied(_)) => StatusCode::FORBIDDEN,
            PortalError::Remote(RemoteError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            PortalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the portal.
pub type Result<T> = std::result::Result<T, PortalError>;
