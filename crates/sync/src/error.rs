//! Error types for the sync engine.
//!
//! None of these are fatal to a shopping session: the engine logs and
//! swallows remote and cache failures, falling back to the device-local
//! state. They are surfaced as `Result`s at the component boundaries so
//! callers and tests can observe them.

use thiserror::Error;

use atelier_core::ProductId;

use crate::config::ConfigError;
use crate::engine::TransitionError;

/// Errors talking to the remote per-user document store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// A document could not be encoded or decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A document is not a JSON object.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The store URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The store is unreachable or refused the operation.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

/// Errors reading or writing the device-local cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the catalog collaborator.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog parse error: {0}")]
    Parse(String),
}

/// Top-level error for engine operations that can fail.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid session transition: {0}")]
    Transition(#[from] TransitionError),
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;
