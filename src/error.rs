//! Error types for grantbook

use thiserror::Error;

/// The main error type for grant operations
#[derive(Debug, Error)]
pub enum GrantError {
    /// Caller input rejected before any store access
    #[error("invalid input: {0}")]
    Validation(String),
    /// A grant with the same subject-scoped key already exists
    #[error("duplicate grant: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Backend failure reported as text
    #[error("store error: {0}")]
    Store(String),
    #[error("lmdb error: {0}")]
    Heed(#[from] heed::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GrantError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GrantError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GrantError::Validation(_))
    }
}

/// Result type alias for grant operations
pub type Result<T> = std::result::Result<T, GrantError>;

/// Convert any error to a store error
pub fn err<E: std::error::Error>(e: E) -> GrantError {
    GrantError::Store(e.to_string())
}
