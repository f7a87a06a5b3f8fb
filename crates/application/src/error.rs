//! Application-level errors

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Connectivity or protocol error against the queue store
    #[error("Queue store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored blob failed to deserialize
    #[error("Corrupted payload: {0}")]
    PayloadCorrupted(String),

    /// Analyzer produced an unusable result
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// External service transport failure
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Check if this error is retryable
    ///
    /// Store outages and external-service transport failures clear up on
    /// their own; everything else needs a code or data change.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::ExternalService(_))
    }
}
