//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Error)]
pub enum DomainError {
    /// Review identifier is empty or malformed
    #[error("Invalid review id: {0}")]
    InvalidReviewId(String),

    /// Sentiment label not recognized
    #[error("Invalid sentiment: {0}")]
    InvalidSentiment(String),

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Operation not permitted
    #[error("Operation not permitted: {0}")]
    NotPermitted(String),
}

impl DomainError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}
