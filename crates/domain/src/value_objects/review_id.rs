//! Review identifier - the caller-supplied idempotence key

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A caller-supplied review identifier
///
/// This is the idempotence key for the whole system: all downstream
/// writes are keyed on it, so the same review processed twice converges
/// to the same persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(String);

impl ReviewId {
    /// Create a review ID from a non-empty string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty or whitespace-only.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidReviewId(
                "review id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ReviewId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
