//! Review entity - the opaque payload carried through the queue

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::ReviewId;

/// A customer review as received from the ingest source
///
/// The queue never inspects anything beyond `review_id`; the fixed fields
/// mirror the ingest format and `extra` keeps any additional columns a
/// source may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Caller-supplied unique identifier (idempotence key)
    pub review_id: ReviewId,
    /// Review date, as supplied by the source
    pub date: String,
    /// Star rating, as supplied by the source
    pub rating: String,
    /// Free-form review text
    pub text: String,
    /// Open attribute map for source columns beyond the fixed set
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Review {
    /// Create a review with the fixed field set
    #[must_use]
    pub fn new(
        review_id: ReviewId,
        date: impl Into<String>,
        rating: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            review_id,
            date: date.into(),
            rating: rating.into(),
            text: text.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Attach an extra attribute
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
