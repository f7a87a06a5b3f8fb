//! Raw review row - the review as received, before any analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Review;
use crate::value_objects::ReviewId;

/// A persisted raw review, keyed by review id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    pub review_id: ReviewId,
    pub date: String,
    pub rating: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RawReview {
    /// Build the raw row for a review at the current instant
    #[must_use]
    pub fn from_review(review: &Review) -> Self {
        let now = Utc::now();
        Self {
            review_id: review.review_id.clone(),
            date: review.date.clone(),
            rating: review.rating.clone(),
            text: review.text.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert back to the queueable payload form
    #[must_use]
    pub fn to_review(&self) -> Review {
        Review::new(
            self.review_id.clone(),
            self.date.clone(),
            self.rating.clone(),
            self.text.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_row_mirrors_review_fields() {
        let review = Review::new(ReviewId::new("R9").unwrap(), "2025-03-03", "2", "Meh");
        let raw = RawReview::from_review(&review);
        assert_eq!(raw.review_id, review.review_id);
        assert_eq!(raw.text, "Meh");
        assert_eq!(raw.created_at, raw.updated_at);
    }

    #[test]
    fn converts_back_to_review() {
        let review = Review::new(ReviewId::new("R9").unwrap(), "2025-03-03", "2", "Meh");
        let raw = RawReview::from_review(&review);
        assert_eq!(raw.to_review(), review);
    }
}
