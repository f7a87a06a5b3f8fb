//! Port for the durable review record store
//!
//! One small data-access interface covering the three keyed relations:
//! raw reviews, structured insights, and processing statuses. Every write
//! is an upsert keyed on `review_id`; that is what turns the queue's
//! at-least-once delivery into effectively-once persistence.

use async_trait::async_trait;
use domain::{ProcessingStatus, RawReview, ReviewId, ReviewStatus, StructuredReview};
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Row counts removed by a bulk purge
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PurgeCounts {
    pub raw_reviews: u64,
    pub structured_reviews: u64,
    pub review_statuses: u64,
}

impl PurgeCounts {
    /// Total rows removed across the three relations
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.raw_reviews + self.structured_reviews + self.review_statuses
    }
}

/// Port for review persistence
#[async_trait]
pub trait ReviewRepositoryPort: Send + Sync {
    /// Insert or update the raw review row
    async fn upsert_raw_review(&self, review: &RawReview) -> Result<(), ApplicationError>;

    /// Fetch a raw review by id
    async fn raw_review(&self, id: &ReviewId) -> Result<Option<RawReview>, ApplicationError>;

    /// Insert or update the structured insights row
    async fn upsert_structured_review(
        &self,
        review: &StructuredReview,
    ) -> Result<(), ApplicationError>;

    /// Fetch structured insights by review id
    async fn structured_review(
        &self,
        id: &ReviewId,
    ) -> Result<Option<StructuredReview>, ApplicationError>;

    /// Insert or update the processing status row
    async fn upsert_status(&self, status: &ReviewStatus) -> Result<(), ApplicationError>;

    /// Fetch the processing status by review id
    async fn status(&self, id: &ReviewId) -> Result<Option<ReviewStatus>, ApplicationError>;

    /// All status rows currently in the given state
    async fn statuses_by_state(
        &self,
        state: ProcessingStatus,
    ) -> Result<Vec<ReviewStatus>, ApplicationError>;

    /// Count of status rows in the given state
    async fn count_by_state(&self, state: ProcessingStatus) -> Result<u64, ApplicationError>;

    /// Bump the audit retry counter on a status row, returning the new count
    async fn increment_audit_retry(&self, id: &ReviewId) -> Result<u32, ApplicationError>;

    /// Delete every row in all three relations
    ///
    /// Destructive; callers gate this behind the operator token.
    async fn purge_all(&self) -> Result<PurgeCounts, ApplicationError>;
}
