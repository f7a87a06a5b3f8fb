//! Port for the per-message processing pipeline

use async_trait::async_trait;
use domain::{Review, ReviewId};

use crate::error::ApplicationError;

/// Result of one successful pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// The review that was processed
    pub review_id: ReviewId,
    /// Wall-clock processing time in seconds
    pub duration_seconds: f64,
}

/// Port for processing one claimed review
///
/// Implementations must be idempotent per `review_id`: the queue delivers
/// at least once, and repeated invocations must converge to the same
/// persisted state.
#[async_trait]
pub trait ProcessorPort: Send + Sync {
    /// Run the full pipeline for one review
    async fn process(&self, review: &Review) -> Result<PipelineReport, ApplicationError>;
}
