//! Port for the external review analyzer

use async_trait::async_trait;
use domain::{Review, ReviewInsights};

use crate::error::ApplicationError;

/// Port for extracting structured insights from a review
///
/// Transport failures surface as [`ApplicationError::ExternalService`]
/// (retryable); semantically unusable output surfaces as
/// [`ApplicationError::Analysis`].
#[async_trait]
pub trait AnalyzerPort: Send + Sync {
    /// Analyze a single review
    async fn analyze(&self, review: &Review) -> Result<ReviewInsights, ApplicationError>;

    /// Check if the analyzer backend is reachable
    async fn is_healthy(&self) -> bool;

    /// Name of the model in use
    fn model(&self) -> &str;
}
