//! Review processing pipeline
//!
//! Persists the raw record, tracks status transitions, calls the external
//! analyzer, and persists structured insights. Every write is an upsert
//! keyed on `review_id`, so re-running the pipeline for the same review
//! converges to the same persisted state regardless of how many times the
//! queue delivers it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{DomainError, ProcessingStatus, RawReview, Review, ReviewId, ReviewStatus, StructuredReview};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{AnalyzerPort, PipelineReport, ProcessorPort, ReviewRepositoryPort};

/// Counts of reviews per processing state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub total: u64,
    pub completed: u64,
    pub in_progress: u64,
    pub failed: u64,
}

/// Result of re-driving failed reviews
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryOutcome {
    pub attempted: usize,
    pub succeeded: usize,
}

/// The per-message processing pipeline
pub struct ReviewPipeline<A, R> {
    analyzer: Arc<A>,
    repository: Arc<R>,
}

impl<A, R> std::fmt::Debug for ReviewPipeline<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewPipeline").finish_non_exhaustive()
    }
}

impl<A: AnalyzerPort, R: ReviewRepositoryPort> ReviewPipeline<A, R> {
    /// Create a pipeline over an analyzer and a repository
    #[must_use]
    pub fn new(analyzer: Arc<A>, repository: Arc<R>) -> Self {
        Self {
            analyzer,
            repository,
        }
    }

    async fn run(&self, review: &Review) -> Result<PipelineReport, ApplicationError> {
        let started = Utc::now();
        let review_id = review.review_id.clone();

        self.repository
            .upsert_raw_review(&RawReview::from_review(review))
            .await?;

        let mut status = match self.repository.status(&review_id).await? {
            Some(mut existing) => {
                existing.set_stage("retry_processing");
                existing
            },
            None => ReviewStatus::in_progress(review_id.clone(), "raw_review_saved"),
        };
        self.repository.upsert_status(&status).await?;

        status.set_stage("processing_insights");
        self.repository.upsert_status(&status).await?;

        if review.text.trim().is_empty() {
            return Err(ApplicationError::Analysis(
                "Empty review text provided".to_string(),
            ));
        }
        let insights = self.analyzer.analyze(review).await?;

        status.set_stage("saving_structured_review");
        self.repository.upsert_status(&status).await?;

        let structured = StructuredReview::from_insights(review_id.clone(), &insights)
            .with_metadata(
                serde_json::json!({
                    "processing_version": "1.0",
                    "model": self.analyzer.model(),
                })
                .to_string(),
            );
        self.repository.upsert_structured_review(&structured).await?;

        let duration_seconds = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;
        let completion_metadata = serde_json::json!({
            "insights_generated": true,
            "total_topics": structured.topics_mentioned.len(),
            "total_problems": structured.problems_identified.len(),
            "total_suggestions": structured.suggested_improvements.len(),
        })
        .to_string();
        status.mark_completed(duration_seconds, Some(completion_metadata));
        self.repository.upsert_status(&status).await?;

        info!(
            review = %review_id,
            sentiment = %structured.overall_sentiment,
            duration_secs = duration_seconds,
            "Review processed"
        );
        Ok(PipelineReport {
            review_id,
            duration_seconds,
        })
    }

    /// Record the failure on the status row; never masks the original error
    async fn record_failure(&self, review_id: &ReviewId, err: &ApplicationError) {
        let status = match self.repository.status(review_id).await {
            Ok(Some(mut existing)) => {
                existing.mark_failed(err.to_string(), None);
                existing
            },
            Ok(None) => {
                let mut fresh = ReviewStatus::in_progress(review_id.clone(), "processing");
                fresh.mark_failed(err.to_string(), None);
                fresh
            },
            Err(repo_err) => {
                error!(review = %review_id, error = %repo_err, "Could not load status to record failure");
                return;
            },
        };
        if let Err(repo_err) = self.repository.upsert_status(&status).await {
            error!(review = %review_id, error = %repo_err, "Could not persist failure status");
        }
    }

    /// Re-drive one failed review through the pipeline
    ///
    /// Bumps the audit retry counter on the status row; refuses once the
    /// counter reaches `max_retries`.
    #[instrument(skip(self))]
    pub async fn retry_failed_review(
        &self,
        review_id: &ReviewId,
        max_retries: u32,
    ) -> Result<PipelineReport, ApplicationError> {
        let status = self
            .repository
            .status(review_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Review status", review_id.as_str()))?;

        if status.retry_count >= max_retries {
            return Err(DomainError::NotPermitted(format!(
                "maximum retries ({max_retries}) exceeded for review {review_id}"
            ))
            .into());
        }

        let raw = self
            .repository
            .raw_review(review_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Raw review", review_id.as_str()))?;

        self.repository.increment_audit_retry(review_id).await?;
        self.process(&raw.to_review()).await
    }

    /// Re-drive every review currently marked failed
    pub async fn retry_all_failed(&self, max_retries: u32) -> Result<RetryOutcome, ApplicationError> {
        let failed = self
            .repository
            .statuses_by_state(ProcessingStatus::Failed)
            .await?;

        let mut outcome = RetryOutcome {
            attempted: failed.len(),
            succeeded: 0,
        };
        for status in failed {
            match self.retry_failed_review(&status.review_id, max_retries).await {
                Ok(_) => outcome.succeeded += 1,
                Err(err) => {
                    warn!(review = %status.review_id, error = %err, "Retry of failed review did not succeed");
                },
            }
        }
        info!(
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            "Finished re-driving failed reviews"
        );
        Ok(outcome)
    }

    /// Counts of reviews per processing state
    pub async fn processing_summary(&self) -> Result<ProcessingSummary, ApplicationError> {
        let completed = self
            .repository
            .count_by_state(ProcessingStatus::Completed)
            .await?;
        let in_progress = self
            .repository
            .count_by_state(ProcessingStatus::InProgress)
            .await?;
        let failed = self
            .repository
            .count_by_state(ProcessingStatus::Failed)
            .await?;
        Ok(ProcessingSummary {
            total: completed + in_progress + failed,
            completed,
            in_progress,
            failed,
        })
    }
}

#[async_trait]
impl<A: AnalyzerPort, R: ReviewRepositoryPort> ProcessorPort for ReviewPipeline<A, R> {
    #[instrument(skip(self, review), fields(review = %review.review_id))]
    async fn process(&self, review: &Review) -> Result<PipelineReport, ApplicationError> {
        match self.run(review).await {
            Ok(report) => Ok(report),
            Err(err) => {
                warn!(review = %review.review_id, error = %err, "Pipeline run failed");
                self.record_failure(&review.review_id, &err).await;
                Err(err)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use domain::Sentiment;

    use super::*;
    use crate::testing::{sample_insights, InMemoryReviewRepository, StubAnalyzer};

    fn review(id: &str) -> Review {
        Review::new(ReviewId::new(id).unwrap(), "2025-01-01", "4", "Good product")
    }

    fn pipeline_with(
        analyzer: StubAnalyzer,
    ) -> (
        Arc<InMemoryReviewRepository>,
        ReviewPipeline<StubAnalyzer, InMemoryReviewRepository>,
    ) {
        let repository = Arc::new(InMemoryReviewRepository::new());
        let pipeline = ReviewPipeline::new(Arc::new(analyzer), Arc::clone(&repository));
        (repository, pipeline)
    }

    #[tokio::test]
    async fn happy_path_persists_all_three_relations() {
        let (repo, pipeline) = pipeline_with(StubAnalyzer::succeeding());
        let review = review("R1");

        let report = pipeline.process(&review).await.unwrap();
        assert_eq!(report.review_id, review.review_id);

        let raw = repo.raw_review(&review.review_id).await.unwrap().unwrap();
        assert_eq!(raw.text, "Good product");

        let structured = repo
            .structured_review(&review.review_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(structured.overall_sentiment, Sentiment::Positive);

        let status = repo.status(&review.review_id).await.unwrap().unwrap();
        assert_eq!(status.status, ProcessingStatus::Completed);
        assert!(status.completed_at.is_some());
        assert!(status.duration_seconds.is_some());
        assert_eq!(status.retry_count, 0);
    }

    #[tokio::test]
    async fn analyzer_failure_marks_status_failed() {
        let (repo, pipeline) = pipeline_with(StubAnalyzer::scripted(vec![Err(
            ApplicationError::ExternalService("connection reset".to_string()),
        )]));
        let review = review("R2");

        let err = pipeline.process(&review).await.unwrap_err();
        assert!(err.is_retryable());

        let status = repo.status(&review.review_id).await.unwrap().unwrap();
        assert_eq!(status.status, ProcessingStatus::Failed);
        assert!(
            status
                .error_message
                .as_deref()
                .unwrap()
                .contains("connection reset")
        );
        // Raw review is persisted even when analysis fails
        assert!(repo.raw_review(&review.review_id).await.unwrap().is_some());
        assert!(repo.structured_review(&review.review_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_text_fails_before_analyzer() {
        let analyzer = StubAnalyzer::succeeding();
        let repository = Arc::new(InMemoryReviewRepository::new());
        let analyzer = Arc::new(analyzer);
        let pipeline = ReviewPipeline::new(Arc::clone(&analyzer), Arc::clone(&repository));

        let review = Review::new(ReviewId::new("R3").unwrap(), "2025-01-01", "1", "   ");
        let err = pipeline.process(&review).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Analysis(_)));
        assert_eq!(analyzer.calls(), 0);

        let status = repository.status(&review.review_id).await.unwrap().unwrap();
        assert_eq!(status.status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn reprocessing_is_idempotent() {
        let (repo, pipeline) = pipeline_with(StubAnalyzer::succeeding());
        let review = review("R1");

        pipeline.process(&review).await.unwrap();
        pipeline.process(&review).await.unwrap();
        pipeline.process(&review).await.unwrap();

        assert_eq!(repo.raw_review_count().await, 1);
        assert_eq!(repo.structured_review_count().await, 1);
        let status = repo.status(&review.review_id).await.unwrap().unwrap();
        assert_eq!(status.status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn failure_then_success_converges_to_completed() {
        let (repo, pipeline) = pipeline_with(StubAnalyzer::scripted(vec![
            Err(ApplicationError::ExternalService("flaky".to_string())),
            Ok(sample_insights()),
        ]));
        let review = review("R3");

        assert!(pipeline.process(&review).await.is_err());
        pipeline.process(&review).await.unwrap();

        let status = repo.status(&review.review_id).await.unwrap().unwrap();
        assert_eq!(status.status, ProcessingStatus::Completed);
        assert_eq!(repo.structured_review_count().await, 1);
    }

    #[tokio::test]
    async fn retry_failed_review_bumps_audit_counter() {
        let (repo, pipeline) = pipeline_with(StubAnalyzer::scripted(vec![
            Err(ApplicationError::Analysis("bad output".to_string())),
            Ok(sample_insights()),
        ]));
        let review = review("R7");

        assert!(pipeline.process(&review).await.is_err());

        let report = pipeline.retry_failed_review(&review.review_id, 3).await.unwrap();
        assert_eq!(report.review_id, review.review_id);

        let status = repo.status(&review.review_id).await.unwrap().unwrap();
        assert_eq!(status.status, ProcessingStatus::Completed);
        assert_eq!(status.retry_count, 1);
    }

    #[tokio::test]
    async fn retry_refuses_when_audit_budget_spent() {
        let (repo, pipeline) = pipeline_with(StubAnalyzer::succeeding());
        let id = ReviewId::new("R8").unwrap();

        let mut status = ReviewStatus::in_progress(id.clone(), "processing");
        status.retry_count = 3;
        status.mark_failed("kept failing", None);
        repo.upsert_status(&status).await.unwrap();

        let err = pipeline.retry_failed_review(&id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn retry_unknown_review_is_not_found() {
        let (_repo, pipeline) = pipeline_with(StubAnalyzer::succeeding());
        let err = pipeline
            .retry_failed_review(&ReviewId::new("nope").unwrap(), 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn retry_all_failed_reports_outcome() {
        let (repo, pipeline) = pipeline_with(StubAnalyzer::scripted(vec![
            Err(ApplicationError::Analysis("a".to_string())),
            Err(ApplicationError::Analysis("b".to_string())),
            Ok(sample_insights()),
            Err(ApplicationError::Analysis("still bad".to_string())),
        ]));

        assert!(pipeline.process(&review("F1")).await.is_err());
        assert!(pipeline.process(&review("F2")).await.is_err());

        let outcome = pipeline.retry_all_failed(3).await.unwrap();
        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.succeeded, 1);

        let summary = pipeline.processing_summary().await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 2);
        let _ = repo;
    }
}
