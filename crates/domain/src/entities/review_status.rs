//! Processing status row - the user-visible audit trail per review

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::ReviewId;

/// Processing state of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Pipeline has started and not yet finished
    InProgress,
    /// Pipeline finished successfully
    Completed,
    /// Pipeline gave up
    Failed,
}

impl ProcessingStatus {
    /// Whether no further transitions are expected from the pipeline
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

/// Audit row tracking the processing of one review
///
/// The `retry_count` here is the user-visible audit counter for manual
/// re-drives; queue scheduling runs off the envelope counter instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStatus {
    pub review_id: ReviewId,
    pub status: ProcessingStatus,
    /// Last processing stage reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Error message for failed runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub retry_count: u32,
    /// Free-form processing metadata, JSON text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewStatus {
    /// Create a fresh in-progress status row
    #[must_use]
    pub fn in_progress(review_id: ReviewId, stage: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            review_id,
            status: ProcessingStatus::InProgress,
            stage: Some(stage.into()),
            error_message: None,
            started_at: now,
            completed_at: None,
            duration_seconds: None,
            retry_count: 0,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new in-progress stage
    pub fn set_stage(&mut self, stage: impl Into<String>) {
        self.status = ProcessingStatus::InProgress;
        self.stage = Some(stage.into());
        self.updated_at = Utc::now();
    }

    /// Mark the run completed
    pub fn mark_completed(&mut self, duration_seconds: f64, metadata: Option<String>) {
        let now = Utc::now();
        self.status = ProcessingStatus::Completed;
        self.completed_at = Some(now);
        self.duration_seconds = Some(duration_seconds);
        if metadata.is_some() {
            self.metadata = metadata;
        }
        self.updated_at = now;
    }

    /// Mark the run failed
    pub fn mark_failed(&mut self, error: impl Into<String>, metadata: Option<String>) {
        self.status = ProcessingStatus::Failed;
        self.error_message = Some(error.into());
        if metadata.is_some() {
            self.metadata = metadata;
        }
        self.updated_at = Utc::now();
    }

    /// Bump the audit retry counter for a manual re-drive
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> ReviewStatus {
        ReviewStatus::in_progress(ReviewId::new("R1").unwrap(), "raw_review_saved")
    }

    #[test]
    fn starts_in_progress() {
        let status = fresh();
        assert_eq!(status.status, ProcessingStatus::InProgress);
        assert_eq!(status.stage.as_deref(), Some("raw_review_saved"));
        assert_eq!(status.retry_count, 0);
        assert!(!status.status.is_terminal());
    }

    #[test]
    fn completion_is_terminal() {
        let mut status = fresh();
        status.mark_completed(1.25, None);
        assert_eq!(status.status, ProcessingStatus::Completed);
        assert_eq!(status.duration_seconds, Some(1.25));
        assert!(status.completed_at.is_some());
        assert!(status.status.is_terminal());
    }

    #[test]
    fn failure_records_error() {
        let mut status = fresh();
        status.mark_failed("analyzer unreachable", None);
        assert_eq!(status.status, ProcessingStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some("analyzer unreachable"));
    }

    #[test]
    fn retry_counter_is_monotone() {
        let mut status = fresh();
        status.increment_retry();
        status.increment_retry();
        assert_eq!(status.retry_count, 2);
    }

    #[test]
    fn status_labels_roundtrip() {
        for status in [
            ProcessingStatus::InProgress,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ProcessingStatus>().unwrap(), status);
        }
        assert!("done".parse::<ProcessingStatus>().is_err());
    }
}
