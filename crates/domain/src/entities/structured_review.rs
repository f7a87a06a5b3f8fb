//! Structured review row - persisted analyzer output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{ReviewInsights, Sentiment};
use crate::value_objects::ReviewId;

/// Persisted structured insights for one review, keyed by review id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReview {
    pub review_id: ReviewId,
    pub overall_sentiment: Sentiment,
    pub sentiment_score: f64,
    pub topics_mentioned: Vec<String>,
    pub problems_identified: Vec<String>,
    pub suggested_improvements: Vec<String>,
    pub key_insights: Vec<String>,
    /// Free-form processing metadata, JSON text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StructuredReview {
    /// Build the persisted row from analyzer output
    #[must_use]
    pub fn from_insights(review_id: ReviewId, insights: &ReviewInsights) -> Self {
        let now = Utc::now();
        Self {
            review_id,
            overall_sentiment: insights.overall_sentiment,
            sentiment_score: insights.sentiment_score,
            topics_mentioned: insights.topics_mentioned.clone(),
            problems_identified: insights.problems_identified.clone(),
            suggested_improvements: insights.suggested_improvements.clone(),
            key_insights: insights.key_phrases.clone(),
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach processing metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}
