//! Structured insights extracted from a review by the analyzer

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Overall sentiment of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Get the lowercase label used on the wire and in the database
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Sentiment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(DomainError::InvalidSentiment(other.to_string())),
        }
    }
}

/// The analyzer's verdict on a single review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewInsights {
    /// Overall sentiment classification
    pub overall_sentiment: Sentiment,
    /// Score from -1.0 (very negative) to 1.0 (very positive)
    pub sentiment_score: f64,
    /// Main topics or categories mentioned
    #[serde(default)]
    pub topics_mentioned: Vec<String>,
    /// Specific problems or issues identified
    #[serde(default)]
    pub problems_identified: Vec<String>,
    /// Suggested improvements or solutions
    #[serde(default)]
    pub suggested_improvements: Vec<String>,
    /// Phrases that capture the essence of the review
    #[serde(default)]
    pub key_phrases: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_parses_case_insensitively() {
        assert_eq!("Positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" negative ".parse::<Sentiment>().unwrap(), Sentiment::Negative);
        assert_eq!("NEUTRAL".parse::<Sentiment>().unwrap(), Sentiment::Neutral);
    }

    #[test]
    fn sentiment_rejects_unknown_labels() {
        assert!("mixed".parse::<Sentiment>().is_err());
    }

    #[test]
    fn sentiment_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Sentiment::Positive).unwrap(),
            "\"positive\""
        );
    }

    #[test]
    fn insights_tolerate_missing_lists() {
        let json = r#"{"overall_sentiment":"neutral","sentiment_score":0.0}"#;
        let insights: ReviewInsights = serde_json::from_str(json).unwrap();
        assert!(insights.topics_mentioned.is_empty());
        assert!(insights.key_phrases.is_empty());
    }
}
