//! DeepSeek analyzer adapter - Implements AnalyzerPort
//!
//! Talks to any OpenAI-compatible chat-completions endpoint. The model is
//! asked for a single JSON object; the adapter tolerates markdown fences
//! and prose around it, but a completion with no parseable object is an
//! analysis error, not a transport error.

use std::time::Duration;

use application::{AnalyzerPort, ApplicationError};
use async_trait::async_trait;
use domain::{Review, ReviewInsights, Sentiment};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Settings for the analyzer backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// API key; mandatory for any command that runs the pipeline
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

const fn default_temperature() -> f32 {
    0.1
}

const fn default_timeout() -> u64 {
    60
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Adapter for OpenAI-compatible chat-completion analyzers
#[derive(Debug)]
pub struct DeepSeekAnalyzer {
    client: reqwest::Client,
    config: AnalyzerConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// The JSON object the model is instructed to produce
#[derive(Deserialize)]
struct RawInsights {
    overall_sentiment: String,
    sentiment_score: f64,
    #[serde(default)]
    topics_mentioned: Vec<String>,
    #[serde(default)]
    problems_identified: Vec<String>,
    #[serde(default)]
    suggested_improvements: Vec<String>,
    #[serde(default)]
    key_phrases: Vec<String>,
}

impl DeepSeekAnalyzer {
    /// Create an analyzer from configuration
    ///
    /// Fails fast when the API key is missing; that is a startup
    /// configuration error, not a runtime one.
    pub fn new(config: AnalyzerConfig) -> Result<Self, ApplicationError> {
        if config.api_key.is_empty() {
            return Err(ApplicationError::Configuration(
                "analyzer API key is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApplicationError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn build_prompt(review: &Review) -> String {
        format!(
            r#"You analyze customer reviews for e-commerce platforms and extract structured insights.

Review:
- Review ID: {id}
- Date: {date}
- Rating: {rating}
- Text: "{text}"

Determine the overall sentiment and a score from -1.0 (very negative) to 1.0 (very positive). Identify the main topics mentioned (e.g. product quality, delivery, customer service, pricing), specific problems, any suggested improvements, and the key phrases that capture the essence of the review. Focus on actionable findings.

Respond with a single JSON object and nothing else:
{{"overall_sentiment": "positive" | "negative" | "neutral", "sentiment_score": number, "topics_mentioned": [string], "problems_identified": [string], "suggested_improvements": [string], "key_phrases": [string]}}"#,
            id = review.review_id,
            date = review.date,
            rating = review.rating,
            text = review.text,
        )
    }

    fn parse_insights(content: &str) -> Result<ReviewInsights, ApplicationError> {
        let json = extract_json_object(content).ok_or_else(|| {
            ApplicationError::Analysis("completion contained no JSON object".to_string())
        })?;
        let raw: RawInsights = serde_json::from_str(json)
            .map_err(|e| ApplicationError::Analysis(format!("unparseable insights: {e}")))?;
        let sentiment: Sentiment = raw
            .overall_sentiment
            .parse()
            .map_err(|e: domain::DomainError| ApplicationError::Analysis(e.to_string()))?;
        Ok(ReviewInsights {
            overall_sentiment: sentiment,
            sentiment_score: raw.sentiment_score,
            topics_mentioned: raw.topics_mentioned,
            problems_identified: raw.problems_identified,
            suggested_improvements: raw.suggested_improvements,
            key_phrases: raw.key_phrases,
        })
    }
}

/// Slice out the outermost `{ ... }` of a completion, tolerating fences
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[async_trait]
impl AnalyzerPort for DeepSeekAnalyzer {
    #[instrument(skip(self, review), fields(review = %review.review_id, model = %self.config.model))]
    async fn analyze(&self, review: &Review) -> Result<ReviewInsights, ApplicationError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: Self::build_prompt(review),
            }],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.endpoint("/chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApplicationError::ExternalService(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ApplicationError::ExternalService(format!(
                "analyzer returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(ApplicationError::Analysis(format!(
                "analyzer rejected the request: {status}"
            )));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| ApplicationError::ExternalService(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ApplicationError::Analysis("completion contained no choices".to_string())
            })?;

        debug!(review = %review.review_id, "Received analyzer completion");
        let insights = Self::parse_insights(&content)?;
        if insights.topics_mentioned.is_empty() && insights.key_phrases.is_empty() {
            warn!(review = %review.review_id, "Analyzer produced empty insight lists");
        }
        Ok(insights)
    }

    async fn is_healthy(&self) -> bool {
        self.client
            .get(self.endpoint("/models"))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
