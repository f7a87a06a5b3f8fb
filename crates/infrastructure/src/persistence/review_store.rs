//! SQLite review repository
//!
//! Implements the keyed-upsert data access the pipeline relies on for
//! idempotence: every write is `INSERT .. ON CONFLICT(review_id) DO
//! UPDATE`, so reprocessing a review converges instead of duplicating.

use application::{ApplicationError, PurgeCounts, ReviewRepositoryPort};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ProcessingStatus, RawReview, ReviewId, ReviewStatus, Sentiment, StructuredReview,
};
use sqlx::SqlitePool;
use tracing::{info, instrument};

use super::error::map_sqlx_error;

/// Review repository backed by SQLite (via sqlx)
#[derive(Clone)]
pub struct SqliteReviewStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteReviewStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteReviewStore").finish_non_exhaustive()
    }
}

impl SqliteReviewStore {
    /// Create a store over an existing pool
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RawReviewRow {
    review_id: String,
    date: String,
    rating: String,
    text: String,
    created_at: String,
    updated_at: String,
}

impl RawReviewRow {
    fn into_entity(self) -> Result<RawReview, ApplicationError> {
        Ok(RawReview {
            review_id: parse_review_id(self.review_id)?,
            date: self.date,
            rating: self.rating,
            text: self.text,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct StructuredReviewRow {
    review_id: String,
    overall_sentiment: String,
    sentiment_score: Option<f64>,
    topics_mentioned: Option<String>,
    problems_identified: Option<String>,
    suggested_improvements: Option<String>,
    key_insights: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StructuredReviewRow {
    fn into_entity(self) -> Result<StructuredReview, ApplicationError> {
        Ok(StructuredReview {
            review_id: parse_review_id(self.review_id)?,
            overall_sentiment: self
                .overall_sentiment
                .parse()
                .unwrap_or(Sentiment::Neutral),
            sentiment_score: self.sentiment_score.unwrap_or_default(),
            topics_mentioned: parse_string_list(self.topics_mentioned.as_deref()),
            problems_identified: parse_string_list(self.problems_identified.as_deref()),
            suggested_improvements: parse_string_list(self.suggested_improvements.as_deref()),
            key_insights: parse_string_list(self.key_insights.as_deref()),
            metadata: self.metadata,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewStatusRow {
    review_id: String,
    status: String,
    stage: Option<String>,
    error_message: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    duration_seconds: Option<f64>,
    retry_count: i64,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ReviewStatusRow {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn into_entity(self) -> Result<ReviewStatus, ApplicationError> {
        Ok(ReviewStatus {
            review_id: parse_review_id(self.review_id)?,
            status: self.status.parse().unwrap_or(ProcessingStatus::InProgress),
            stage: self.stage,
            error_message: self.error_message,
            started_at: parse_datetime(&self.started_at),
            completed_at: self.completed_at.as_deref().map(parse_datetime),
            duration_seconds: self.duration_seconds,
            retry_count: self.retry_count.max(0) as u32,
            metadata: self.metadata,
            created_at: parse_datetime(&self.created_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}

const STATUS_COLUMNS: &str = "review_id, status, stage, error_message, started_at, completed_at, \
                              duration_seconds, retry_count, metadata, created_at, updated_at";

#[async_trait]
impl ReviewRepositoryPort for SqliteReviewStore {
    #[instrument(skip(self, review), fields(review = %review.review_id))]
    async fn upsert_raw_review(&self, review: &RawReview) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO raw_reviews (review_id, date, rating, text, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT(review_id) DO UPDATE SET
                date = excluded.date,
                rating = excluded.rating,
                text = excluded.text,
                updated_at = excluded.updated_at",
        )
        .bind(review.review_id.as_str())
        .bind(&review.date)
        .bind(&review.rating)
        .bind(&review.text)
        .bind(review.created_at.to_rfc3339())
        .bind(review.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn raw_review(&self, id: &ReviewId) -> Result<Option<RawReview>, ApplicationError> {
        let row: Option<RawReviewRow> = sqlx::query_as(
            "SELECT review_id, date, rating, text, created_at, updated_at
             FROM raw_reviews WHERE review_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(RawReviewRow::into_entity).transpose()
    }

    #[instrument(skip(self, review), fields(review = %review.review_id))]
    async fn upsert_structured_review(
        &self,
        review: &StructuredReview,
    ) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO structured_reviews (
                review_id, overall_sentiment, sentiment_score, topics_mentioned,
                problems_identified, suggested_improvements, key_insights, metadata,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT(review_id) DO UPDATE SET
                overall_sentiment = excluded.overall_sentiment,
                sentiment_score = excluded.sentiment_score,
                topics_mentioned = excluded.topics_mentioned,
                problems_identified = excluded.problems_identified,
                suggested_improvements = excluded.suggested_improvements,
                key_insights = excluded.key_insights,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
        )
        .bind(review.review_id.as_str())
        .bind(review.overall_sentiment.label())
        .bind(review.sentiment_score)
        .bind(to_json_list(&review.topics_mentioned))
        .bind(to_json_list(&review.problems_identified))
        .bind(to_json_list(&review.suggested_improvements))
        .bind(to_json_list(&review.key_insights))
        .bind(&review.metadata)
        .bind(review.created_at.to_rfc3339())
        .bind(review.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn structured_review(
        &self,
        id: &ReviewId,
    ) -> Result<Option<StructuredReview>, ApplicationError> {
        let row: Option<StructuredReviewRow> = sqlx::query_as(
            "SELECT review_id, overall_sentiment, sentiment_score, topics_mentioned,
                    problems_identified, suggested_improvements, key_insights, metadata,
                    created_at, updated_at
             FROM structured_reviews WHERE review_id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(StructuredReviewRow::into_entity).transpose()
    }

    #[instrument(skip(self, status), fields(review = %status.review_id, status = %status.status))]
    async fn upsert_status(&self, status: &ReviewStatus) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO review_statuses (
                review_id, status, stage, error_message, started_at, completed_at,
                duration_seconds, retry_count, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT(review_id) DO UPDATE SET
                status = excluded.status,
                stage = excluded.stage,
                error_message = excluded.error_message,
                completed_at = excluded.completed_at,
                duration_seconds = excluded.duration_seconds,
                retry_count = excluded.retry_count,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
        )
        .bind(status.review_id.as_str())
        .bind(status.status.to_string())
        .bind(&status.stage)
        .bind(&status.error_message)
        .bind(status.started_at.to_rfc3339())
        .bind(status.completed_at.map(|t| t.to_rfc3339()))
        .bind(status.duration_seconds)
        .bind(i64::from(status.retry_count))
        .bind(&status.metadata)
        .bind(status.created_at.to_rfc3339())
        .bind(status.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn status(&self, id: &ReviewId) -> Result<Option<ReviewStatus>, ApplicationError> {
        let row: Option<ReviewStatusRow> = sqlx::query_as(&format!(
            "SELECT {STATUS_COLUMNS} FROM review_statuses WHERE review_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(ReviewStatusRow::into_entity).transpose()
    }

    async fn statuses_by_state(
        &self,
        state: ProcessingStatus,
    ) -> Result<Vec<ReviewStatus>, ApplicationError> {
        let rows: Vec<ReviewStatusRow> = sqlx::query_as(&format!(
            "SELECT {STATUS_COLUMNS} FROM review_statuses WHERE status = $1 ORDER BY updated_at"
        ))
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(ReviewStatusRow::into_entity)
            .collect()
    }

    #[allow(clippy::cast_sign_loss)]
    async fn count_by_state(&self, state: ProcessingStatus) -> Result<u64, ApplicationError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM review_statuses WHERE status = $1")
                .bind(state.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(count as u64)
    }

    #[instrument(skip(self))]
    async fn increment_audit_retry(&self, id: &ReviewId) -> Result<u32, ApplicationError> {
        let result = sqlx::query(
            "UPDATE review_statuses
             SET retry_count = retry_count + 1, updated_at = $1
             WHERE review_id = $2",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(ApplicationError::NotFound(format!("Review status {id}")));
        }

        let count: i64 =
            sqlx::query_scalar("SELECT retry_count FROM review_statuses WHERE review_id = $1")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        Ok(count.max(0) as u32)
    }

    #[allow(clippy::cast_sign_loss)]
    async fn purge_all(&self) -> Result<PurgeCounts, ApplicationError> {
        // Child relations first so the foreign key never trips
        let structured = sqlx::query("DELETE FROM structured_reviews")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        let statuses = sqlx::query("DELETE FROM review_statuses")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        let raw = sqlx::query("DELETE FROM raw_reviews")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        let counts = PurgeCounts {
            raw_reviews: raw,
            structured_reviews: structured,
            review_statuses: statuses,
        };
        info!(deleted = counts.total(), "Purged all review records");
        Ok(counts)
    }
}

fn parse_review_id(raw: String) -> Result<ReviewId, ApplicationError> {
    ReviewId::new(raw).map_err(|e| ApplicationError::Database(e.to_string()))
}

/// Parse ISO8601 datetime text, falling back to now on malformed rows
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn parse_string_list(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn to_json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
