//! Operator command implementations
//!
//! Each command returns a one-line message for stdout; failures bubble up
//! as errors and become a one-line message plus a non-zero exit code.

use std::path::Path;

use anyhow::bail;
use application::{QueueStats, QueueStorePort, ReliableQueue, ReviewRepositoryPort};
use domain::{Review, ReviewId};
use infrastructure::CsvReviewExtractor;

/// Token required to clear the database
pub const CLEAR_DATABASE_TOKEN: &str = "YES_DELETE_IT";

/// Fixed refusal message for a wrong or missing token
pub const CLEAR_DATABASE_REFUSAL: &str = "Invalid password. Database clearing operation aborted.";

/// Gate for the destructive database clear
pub fn authorize_database_clear(password: Option<&str>) -> Result<(), String> {
    match password {
        Some(token) if token == CLEAR_DATABASE_TOKEN => Ok(()),
        _ => Err(CLEAR_DATABASE_REFUSAL.to_string()),
    }
}

/// Render queue statistics for the operator
#[must_use]
pub fn format_queue_status(stats: &QueueStats) -> String {
    format!(
        "Queue contains {} reviews (main: {}, processing: {}, retry: {}, failed: {}, live claims: {})",
        stats.main, stats.main, stats.processing, stats.retry, stats.failed, stats.live_claims
    )
}

/// Enqueue every review from a CSV file
pub async fn enqueue_all<S: QueueStorePort>(
    queue: &ReliableQueue<S>,
    csv_path: &Path,
) -> anyhow::Result<String> {
    ensure_connected(queue).await?;

    let reviews = CsvReviewExtractor::new().extract_reviews(csv_path)?;
    let mut enqueued = 0usize;
    for review in reviews {
        queue.enqueue(review).await?;
        enqueued += 1;
    }

    if enqueued == 0 {
        bail!("No reviews were enqueued from {}", csv_path.display());
    }
    Ok(format!(
        "Successfully enqueued {enqueued} reviews from {}",
        csv_path.display()
    ))
}

/// Enqueue one review given on the command line
pub async fn enqueue_single<S: QueueStorePort>(
    queue: &ReliableQueue<S>,
    review_id: &str,
    date: &str,
    rating: &str,
    text: &str,
) -> anyhow::Result<String> {
    ensure_connected(queue).await?;

    let review = Review::new(ReviewId::new(review_id)?, date, rating, text);
    queue.enqueue(review).await?;
    Ok(format!("Successfully enqueued review {review_id}"))
}

/// Report per-queue counts
pub async fn queue_status<S: QueueStorePort>(
    queue: &ReliableQueue<S>,
) -> anyhow::Result<String> {
    ensure_connected(queue).await?;
    let stats = queue.stats().await?;
    Ok(format_queue_status(&stats))
}

/// Clear all queues and claim records
pub async fn clear_queue<S: QueueStorePort>(queue: &ReliableQueue<S>) -> anyhow::Result<String> {
    ensure_connected(queue).await?;
    queue.clear().await?;
    Ok("Queue cleared successfully".to_string())
}

/// Delete every review record, gated by the operator token
pub async fn clear_database<R: ReviewRepositoryPort>(
    repository: &R,
    password: Option<&str>,
) -> anyhow::Result<String> {
    if let Err(refusal) = authorize_database_clear(password) {
        bail!("{refusal}");
    }
    let counts = repository.purge_all().await?;
    Ok(format!(
        "Database cleared successfully. Deleted {} records total.",
        counts.total()
    ))
}

/// Re-drive every review currently marked failed
pub async fn retry_failed<A, R>(
    pipeline: &application::ReviewPipeline<A, R>,
    max_retries: u32,
) -> anyhow::Result<String>
where
    A: application::AnalyzerPort,
    R: ReviewRepositoryPort,
{
    let outcome = pipeline.retry_all_failed(max_retries).await?;
    Ok(format!(
        "Retry complete: {}/{} successful",
        outcome.succeeded, outcome.attempted
    ))
}

async fn ensure_connected<S: QueueStorePort>(queue: &ReliableQueue<S>) -> anyhow::Result<()> {
    if !queue.is_connected().await {
        bail!("Failed to connect to the queue store");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_token_authorizes() {
        assert!(authorize_database_clear(Some("YES_DELETE_IT")).is_ok());
    }

    #[test]
    fn wrong_token_is_refused() {
        let err = authorize_database_clear(Some("yes_delete_it")).unwrap_err();
        assert_eq!(err, CLEAR_DATABASE_REFUSAL);
        assert!(authorize_database_clear(Some("")).is_err());
        assert!(authorize_database_clear(Some("YES_DELETE_IT ")).is_err());
    }

    #[test]
    fn missing_token_is_refused() {
        assert!(authorize_database_clear(None).is_err());
    }

    #[test]
    fn status_line_lists_every_queue() {
        let stats = QueueStats {
            main: 3,
            processing: 1,
            retry: 2,
            failed: 4,
            live_claims: 1,
        };
        let line = format_queue_status(&stats);
        assert!(line.contains("main: 3"));
        assert!(line.contains("processing: 1"));
        assert!(line.contains("retry: 2"));
        assert!(line.contains("failed: 4"));
        assert!(line.contains("live claims: 1"));
    }
}
