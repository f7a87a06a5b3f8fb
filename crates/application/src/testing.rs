//! In-memory port doubles for service tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::{
    ProcessingStatus, RawReview, Review, ReviewId, ReviewInsights, ReviewStatus, Sentiment,
    StructuredReview,
};
use tokio::sync::Mutex;

use crate::error::ApplicationError;
use crate::ports::{
    AnalyzerPort, PipelineReport, ProcessorPort, PurgeCounts, QueueStorePort,
    ReviewRepositoryPort,
};

#[derive(Default)]
struct StoreState {
    lists: HashMap<String, VecDeque<String>>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    keys: HashMap<String, (String, Instant)>,
}

impl StoreState {
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.keys.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

/// In-memory queue store honoring the port's list/zset/ttl semantics
pub struct InMemoryQueueStore {
    state: Mutex<StoreState>,
    connected: AtomicBool,
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueueStore").finish_non_exhaustive()
    }
}

impl InMemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            connected: AtomicBool::new(true),
        }
    }

    /// Simulate the store going down or coming back
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Rewrite every score in a sorted set to zero, making all entries due
    pub async fn force_all_due(&self, key: &str) {
        let mut state = self.state.lock().await;
        if let Some(entries) = state.zsets.get_mut(key) {
            for (_, score) in entries.iter_mut() {
                *score = 0.0;
            }
        }
    }

    /// Score of a member, if present
    pub async fn zset_score(&self, key: &str, blob: &str) -> Option<f64> {
        let state = self.state.lock().await;
        state
            .zsets
            .get(key)
            .and_then(|entries| entries.iter().find(|(member, _)| member == blob))
            .map(|(_, score)| *score)
    }
}

#[async_trait]
impl QueueStorePort for InMemoryQueueStore {
    async fn push_front(&self, list: &str, blob: &str) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(blob.to_string());
        Ok(())
    }

    async fn pop_back(
        &self,
        list: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, ApplicationError> {
        let mut state = self.state.lock().await;
        Ok(state.lists.get_mut(list).and_then(VecDeque::pop_back))
    }

    async fn atomic_move(
        &self,
        from: &str,
        to: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, ApplicationError> {
        let mut state = self.state.lock().await;
        let Some(blob) = state.lists.get_mut(from).and_then(VecDeque::pop_back) else {
            return Ok(None);
        };
        state
            .lists
            .entry(to.to_string())
            .or_default()
            .push_front(blob.clone());
        Ok(Some(blob))
    }

    async fn list_len(&self, list: &str) -> Result<u64, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.lists.get(list).map_or(0, VecDeque::len) as u64)
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state
            .lists
            .get(list)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_remove(
        &self,
        list: &str,
        count: i64,
        blob: &str,
    ) -> Result<u64, ApplicationError> {
        let mut state = self.state.lock().await;
        let Some(entries) = state.lists.get_mut(list) else {
            return Ok(0);
        };
        let mut removed = 0u64;
        let budget = count.unsigned_abs();
        entries.retain(|entry| {
            if removed < budget && entry == blob {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        blob: &str,
        ttl: Duration,
    ) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        state
            .keys
            .insert(key.to_string(), (blob.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApplicationError> {
        let mut state = self.state.lock().await;
        state.purge_expired();
        Ok(state.keys.get(key).map(|(blob, _)| blob.clone()))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, ApplicationError> {
        let mut state = self.state.lock().await;
        let mut deleted = 0;
        for key in keys {
            if state.keys.remove(key).is_some() {
                deleted += 1;
            }
            if state.lists.remove(key).is_some() {
                deleted += 1;
            }
            if state.zsets.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, ApplicationError> {
        let mut state = self.state.lock().await;
        state.purge_expired();
        let mut keys: Vec<String> = state
            .keys
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn zset_add(&self, key: &str, blob: &str, score: f64) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        let entries = state.zsets.entry(key.to_string()).or_default();
        if let Some(entry) = entries.iter_mut().find(|(member, _)| member == blob) {
            entry.1 = score;
        } else {
            entries.push((blob.to_string(), score));
        }
        Ok(())
    }

    async fn zset_range_by_score(
        &self,
        key: &str,
        lo: f64,
        hi: f64,
    ) -> Result<Vec<String>, ApplicationError> {
        let state = self.state.lock().await;
        let mut due: Vec<(String, f64)> = state
            .zsets
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, score)| *score >= lo && *score <= hi)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        due.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(due.into_iter().map(|(member, _)| member).collect())
    }

    async fn zset_remove(&self, key: &str, blob: &str) -> Result<u64, ApplicationError> {
        let mut state = self.state.lock().await;
        let Some(entries) = state.zsets.get_mut(key) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|(member, _)| member != blob);
        Ok((before - entries.len()) as u64)
    }

    async fn zset_card(&self, key: &str) -> Result<u64, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.zsets.get(key).map_or(0, Vec::len) as u64)
    }

    async fn ping(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RepositoryState {
    raw_reviews: HashMap<String, RawReview>,
    structured_reviews: HashMap<String, StructuredReview>,
    statuses: HashMap<String, ReviewStatus>,
}

/// In-memory review repository with keyed-upsert semantics
#[derive(Default)]
pub struct InMemoryReviewRepository {
    state: Mutex<RepositoryState>,
}

impl std::fmt::Debug for InMemoryReviewRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryReviewRepository")
            .finish_non_exhaustive()
    }
}

impl InMemoryReviewRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn raw_review_count(&self) -> usize {
        self.state.lock().await.raw_reviews.len()
    }

    pub async fn structured_review_count(&self) -> usize {
        self.state.lock().await.structured_reviews.len()
    }
}

#[async_trait]
impl ReviewRepositoryPort for InMemoryReviewRepository {
    async fn upsert_raw_review(&self, review: &RawReview) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        state
            .raw_reviews
            .insert(review.review_id.as_str().to_string(), review.clone());
        Ok(())
    }

    async fn raw_review(&self, id: &ReviewId) -> Result<Option<RawReview>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.raw_reviews.get(id.as_str()).cloned())
    }

    async fn upsert_structured_review(
        &self,
        review: &StructuredReview,
    ) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        state
            .structured_reviews
            .insert(review.review_id.as_str().to_string(), review.clone());
        Ok(())
    }

    async fn structured_review(
        &self,
        id: &ReviewId,
    ) -> Result<Option<StructuredReview>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.structured_reviews.get(id.as_str()).cloned())
    }

    async fn upsert_status(&self, status: &ReviewStatus) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        state
            .statuses
            .insert(status.review_id.as_str().to_string(), status.clone());
        Ok(())
    }

    async fn status(&self, id: &ReviewId) -> Result<Option<ReviewStatus>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state.statuses.get(id.as_str()).cloned())
    }

    async fn statuses_by_state(
        &self,
        state_filter: ProcessingStatus,
    ) -> Result<Vec<ReviewStatus>, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state
            .statuses
            .values()
            .filter(|status| status.status == state_filter)
            .cloned()
            .collect())
    }

    async fn count_by_state(&self, state_filter: ProcessingStatus) -> Result<u64, ApplicationError> {
        let state = self.state.lock().await;
        Ok(state
            .statuses
            .values()
            .filter(|status| status.status == state_filter)
            .count() as u64)
    }

    async fn increment_audit_retry(&self, id: &ReviewId) -> Result<u32, ApplicationError> {
        let mut state = self.state.lock().await;
        let status = state
            .statuses
            .get_mut(id.as_str())
            .ok_or_else(|| ApplicationError::NotFound(format!("Review status {id}")))?;
        status.increment_retry();
        Ok(status.retry_count)
    }

    async fn purge_all(&self) -> Result<PurgeCounts, ApplicationError> {
        let mut state = self.state.lock().await;
        let counts = PurgeCounts {
            raw_reviews: state.raw_reviews.len() as u64,
            structured_reviews: state.structured_reviews.len() as u64,
            review_statuses: state.statuses.len() as u64,
        };
        state.raw_reviews.clear();
        state.structured_reviews.clear();
        state.statuses.clear();
        Ok(counts)
    }
}

/// Canned insights used by analyzer and processor stubs
#[must_use]
pub fn sample_insights() -> ReviewInsights {
    ReviewInsights {
        overall_sentiment: Sentiment::Positive,
        sentiment_score: 0.9,
        topics_mentioned: vec!["quality".to_string()],
        problems_identified: vec![],
        suggested_improvements: vec![],
        key_phrases: vec!["works great".to_string()],
    }
}

/// Scripted analyzer double
///
/// Pops pre-programmed results in order; once the script runs out it keeps
/// returning [`sample_insights`].
pub struct StubAnalyzer {
    script: Mutex<VecDeque<Result<ReviewInsights, ApplicationError>>>,
    calls: AtomicUsize,
}

impl std::fmt::Debug for StubAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubAnalyzer").finish_non_exhaustive()
    }
}

impl StubAnalyzer {
    #[must_use]
    pub fn succeeding() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn scripted(results: Vec<Result<ReviewInsights, ApplicationError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyzerPort for StubAnalyzer {
    async fn analyze(&self, _review: &Review) -> Result<ReviewInsights, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().await;
        script.pop_front().unwrap_or_else(|| Ok(sample_insights()))
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}

/// Scripted processor double for worker tests
pub struct StubProcessor {
    script: Mutex<VecDeque<Result<(), ApplicationError>>>,
    calls: AtomicUsize,
}

impl std::fmt::Debug for StubProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubProcessor").finish_non_exhaustive()
    }
}

impl StubProcessor {
    #[must_use]
    pub fn succeeding() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn scripted(results: Vec<Result<(), ApplicationError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessorPort for StubProcessor {
    async fn process(&self, review: &Review) -> Result<PipelineReport, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().await;
        match script.pop_front() {
            Some(Ok(())) | None => Ok(PipelineReport {
                review_id: review.review_id.clone(),
                duration_seconds: 0.01,
            }),
            Some(Err(err)) => Err(err),
        }
    }
}
