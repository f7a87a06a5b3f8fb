//! Reliable at-least-once queue over the key/value store
//!
//! Four logical queues back the delivery lifecycle: `main` holds envelopes
//! awaiting claim, `processing` holds claimed envelopes, a sorted set keyed
//! by due-time holds envelopes waiting out their backoff, and `failed` is
//! the terminal dead-letter list. A per-claim visibility record with a
//! store-enforced TTL is the authoritative sign that a claim is alive.
//!
//! ```text
//!  enqueue ─▶ main ─claim─▶ processing ─ack─▶ (gone)
//!                              │nack
//!                              ├─▶ retry ─promote─▶ main
//!                              └─▶ failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::{ClaimRecord, Envelope, EnvelopeId, Review, WorkerId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::QueueStorePort;

/// Queue names and delivery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// List of envelopes awaiting claim
    #[serde(default = "default_main_queue")]
    pub main_queue: String,

    /// List of envelopes currently claimed by a worker
    #[serde(default = "default_processing_queue")]
    pub processing_queue: String,

    /// Terminal list for envelopes that exhausted retries
    #[serde(default = "default_failed_queue")]
    pub failed_queue: String,

    /// Seconds a claim is protected before it may be reaped
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,

    /// Delivery attempts before dead-lettering
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds a claim call blocks waiting for work
    #[serde(default = "default_blocking_timeout")]
    pub blocking_timeout_secs: u64,
}

fn default_main_queue() -> String {
    "customer_reviews_queue".to_string()
}

fn default_processing_queue() -> String {
    "customer_reviews_processing".to_string()
}

fn default_failed_queue() -> String {
    "customer_reviews_failed".to_string()
}

const fn default_visibility_timeout() -> u64 {
    300
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_blocking_timeout() -> u64 {
    1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            main_queue: default_main_queue(),
            processing_queue: default_processing_queue(),
            failed_queue: default_failed_queue(),
            visibility_timeout_secs: default_visibility_timeout(),
            max_retries: default_max_retries(),
            blocking_timeout_secs: default_blocking_timeout(),
        }
    }
}

impl QueueConfig {
    /// Name of the sorted set holding scheduled retries
    #[must_use]
    pub fn retry_set(&self) -> String {
        format!("{}:retry", self.main_queue)
    }

    /// Key of the visibility record for one envelope
    #[must_use]
    pub fn claim_key(&self, id: &EnvelopeId) -> String {
        format!("{}:{}", self.processing_queue, id)
    }

    /// Prefix shared by all visibility record keys
    #[must_use]
    pub fn claim_key_prefix(&self) -> String {
        format!("{}:", self.processing_queue)
    }

    /// Blocking timeout for claims as a [`Duration`]
    #[must_use]
    pub const fn blocking_timeout(&self) -> Duration {
        Duration::from_secs(self.blocking_timeout_secs)
    }
}

/// Per-queue counts returned by [`ReliableQueue::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub main: u64,
    pub processing: u64,
    pub retry: u64,
    pub failed: u64,
    /// Visibility records currently alive
    pub live_claims: u64,
}

impl QueueStats {
    /// Total envelopes tracked across all queues
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.main + self.processing + self.retry + self.failed
    }

    /// True when nothing is queued, in flight, scheduled, or dead-lettered
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total() == 0 && self.live_claims == 0
    }
}

/// The reliable queue service
///
/// All state lives in the store; instances are cheap handles that can be
/// shared across workers via [`Arc`].
pub struct ReliableQueue<S> {
    store: Arc<S>,
    config: QueueConfig,
}

impl<S> std::fmt::Debug for ReliableQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: QueueStorePort> ReliableQueue<S> {
    /// Create a queue handle over a store
    #[must_use]
    pub fn new(store: Arc<S>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// The queue configuration in effect
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Probe store connectivity
    pub async fn is_connected(&self) -> bool {
        self.store.ping().await
    }

    /// Wrap a review in a fresh envelope and append it to the main queue
    ///
    /// Enqueueing the same `review_id` twice produces two envelopes;
    /// end-to-end idempotence is the pipeline's responsibility.
    #[instrument(skip(self, review), fields(review = %review.review_id))]
    pub async fn enqueue(&self, review: Review) -> Result<EnvelopeId, ApplicationError> {
        let envelope = Envelope::new(review);
        let blob = serialize(&envelope)?;
        self.store.push_front(&self.config.main_queue, &blob).await?;
        debug!(envelope = %envelope.id, "Review enqueued");
        Ok(envelope.id)
    }

    /// Claim the oldest envelope for a worker
    ///
    /// Atomically moves the envelope from `main` to `processing`, then
    /// writes the visibility record. A crash between the two steps leaves a
    /// processing entry without a record, which the reaper reclassifies.
    #[instrument(skip(self), fields(worker = %worker_id))]
    pub async fn claim(
        &self,
        worker_id: &WorkerId,
    ) -> Result<Option<(EnvelopeId, Review)>, ApplicationError> {
        let Some(blob) = self
            .store
            .atomic_move(
                &self.config.main_queue,
                &self.config.processing_queue,
                self.config.blocking_timeout(),
            )
            .await?
        else {
            return Ok(None);
        };

        let envelope: Envelope = match serde_json::from_str(&blob) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "Dropping corrupted envelope from processing queue");
                let _ = self
                    .store
                    .list_remove(&self.config.processing_queue, 1, &blob)
                    .await;
                return Err(ApplicationError::PayloadCorrupted(err.to_string()));
            },
        };

        let claim = ClaimRecord::new(
            envelope.clone(),
            worker_id.clone(),
            self.config.visibility_timeout_secs,
        );
        self.store
            .set_with_ttl(
                &self.config.claim_key(&envelope.id),
                &serialize(&claim)?,
                Duration::from_secs(self.config.visibility_timeout_secs),
            )
            .await?;

        debug!(envelope = %envelope.id, "Envelope claimed");
        Ok(Some((envelope.id, envelope.payload)))
    }

    /// Acknowledge successful processing, ending the claim
    ///
    /// The visibility record is deleted before the list entry: a crash in
    /// between leaves a record-less entry that the reaper re-queues, and
    /// the idempotent pipeline absorbs the duplicate. The reverse order
    /// could resurrect a claim for an envelope that no longer exists.
    #[instrument(skip(self))]
    pub async fn ack(&self, envelope_id: EnvelopeId) -> Result<(), ApplicationError> {
        self.store
            .delete(&[self.config.claim_key(&envelope_id)])
            .await?;
        self.remove_by_id(&self.config.processing_queue, envelope_id)
            .await?;
        debug!(envelope = %envelope_id, "Envelope acknowledged");
        Ok(())
    }

    /// Report failed processing, scheduling a retry or dead-lettering
    ///
    /// Returns `false` when no visibility record exists any more - the
    /// envelope was already reaped and is being handled through that path.
    #[instrument(skip(self, error))]
    pub async fn nack(
        &self,
        envelope_id: EnvelopeId,
        error: &str,
    ) -> Result<bool, ApplicationError> {
        let key = self.config.claim_key(&envelope_id);
        let Some(raw) = self.store.get(&key).await? else {
            debug!(envelope = %envelope_id, "No claim record for nack; envelope was reaped");
            return Ok(false);
        };

        let claim: ClaimRecord = match serde_json::from_str(&raw) {
            Ok(claim) => claim,
            Err(err) => {
                warn!(%key, error = %err, "Dropping corrupted claim record on nack");
                self.store.delete(&[key]).await?;
                return Ok(false);
            },
        };

        let mut envelope = claim.envelope;
        envelope.record_failure(error);

        self.store.delete(&[key]).await?;
        self.remove_by_id(&self.config.processing_queue, envelope_id)
            .await?;

        let blob = serialize(&envelope)?;
        if envelope.is_exhausted(self.config.max_retries) {
            self.store.push_front(&self.config.failed_queue, &blob).await?;
            warn!(
                envelope = %envelope_id,
                attempts = envelope.retry_count,
                "Envelope moved to failed queue"
            );
        } else {
            let delay = envelope.retry_delay_secs();
            let due = Utc::now().timestamp().saturating_add(delay as i64);
            self.store
                .zset_add(&self.config.retry_set(), &blob, due as f64)
                .await?;
            info!(
                envelope = %envelope_id,
                attempt = envelope.retry_count,
                delay_secs = delay,
                "Envelope scheduled for retry"
            );
        }
        Ok(true)
    }

    /// Move retry-scheduled envelopes whose due time has passed back to main
    ///
    /// Push-then-remove per envelope; a crash in between leaves a duplicate
    /// in `main`, which downstream idempotence absorbs.
    pub async fn promote_retries(&self) -> Result<usize, ApplicationError> {
        let retry_set = self.config.retry_set();
        let now = Utc::now().timestamp() as f64;
        let due = self.store.zset_range_by_score(&retry_set, 0.0, now).await?;

        let mut moved = 0usize;
        for blob in &due {
            self.store.push_front(&self.config.main_queue, blob).await?;
            self.store.zset_remove(&retry_set, blob).await?;
            moved += 1;
        }
        if moved > 0 {
            info!(count = moved, "Promoted retry envelopes back to main queue");
        }
        Ok(moved)
    }

    /// Reclassify claims whose visibility window has elapsed
    ///
    /// Two sweeps: claim records past their expiry (the TTL may not have
    /// fired yet), and processing-list entries whose record is already
    /// gone. Both count as timed out and go back to `main`, or to `failed`
    /// once the retry budget is spent.
    pub async fn reap_expired(&self) -> Result<usize, ApplicationError> {
        let now = Utc::now();
        let mut reaped = 0usize;

        for key in self
            .store
            .scan_keys(&self.config.claim_key_prefix())
            .await?
        {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<ClaimRecord>(&raw) {
                Ok(claim) if claim.is_expired(now) => {
                    let mut envelope = claim.envelope;
                    envelope.record_timeout();
                    self.store.delete(&[key]).await?;
                    self.remove_by_id(&self.config.processing_queue, envelope.id)
                        .await?;
                    self.route_timed_out(envelope).await?;
                    reaped += 1;
                },
                Ok(_) => {},
                Err(err) => {
                    warn!(%key, error = %err, "Dropping corrupted claim record");
                    self.store.delete(&[key]).await?;
                    reaped += 1;
                },
            }
        }

        for blob in self.store.list_range(&self.config.processing_queue).await? {
            match serde_json::from_str::<Envelope>(&blob) {
                Ok(mut envelope) => {
                    let key = self.config.claim_key(&envelope.id);
                    if self.store.get(&key).await?.is_none() {
                        envelope.record_timeout();
                        self.store
                            .list_remove(&self.config.processing_queue, 1, &blob)
                            .await?;
                        self.route_timed_out(envelope).await?;
                        reaped += 1;
                    }
                },
                Err(err) => {
                    warn!(error = %err, "Dropping corrupted entry from processing queue");
                    self.store
                        .list_remove(&self.config.processing_queue, 1, &blob)
                        .await?;
                    reaped += 1;
                },
            }
        }

        if reaped > 0 {
            info!(count = reaped, "Reaped expired claims");
        }
        Ok(reaped)
    }

    /// Per-queue counts
    pub async fn stats(&self) -> Result<QueueStats, ApplicationError> {
        Ok(QueueStats {
            main: self.store.list_len(&self.config.main_queue).await?,
            processing: self.store.list_len(&self.config.processing_queue).await?,
            retry: self.store.zset_card(&self.config.retry_set()).await?,
            failed: self.store.list_len(&self.config.failed_queue).await?,
            live_claims: self
                .store
                .scan_keys(&self.config.claim_key_prefix())
                .await?
                .len() as u64,
        })
    }

    /// Delete all four queues and every visibility record
    ///
    /// Administrative only; used by operator tooling.
    pub async fn clear(&self) -> Result<(), ApplicationError> {
        let mut keys = vec![
            self.config.main_queue.clone(),
            self.config.processing_queue.clone(),
            self.config.failed_queue.clone(),
            self.config.retry_set(),
        ];
        keys.extend(
            self.store
                .scan_keys(&self.config.claim_key_prefix())
                .await?,
        );
        self.store.delete(&keys).await?;
        info!("All queues cleared");
        Ok(())
    }

    /// Remove a processing-list entry by envelope id
    ///
    /// Entries are removed by exact blob equality against the stored bytes,
    /// so the list is scanned for the entry carrying the id first.
    async fn remove_by_id(
        &self,
        list: &str,
        envelope_id: EnvelopeId,
    ) -> Result<bool, ApplicationError> {
        for blob in self.store.list_range(list).await? {
            let Ok(envelope) = serde_json::from_str::<Envelope>(&blob) else {
                continue;
            };
            if envelope.id == envelope_id {
                self.store.list_remove(list, 1, &blob).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn route_timed_out(&self, envelope: Envelope) -> Result<(), ApplicationError> {
        let blob = serialize(&envelope)?;
        if envelope.is_exhausted(self.config.max_retries) {
            warn!(
                envelope = %envelope.id,
                attempts = envelope.retry_count,
                "Timed-out envelope moved to failed queue"
            );
            self.store.push_front(&self.config.failed_queue, &blob).await
        } else {
            info!(
                envelope = %envelope.id,
                attempt = envelope.retry_count,
                "Timed-out envelope returned to main queue"
            );
            self.store.push_front(&self.config.main_queue, &blob).await
        }
    }
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<String, ApplicationError> {
    serde_json::to_string(value).map_err(|e| ApplicationError::PayloadCorrupted(e.to_string()))
}

#[cfg(test)]
mod tests {
    use domain::{ReviewId, PROCESSING_TIMEOUT_ERROR};

    use super::*;
    use crate::testing::InMemoryQueueStore;

    fn review(id: &str) -> Review {
        Review::new(ReviewId::new(id).unwrap(), "2025-01-01", "4", "Good")
    }

    fn queue_with(config: QueueConfig) -> (Arc<InMemoryQueueStore>, ReliableQueue<InMemoryQueueStore>) {
        let store = Arc::new(InMemoryQueueStore::new());
        let queue = ReliableQueue::new(Arc::clone(&store), config);
        (store, queue)
    }

    fn default_queue() -> (Arc<InMemoryQueueStore>, ReliableQueue<InMemoryQueueStore>) {
        queue_with(QueueConfig::default())
    }

    fn worker() -> WorkerId {
        WorkerId::named("worker-test")
    }

    #[tokio::test]
    async fn enqueue_then_claim_returns_same_payload() {
        let (_store, queue) = default_queue();
        let review = review("R1");
        queue.enqueue(review.clone()).await.unwrap();

        let (_, claimed) = queue.claim(&worker()).await.unwrap().unwrap();
        assert_eq!(claimed, review);
    }

    #[tokio::test]
    async fn claim_on_empty_returns_none() {
        let (_store, queue) = default_queue();
        assert!(queue.claim(&worker()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_are_fifo() {
        let (_store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();
        queue.enqueue(review("R2")).await.unwrap();

        let (_, first) = queue.claim(&worker()).await.unwrap().unwrap();
        let (_, second) = queue.claim(&worker()).await.unwrap().unwrap();
        assert_eq!(first.review_id.as_str(), "R1");
        assert_eq!(second.review_id.as_str(), "R2");
    }

    #[tokio::test]
    async fn claim_writes_visibility_record() {
        let (store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();
        let (id, _) = queue.claim(&worker()).await.unwrap().unwrap();

        let raw = store
            .get(&queue.config().claim_key(&id))
            .await
            .unwrap()
            .unwrap();
        let claim: ClaimRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(claim.envelope.id, id);
        assert_eq!(claim.worker_id, worker());
        assert_eq!(
            (claim.expires_at - claim.started_at).num_seconds(),
            300
        );
    }

    #[tokio::test]
    async fn ack_leaves_system_empty() {
        let (_store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();
        let (id, _) = queue.claim(&worker()).await.unwrap().unwrap();
        queue.ack(id).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert!(stats.is_empty(), "expected empty stats, got {stats:?}");
    }

    #[tokio::test]
    async fn nack_schedules_retry_with_backoff() {
        let (store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();
        let (id, _) = queue.claim(&worker()).await.unwrap().unwrap();

        let before = Utc::now().timestamp();
        assert!(queue.nack(id, "analyzer down").await.unwrap());

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.retry, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.live_claims, 0);

        // First failure: retry_count 1, so due in 60 * 2^1 = 120 seconds
        let members = store
            .zset_range_by_score(&queue.config().retry_set(), 0.0, f64::MAX)
            .await
            .unwrap();
        let envelope: Envelope = serde_json::from_str(&members[0]).unwrap();
        assert_eq!(envelope.retry_count, 1);
        assert_eq!(envelope.last_error.as_deref(), Some("analyzer down"));

        let score = store
            .zset_score(&queue.config().retry_set(), &members[0])
            .await
            .unwrap();
        let delay = score as i64 - before;
        assert!((119..=121).contains(&delay), "unexpected delay {delay}");
    }

    #[tokio::test]
    async fn nack_without_claim_record_returns_false() {
        let (_store, queue) = default_queue();
        assert!(!queue.nack(EnvelopeId::new(), "whatever").await.unwrap());
    }

    #[tokio::test]
    async fn repeated_nacks_end_in_failed_queue() {
        let (store, queue) = default_queue();
        queue.enqueue(review("R4")).await.unwrap();

        for attempt in 1..=3 {
            let (id, _) = queue.claim(&worker()).await.unwrap().unwrap();
            assert!(queue.nack(id, "always fails").await.unwrap());
            if attempt < 3 {
                // Make the scheduled retry due immediately and re-run promotion
                store.force_all_due(&queue.config().retry_set()).await;
                assert_eq!(queue.promote_retries().await.unwrap(), 1);
            }
        }

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.main, 0);
        assert_eq!(stats.retry, 0);
        assert_eq!(stats.processing, 0);

        let failed = store.list_range(&queue.config().failed_queue).await.unwrap();
        let envelope: Envelope = serde_json::from_str(&failed[0]).unwrap();
        assert_eq!(envelope.retry_count, 3);
        assert!(envelope.last_error.is_some());
    }

    #[tokio::test]
    async fn backoff_delays_double_per_attempt() {
        let (store, queue) = default_queue();
        queue.enqueue(review("R4")).await.unwrap();

        let mut delays = Vec::new();
        for _ in 0..2 {
            let (id, _) = queue.claim(&worker()).await.unwrap().unwrap();
            let before = Utc::now().timestamp();
            queue.nack(id, "boom").await.unwrap();

            let members = store
                .zset_range_by_score(&queue.config().retry_set(), 0.0, f64::MAX)
                .await
                .unwrap();
            let score = store
                .zset_score(&queue.config().retry_set(), &members[0])
                .await
                .unwrap();
            delays.push(score as i64 - before);

            store.force_all_due(&queue.config().retry_set()).await;
            queue.promote_retries().await.unwrap();
        }

        assert!((119..=121).contains(&delays[0]), "first delay {}", delays[0]);
        assert!((239..=241).contains(&delays[1]), "second delay {}", delays[1]);
    }

    #[tokio::test]
    async fn promote_skips_entries_not_yet_due() {
        let (store, queue) = default_queue();
        let blob = serialize(&Envelope::new(review("R1"))).unwrap();
        let future = (Utc::now().timestamp() + 600) as f64;
        store
            .zset_add(&queue.config().retry_set(), &blob, future)
            .await
            .unwrap();

        assert_eq!(queue.promote_retries().await.unwrap(), 0);
        assert_eq!(queue.stats().await.unwrap().retry, 1);
    }

    #[tokio::test]
    async fn promote_takes_entry_due_exactly_now() {
        let (store, queue) = default_queue();
        let blob = serialize(&Envelope::new(review("R1"))).unwrap();
        let now = Utc::now().timestamp() as f64;
        store
            .zset_add(&queue.config().retry_set(), &blob, now)
            .await
            .unwrap();

        assert_eq!(queue.promote_retries().await.unwrap(), 1);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.main, 1);
        assert_eq!(stats.retry, 0);
    }

    #[tokio::test]
    async fn reap_requeues_entry_whose_claim_record_vanished() {
        // Visibility timeout of zero: the claim record expires immediately,
        // modeling a worker that died right after claiming.
        let config = QueueConfig {
            visibility_timeout_secs: 0,
            ..QueueConfig::default()
        };
        let (_store, queue) = queue_with(config);
        queue.enqueue(review("R5")).await.unwrap();
        queue.claim(&worker()).await.unwrap().unwrap();

        assert_eq!(queue.reap_expired().await.unwrap(), 1);

        let (_, reclaimed) = queue.claim(&worker()).await.unwrap().unwrap();
        assert_eq!(reclaimed.review_id.as_str(), "R5");
    }

    #[tokio::test]
    async fn reap_handles_claim_record_past_expiry() {
        let (store, queue) = default_queue();
        let envelope = Envelope::new(review("R5"));
        let blob = serialize(&envelope).unwrap();
        store
            .push_front(&queue.config().processing_queue, &blob)
            .await
            .unwrap();

        // Claim record still present in the store but logically expired
        let mut claim = ClaimRecord::new(envelope.clone(), worker(), 300);
        claim.expires_at = Utc::now() - chrono::Duration::seconds(5);
        store
            .set_with_ttl(
                &queue.config().claim_key(&envelope.id),
                &serialize(&claim).unwrap(),
                Duration::from_secs(600),
            )
            .await
            .unwrap();

        assert_eq!(queue.reap_expired().await.unwrap(), 1);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.main, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.live_claims, 0);

        let main = store.list_range(&queue.config().main_queue).await.unwrap();
        let requeued: Envelope = serde_json::from_str(&main[0]).unwrap();
        assert_eq!(requeued.retry_count, 1);
        assert_eq!(requeued.last_error.as_deref(), Some(PROCESSING_TIMEOUT_ERROR));
        assert!(requeued.timed_out_at.is_some());
    }

    #[tokio::test]
    async fn reap_dead_letters_exhausted_envelope() {
        let config = QueueConfig {
            visibility_timeout_secs: 0,
            ..QueueConfig::default()
        };
        let (store, queue) = queue_with(config);

        let mut envelope = Envelope::new(review("R5"));
        envelope.record_failure("e1");
        envelope.record_failure("e2");
        store
            .push_front(&queue.config().processing_queue, &serialize(&envelope).unwrap())
            .await
            .unwrap();

        assert_eq!(queue.reap_expired().await.unwrap(), 1);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.main, 0);
    }

    #[tokio::test]
    async fn reap_ignores_live_claims() {
        let (_store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();
        queue.claim(&worker()).await.unwrap().unwrap();

        assert_eq!(queue.reap_expired().await.unwrap(), 0);
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.live_claims, 1);
    }

    #[tokio::test]
    async fn reap_drops_corrupted_claim_record() {
        let (store, queue) = default_queue();
        let key = format!("{}garbage-id", queue.config().claim_key_prefix());
        store
            .set_with_ttl(&key, "not json", Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(queue.reap_expired().await.unwrap(), 1);
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reap_drops_corrupted_processing_entry() {
        let (store, queue) = default_queue();
        store
            .push_front(&queue.config().processing_queue, "garbage")
            .await
            .unwrap();

        assert_eq!(queue.reap_expired().await.unwrap(), 1);
        assert_eq!(queue.stats().await.unwrap().processing, 0);
    }

    #[tokio::test]
    async fn stats_count_each_queue() {
        let (store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();
        queue.enqueue(review("R2")).await.unwrap();
        queue.claim(&worker()).await.unwrap().unwrap();
        store
            .zset_add(&queue.config().retry_set(), "member", 99.0)
            .await
            .unwrap();
        store
            .push_front(&queue.config().failed_queue, "dead")
            .await
            .unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.main, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.retry, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.live_claims, 1);
        assert_eq!(stats.total(), 4);
    }

    #[tokio::test]
    async fn clear_then_roundtrip_succeeds() {
        let (store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();
        queue.enqueue(review("R2")).await.unwrap();
        queue.claim(&worker()).await.unwrap().unwrap();
        store
            .push_front(&queue.config().failed_queue, "dead")
            .await
            .unwrap();

        queue.clear().await.unwrap();
        assert!(queue.stats().await.unwrap().is_empty());

        // The queue is fully usable afterwards
        queue.enqueue(review("R3")).await.unwrap();
        let (id, _) = queue.claim(&worker()).await.unwrap().unwrap();
        queue.ack(id).await.unwrap();
        assert!(queue.stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn envelope_lives_in_exactly_one_queue() {
        let (store, queue) = default_queue();
        queue.enqueue(review("R1")).await.unwrap();

        let count_all = |store: Arc<InMemoryQueueStore>, queue_config: QueueConfig| async move {
            let mut total = 0;
            for list in [
                &queue_config.main_queue,
                &queue_config.processing_queue,
                &queue_config.failed_queue,
            ] {
                total += store.list_len(list).await.unwrap();
            }
            total + store.zset_card(&queue_config.retry_set()).await.unwrap()
        };

        assert_eq!(count_all(Arc::clone(&store), queue.config().clone()).await, 1);

        let (id, _) = queue.claim(&worker()).await.unwrap().unwrap();
        assert_eq!(count_all(Arc::clone(&store), queue.config().clone()).await, 1);

        queue.nack(id, "fail").await.unwrap();
        assert_eq!(count_all(Arc::clone(&store), queue.config().clone()).await, 1);

        store.force_all_due(&queue.config().retry_set()).await;
        queue.promote_retries().await.unwrap();
        assert_eq!(count_all(Arc::clone(&store), queue.config().clone()).await, 1);
    }

    #[test]
    fn derived_names_follow_main_queue() {
        let config = QueueConfig {
            main_queue: "reviews".to_string(),
            processing_queue: "reviews_processing".to_string(),
            ..QueueConfig::default()
        };
        assert_eq!(config.retry_set(), "reviews:retry");
        let id = EnvelopeId::new();
        assert_eq!(config.claim_key(&id), format!("reviews_processing:{id}"));
        assert!(config.claim_key(&id).starts_with(&config.claim_key_prefix()));
    }
}
