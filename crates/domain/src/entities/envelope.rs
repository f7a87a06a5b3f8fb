//! Queue envelope - wraps a review with delivery metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Review;
use crate::value_objects::EnvelopeId;

/// Error string recorded when a claim outlives its visibility timeout
pub const PROCESSING_TIMEOUT_ERROR: &str = "Processing timeout";

/// Base delay in seconds for the retry backoff schedule
const BACKOFF_BASE_SECS: u64 = 60;

/// Ceiling in seconds for the retry backoff schedule
const BACKOFF_CAP_SECS: u64 = 3600;

/// The queue's wrapper around a review payload
///
/// Serialized as self-describing JSON and treated as an opaque blob by
/// the store. A fresh envelope is minted per enqueue, so the same
/// `review_id` enqueued twice yields two envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Globally unique envelope id, fresh per enqueue
    pub id: EnvelopeId,
    /// The wrapped review
    pub payload: Review,
    /// Number of delivery attempts that have failed so far
    pub retry_count: u32,
    /// When the envelope first entered the queue
    pub enqueued_at: DateTime<Utc>,
    /// Last failure reason, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the envelope last failed via negative acknowledgement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    /// When the envelope last timed out in processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timed_out_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Wrap a review in a fresh envelope
    #[must_use]
    pub fn new(payload: Review) -> Self {
        Self {
            id: EnvelopeId::new(),
            payload,
            retry_count: 0,
            enqueued_at: Utc::now(),
            last_error: None,
            failed_at: None,
            timed_out_at: None,
        }
    }

    /// Record a processing failure reported through nack
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.failed_at = Some(Utc::now());
    }

    /// Record a visibility-timeout expiry detected by the reaper
    pub fn record_timeout(&mut self) {
        self.retry_count += 1;
        self.last_error = Some(PROCESSING_TIMEOUT_ERROR.to_string());
        self.timed_out_at = Some(Utc::now());
    }

    /// Whether the retry budget is spent
    #[must_use]
    pub const fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    /// Backoff delay before the next attempt, in seconds
    ///
    /// `min(60 * 2^retry_count, 3600)`, evaluated against the current
    /// (post-increment) retry count.
    #[must_use]
    pub fn retry_delay_secs(&self) -> u64 {
        BACKOFF_BASE_SECS
            .saturating_mul(2u64.saturating_pow(self.retry_count))
            .min(BACKOFF_CAP_SECS)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::value_objects::ReviewId;

    fn sample_envelope() -> Envelope {
        Envelope::new(Review::new(
            ReviewId::new("R1").unwrap(),
            "2025-01-01",
            "4",
            "Good",
        ))
    }

    #[test]
    fn fresh_envelope_has_zero_retries() {
        let envelope = sample_envelope();
        assert_eq!(envelope.retry_count, 0);
        assert!(envelope.last_error.is_none());
        assert!(envelope.failed_at.is_none());
        assert!(envelope.timed_out_at.is_none());
    }

    #[test]
    fn two_envelopes_for_same_review_differ() {
        let a = sample_envelope();
        let b = sample_envelope();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn record_failure_increments_and_stamps() {
        let mut envelope = sample_envelope();
        envelope.record_failure("analyzer exploded");
        assert_eq!(envelope.retry_count, 1);
        assert_eq!(envelope.last_error.as_deref(), Some("analyzer exploded"));
        assert!(envelope.failed_at.is_some());
    }

    #[test]
    fn record_timeout_sets_canonical_error() {
        let mut envelope = sample_envelope();
        envelope.record_timeout();
        assert_eq!(envelope.retry_count, 1);
        assert_eq!(envelope.last_error.as_deref(), Some(PROCESSING_TIMEOUT_ERROR));
        assert!(envelope.timed_out_at.is_some());
    }

    #[test]
    fn exhaustion_at_max_retries() {
        let mut envelope = sample_envelope();
        assert!(!envelope.is_exhausted(3));
        envelope.record_failure("e1");
        envelope.record_failure("e2");
        assert!(!envelope.is_exhausted(3));
        envelope.record_failure("e3");
        assert!(envelope.is_exhausted(3));
    }

    #[test]
    fn backoff_schedule_doubles_from_first_failure() {
        let mut envelope = sample_envelope();
        envelope.record_failure("e");
        assert_eq!(envelope.retry_delay_secs(), 120);
        envelope.record_failure("e");
        assert_eq!(envelope.retry_delay_secs(), 240);
        envelope.record_failure("e");
        assert_eq!(envelope.retry_delay_secs(), 480);
    }

    #[test]
    fn backoff_is_capped_at_one_hour() {
        let mut envelope = sample_envelope();
        envelope.retry_count = 10;
        assert_eq!(envelope.retry_delay_secs(), 3600);
        envelope.retry_count = u32::MAX;
        assert_eq!(envelope.retry_delay_secs(), 3600);
    }

    #[test]
    fn wire_format_keeps_field_names() {
        let envelope = sample_envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("id").is_some());
        assert!(json.get("payload").is_some());
        assert!(json.get("retry_count").is_some());
        assert!(json.get("enqueued_at").is_some());
        // Optional fields stay off the wire until set
        assert!(json.get("last_error").is_none());
    }

    #[test]
    fn roundtrips_through_json() {
        let mut envelope = sample_envelope();
        envelope.record_failure("boom");
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
    }

    proptest! {
        #[test]
        fn backoff_is_monotone_and_capped(count in 0u32..64) {
            let mut envelope = sample_envelope();
            envelope.retry_count = count;
            let delay = envelope.retry_delay_secs();
            prop_assert!(delay >= 60);
            prop_assert!(delay <= 3600);

            envelope.retry_count = count.saturating_add(1);
            prop_assert!(envelope.retry_delay_secs() >= delay);
        }
    }
}
