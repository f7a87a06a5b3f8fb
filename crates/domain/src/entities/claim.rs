//! Claim record - authoritative proof that a delivery is in flight

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Envelope;
use crate::value_objects::WorkerId;

/// The visibility record written when a worker claims an envelope
///
/// Stored under `<processing_queue>:<envelope_id>` with a store-enforced
/// TTL equal to the visibility timeout. While this key exists and
/// `expires_at` is in the future, the claim is alive and the envelope is
/// hidden from other workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// The claimed envelope
    pub envelope: Envelope,
    /// Worker that owns the claim
    pub worker_id: WorkerId,
    /// When the claim was taken
    pub started_at: DateTime<Utc>,
    /// When the claim stops protecting the envelope
    pub expires_at: DateTime<Utc>,
}

impl ClaimRecord {
    /// Create a claim starting now and protected for `visibility_secs`
    #[must_use]
    pub fn new(envelope: Envelope, worker_id: WorkerId, visibility_secs: u64) -> Self {
        let started_at = Utc::now();
        let expires_at = started_at + chrono::Duration::seconds(visibility_secs.min(i64::MAX as u64) as i64);
        Self {
            envelope,
            worker_id,
            started_at,
            expires_at,
        }
    }

    /// Whether the visibility window has elapsed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
