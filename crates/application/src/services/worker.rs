//! Review worker - long-running queue consumer
//!
//! Claims envelopes, drives them through the processing pipeline, and
//! always ends the claim with an ack or a nack. A bounded in-process retry
//! smooths over transient pipeline errors; the queue's nack-plus-backoff
//! path remains the authoritative retry discipline. A worker that dies
//! mid-claim is corrected by the maintenance reaper once the visibility
//! timeout elapses.

use std::sync::Arc;
use std::time::Duration;

use domain::{Review, WorkerId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{PipelineReport, ProcessorPort, QueueStorePort};
use crate::services::ReliableQueue;

/// Worker loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// In-process pipeline attempts per claimed message
    #[serde(default = "default_inner_retries")]
    pub inner_retries: u32,

    /// Seconds between in-process attempts
    #[serde(default = "default_inner_delay")]
    pub inner_delay_secs: u64,

    /// Seconds to nap when the queue is empty
    #[serde(default = "default_idle_sleep")]
    pub idle_sleep_secs: u64,
}

const fn default_inner_retries() -> u32 {
    3
}

const fn default_inner_delay() -> u64 {
    5
}

const fn default_idle_sleep() -> u64 {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inner_retries: default_inner_retries(),
            inner_delay_secs: default_inner_delay(),
            idle_sleep_secs: default_idle_sleep(),
        }
    }
}

impl WorkerConfig {
    const fn inner_delay(&self) -> Duration {
        Duration::from_secs(self.inner_delay_secs)
    }

    const fn idle_sleep(&self) -> Duration {
        Duration::from_secs(self.idle_sleep_secs)
    }
}

/// A single queue consumer
pub struct ReviewWorker<S, P> {
    queue: Arc<ReliableQueue<S>>,
    processor: Arc<P>,
    id: WorkerId,
    config: WorkerConfig,
}

impl<S, P> std::fmt::Debug for ReviewWorker<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewWorker")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: QueueStorePort, P: ProcessorPort> ReviewWorker<S, P> {
    /// Create a worker with a stable identity
    #[must_use]
    pub fn new(
        queue: Arc<ReliableQueue<S>>,
        processor: Arc<P>,
        id: WorkerId,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            processor,
            id,
            config,
        }
    }

    /// This worker's identity
    #[must_use]
    pub const fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Consume the queue until the shutdown signal flips
    ///
    /// On shutdown the in-flight message is finished (acked or nacked)
    /// before the loop exits; an unfinished claim would only be recovered
    /// after its visibility timeout.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker = %self.id,
            inner_retries = self.config.inner_retries,
            inner_delay_secs = self.config.inner_delay_secs,
            "Worker started"
        );

        if !self.queue.is_connected().await {
            error!(worker = %self.id, "Cannot reach the queue store, worker exiting");
            return;
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.process_next(&mut shutdown).await {
                Ok(true) => {},
                Ok(false) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.idle_sleep()) => {},
                        _ = shutdown.changed() => {},
                    }
                },
                Err(err) => {
                    error!(worker = %self.id, error = %err, "Queue interaction failed");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.idle_sleep()) => {},
                        _ = shutdown.changed() => {},
                    }
                },
            }
        }
        info!(worker = %self.id, "Worker stopped");
    }

    /// Claim and fully handle one envelope
    ///
    /// Returns `Ok(false)` when the queue was empty.
    #[instrument(skip_all, fields(worker = %self.id))]
    async fn process_next(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool, ApplicationError> {
        let Some((envelope_id, review)) = self.queue.claim(&self.id).await? else {
            return Ok(false);
        };
        info!(envelope = %envelope_id, review = %review.review_id, "Processing review");

        match self.process_with_retries(&review, shutdown).await {
            Ok(report) => {
                if let Err(err) = self.queue.ack(envelope_id).await {
                    // The claim record will expire and the reaper re-queues
                    // the envelope; the idempotent pipeline absorbs the rerun.
                    error!(envelope = %envelope_id, error = %err, "Failed to acknowledge envelope");
                } else {
                    debug!(
                        review = %report.review_id,
                        duration_secs = report.duration_seconds,
                        "Review completed"
                    );
                }
            },
            Err(err) => {
                warn!(
                    envelope = %envelope_id,
                    review = %review.review_id,
                    error = %err,
                    "Review processing failed"
                );
                match self.queue.nack(envelope_id, &err.to_string()).await {
                    Ok(true) => {},
                    Ok(false) => {
                        debug!(envelope = %envelope_id, "Envelope already reaped before nack");
                    },
                    Err(nack_err) => {
                        error!(envelope = %envelope_id, error = %nack_err, "Failed to nack envelope");
                    },
                }
            },
        }
        Ok(true)
    }

    /// Bounded in-process retry of the pipeline call
    async fn process_with_retries(
        &self,
        review: &Review,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PipelineReport, ApplicationError> {
        let attempts = self.config.inner_retries.max(1);
        let mut last_error: Option<ApplicationError> = None;

        for attempt in 1..=attempts {
            match self.processor.process(review).await {
                Ok(report) => {
                    if attempt > 1 {
                        info!(
                            review = %review.review_id,
                            attempt,
                            "Pipeline succeeded after retry"
                        );
                    }
                    return Ok(report);
                },
                Err(err) => {
                    warn!(
                        review = %review.review_id,
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "Pipeline attempt failed"
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        if *shutdown.borrow() {
                            break;
                        }
                        tokio::select! {
                            () = tokio::time::sleep(self.config.inner_delay()) => {},
                            _ = shutdown.changed() => break,
                        }
                    }
                },
            }
        }

        Err(last_error
            .unwrap_or_else(|| ApplicationError::Internal("no pipeline attempt ran".to_string())))
    }
}
