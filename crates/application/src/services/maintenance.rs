//! Queue maintenance - periodic promotion, reaping, and health reporting
//!
//! One maintenance task runs per deployment. Each cycle it promotes due
//! retries back to the main queue, reaps claims whose visibility timeout
//! elapsed, and emits per-queue counts with threshold warnings. A store
//! outage skips the cycle; it never brings the loop down.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::ports::QueueStorePort;
use crate::services::{QueueStats, ReliableQueue};

/// Maintenance cadence and alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between maintenance cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Seconds between full statistics snapshots in the log
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,

    /// Warn when the main queue backlog exceeds this
    #[serde(default = "default_main_threshold")]
    pub main_backlog_threshold: u64,

    /// Warn when live claims exceed this
    #[serde(default = "default_claims_threshold")]
    pub live_claims_threshold: u64,

    /// Warn when the failed queue exceeds this
    #[serde(default = "default_failed_threshold")]
    pub failed_threshold: u64,

    /// Warn when the retry schedule exceeds this
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: u64,
}

const fn default_interval() -> u64 {
    30
}

const fn default_snapshot_interval() -> u64 {
    300
}

const fn default_main_threshold() -> u64 {
    1000
}

const fn default_claims_threshold() -> u64 {
    100
}

const fn default_failed_threshold() -> u64 {
    50
}

const fn default_retry_threshold() -> u64 {
    100
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            snapshot_interval_secs: default_snapshot_interval(),
            main_backlog_threshold: default_main_threshold(),
            live_claims_threshold: default_claims_threshold(),
            failed_threshold: default_failed_threshold(),
            retry_threshold: default_retry_threshold(),
        }
    }
}

/// Outcome of one maintenance cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Cycle was skipped because the store was unreachable
    pub skipped: bool,
    /// Envelopes moved from the retry schedule back to main
    pub promoted: usize,
    /// Expired claims reclassified
    pub reaped: usize,
    /// Queue counts at the end of the cycle, when available
    pub stats: Option<QueueStats>,
}

/// Point-in-time health of the maintenance subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceHealth {
    pub healthy: bool,
    pub store_connected: bool,
    pub stats: Option<QueueStats>,
    pub checked_at: DateTime<Utc>,
}

/// The periodic maintenance task
pub struct QueueMaintenance<S> {
    queue: Arc<ReliableQueue<S>>,
    config: MaintenanceConfig,
}

impl<S> std::fmt::Debug for QueueMaintenance<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMaintenance")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: QueueStorePort> QueueMaintenance<S> {
    /// Create a maintenance task over a queue
    #[must_use]
    pub fn new(queue: Arc<ReliableQueue<S>>, config: MaintenanceConfig) -> Self {
        Self { queue, config }
    }

    /// Run cycles until the shutdown signal flips
    ///
    /// The in-progress cycle always completes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval_secs,
            "Queue maintenance started"
        );
        let snapshot_every =
            (self.config.snapshot_interval_secs / self.config.interval_secs.max(1)).max(1);
        let mut cycle = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = self.run_cycle().await;
            if let Some(stats) = &report.stats {
                if cycle % snapshot_every == 0 {
                    log_snapshot(stats);
                }
                self.check_health(stats);
            }
            cycle += 1;

            tokio::select! {
                () = tokio::time::sleep(std::time::Duration::from_secs(self.config.interval_secs)) => {},
                _ = shutdown.changed() => {},
            }
        }
        info!("Queue maintenance stopped");
    }

    /// Run a single cycle: ping gate, promote, reap, stats
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        if !self.queue.is_connected().await {
            error!("Queue store unreachable, skipping maintenance cycle");
            return CycleReport {
                skipped: true,
                ..CycleReport::default()
            };
        }

        let promoted = match self.queue.promote_retries().await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "Retry promotion failed");
                0
            },
        };

        let reaped = match self.queue.reap_expired().await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "Expired claim reaping failed");
                0
            },
        };

        let stats = match self.queue.stats().await {
            Ok(stats) => Some(stats),
            Err(err) => {
                error!(error = %err, "Could not read queue statistics");
                None
            },
        };

        if promoted > 0 || reaped > 0 {
            info!(
                promoted,
                reaped,
                duration_ms = started.elapsed().as_millis() as u64,
                "Maintenance cycle completed"
            );
        }

        CycleReport {
            skipped: false,
            promoted,
            reaped,
            stats,
        }
    }

    /// Evaluate backlog thresholds, warning on each breach
    fn check_health(&self, stats: &QueueStats) -> Vec<String> {
        let mut issues = Vec::new();
        if stats.main > self.config.main_backlog_threshold {
            issues.push(format!("main queue backlog at {} envelopes", stats.main));
        }
        if stats.live_claims > self.config.live_claims_threshold {
            issues.push(format!("{} claims in flight", stats.live_claims));
        }
        if stats.failed > self.config.failed_threshold {
            issues.push(format!("{} envelopes in the failed queue", stats.failed));
        }
        if stats.retry > self.config.retry_threshold {
            issues.push(format!("{} envelopes awaiting retry", stats.retry));
        }
        for issue in &issues {
            warn!(issue = %issue, "Queue health issue detected");
        }
        issues
    }

    /// Current health of the queue subsystem
    pub async fn health_status(&self) -> MaintenanceHealth {
        let store_connected = self.queue.is_connected().await;
        let stats = if store_connected {
            self.queue.stats().await.ok()
        } else {
            None
        };
        let healthy = store_connected
            && stats.is_some_and(|s| s.live_claims < self.config.live_claims_threshold * 2);
        MaintenanceHealth {
            healthy,
            store_connected,
            stats,
            checked_at: Utc::now(),
        }
    }
}

fn log_snapshot(stats: &QueueStats) {
    info!(
        main = stats.main,
        processing = stats.processing,
        retry = stats.retry,
        failed = stats.failed,
        live_claims = stats.live_claims,
        total = stats.total(),
        "Queue statistics"
    );
}
