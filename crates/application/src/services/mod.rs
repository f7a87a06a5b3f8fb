//! Application services

mod maintenance;
mod pipeline;
mod reliable_queue;
mod worker;

pub use maintenance::{CycleReport, MaintenanceConfig, MaintenanceHealth, QueueMaintenance};
pub use pipeline::{ProcessingSummary, RetryOutcome, ReviewPipeline};
pub use reliable_queue::{QueueConfig, QueueStats, ReliableQueue};
pub use worker::{ReviewWorker, WorkerConfig};
