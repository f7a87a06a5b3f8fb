//! Port definitions for external collaborators

mod analyzer;
mod processor;
mod queue_store;
mod review_repository;

pub use analyzer::AnalyzerPort;
pub use processor::{PipelineReport, ProcessorPort};
pub use queue_store::QueueStorePort;
pub use review_repository::{PurgeCounts, ReviewRepositoryPort};
