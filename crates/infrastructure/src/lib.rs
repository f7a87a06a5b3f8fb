#![forbid(unsafe_code)]
//! Infrastructure layer - Adapters for external systems
//!
//! Implements the ports defined in the application layer: the Redis queue
//! store, the LLM analyzer, SQLite persistence, CSV ingest, and
//! configuration loading.

pub mod adapters;
pub mod config;
pub mod ingest;
pub mod persistence;

#[cfg(test)]
pub mod testing;

pub use adapters::{AnalyzerConfig, DeepSeekAnalyzer, RedisQueueStore, StoreConfig};
pub use config::AppConfig;
pub use ingest::CsvReviewExtractor;
pub use persistence::{Database, DatabaseConfig, SqliteReviewStore};
