//! Adapters implementing the application ports

mod deepseek_analyzer;
mod redis_queue_store;

pub use deepseek_analyzer::{AnalyzerConfig, DeepSeekAnalyzer};
pub use redis_queue_store::{RedisQueueStore, StoreConfig};
