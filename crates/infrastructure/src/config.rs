//! Application configuration
//!
//! Defaults, then an optional `revq.toml` file, then `REVQ_*` environment
//! overrides (e.g. `REVQ_STORE_HOST`, `REVQ_QUEUE_MAX_RETRIES`).

use application::{MaintenanceConfig, QueueConfig, WorkerConfig};
use serde::{Deserialize, Serialize};

use crate::adapters::{AnalyzerConfig, StoreConfig};
use crate::persistence::DatabaseConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Queue store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Queue names and delivery policy
    #[serde(default)]
    pub queue: QueueConfig,

    /// Worker loop tuning
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Maintenance cadence and thresholds
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Review database
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Analyzer backend
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl AppConfig {
    /// Load configuration from defaults, optional file, and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("revq").required(false))
            .add_source(
                config::Environment::with_prefix("REVQ")
                    .separator("_")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
