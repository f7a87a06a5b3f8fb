//! Container wrappers for testcontainers integration.
//!
//! Provides a Redis container for queue-store integration tests. Tests
//! using it require a running Docker daemon and are `#[ignore]`d by
//! default.

use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;
use tracing::{debug, info};

/// Configuration for the Redis container
#[derive(Debug, Clone)]
pub struct RedisContainerConfig {
    /// Redis version tag (e.g., "7-alpine")
    pub version: String,
}

impl Default for RedisContainerConfig {
    fn default() -> Self {
        Self {
            version: "7-alpine".to_string(),
        }
    }
}

/// Redis container wrapper for integration tests.
#[derive(Debug)]
pub struct RedisContainer {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    connection_string: String,
    host: String,
    port: u16,
}

impl RedisContainer {
    /// Start a new Redis container with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start.
    pub async fn start() -> Result<Self, ContainerError> {
        Self::start_with_config(RedisContainerConfig::default()).await
    }

    /// Start a new Redis container with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start.
    pub async fn start_with_config(config: RedisContainerConfig) -> Result<Self, ContainerError> {
        info!(version = %config.version, "Starting Redis container");

        let container = Redis::default()
            .with_tag(&config.version)
            .start()
            .await
            .map_err(|e| ContainerError::Start(e.to_string()))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| ContainerError::Start(e.to_string()))?
            .to_string();

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .map_err(|e| ContainerError::Start(e.to_string()))?;

        let connection_string = format!("redis://{host}:{port}");

        debug!(host = %host, port = %port, "Redis container started");

        Ok(Self {
            container,
            connection_string,
            host,
            port,
        })
    }

    /// Get the connection string for this Redis instance.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Get the host address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the mapped port.
    pub const fn port(&self) -> u16 {
        self.port
    }
}

/// Errors that can occur when working with containers
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Container failed to start
    #[error("Container failed to start: {0}")]
    Start(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_config_default() {
        let config = RedisContainerConfig::default();
        assert_eq!(config.version, "7-alpine");
    }

    #[test]
    fn container_error_display() {
        let error = ContainerError::Start("test error".to_string());
        assert!(error.to_string().contains("test error"));
    }
}
