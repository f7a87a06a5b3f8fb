//! Redis queue store adapter
//!
//! The only module that speaks the store's wire protocol. Everything else
//! sees the `QueueStorePort` capability surface; every Redis failure is
//! surfaced as the single retryable `StoreUnavailable` kind.

use std::time::Duration;

use application::{ApplicationError, QueueStorePort};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Connection settings for the queue store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub db: i64,

    /// Optional AUTH password
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    6379
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: 0,
            password: None,
        }
    }
}

impl StoreConfig {
    /// Build the connection URL for this configuration
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// `QueueStorePort` implementation over a Redis connection manager
///
/// The connection manager reconnects on its own; transient outages show up
/// as `StoreUnavailable` errors on individual calls until it recovers.
#[derive(Clone)]
pub struct RedisQueueStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueStore").finish_non_exhaustive()
    }
}

impl RedisQueueStore {
    /// Connect to the store described by `config`
    pub async fn connect(config: &StoreConfig) -> Result<Self, ApplicationError> {
        let client = Client::open(config.url()).map_err(map_store_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(map_store_error)?;
        info!(host = %config.host, port = config.port, db = config.db, "Connected to queue store");
        Ok(Self { conn })
    }
}

fn map_store_error(err: RedisError) -> ApplicationError {
    ApplicationError::StoreUnavailable(err.to_string())
}

#[async_trait]
impl QueueStorePort for RedisQueueStore {
    async fn push_front(&self, list: &str, blob: &str) -> Result<(), ApplicationError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(list, blob).await.map_err(map_store_error)?;
        Ok(())
    }

    async fn pop_back(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ApplicationError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(list, timeout.as_secs_f64())
            .await
            .map_err(map_store_error)?;
        Ok(popped.map(|(_, blob)| blob))
    }

    async fn atomic_move(
        &self,
        from: &str,
        to: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.brpoplpush(from, to, timeout.as_secs_f64())
            .await
            .map_err(map_store_error)
    }

    async fn list_len(&self, list: &str) -> Result<u64, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.llen(list).await.map_err(map_store_error)
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.lrange(list, 0, -1).await.map_err(map_store_error)
    }

    async fn list_remove(
        &self,
        list: &str,
        count: i64,
        blob: &str,
    ) -> Result<u64, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.lrem(list, count as isize, blob)
            .await
            .map_err(map_store_error)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        blob: &str,
        ttl: Duration,
    ) -> Result<(), ApplicationError> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, blob, seconds)
            .await
            .map_err(map_store_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_store_error)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, ApplicationError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await.map_err(map_store_error)
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.keys(format!("{prefix}*"))
            .await
            .map_err(map_store_error)
    }

    async fn zset_add(&self, key: &str, blob: &str, score: f64) -> Result<(), ApplicationError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.zadd(key, blob, score).await.map_err(map_store_error)?;
        Ok(())
    }

    async fn zset_range_by_score(
        &self,
        key: &str,
        lo: f64,
        hi: f64,
    ) -> Result<Vec<String>, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.zrangebyscore(key, lo, hi)
            .await
            .map_err(map_store_error)
    }

    async fn zset_remove(&self, key: &str, blob: &str) -> Result<u64, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.zrem(key, blob).await.map_err(map_store_error)
    }

    async fn zset_card(&self, key: &str) -> Result<u64, ApplicationError> {
        let mut conn = self.conn.clone();
        conn.zcard(key).await.map_err(map_store_error)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "Queue store ping failed");
                false
            },
        }
    }
}
