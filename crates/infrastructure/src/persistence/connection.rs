//! Async database connection using sqlx with SQLite

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use application::ApplicationError;

use super::error::map_sqlx_error;

/// Configuration for the review database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_path")]
    pub path: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_path() -> String {
    "revq.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Async database connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if missing) the database described by `config`
    #[instrument(skip_all, fields(path = %config.path))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ApplicationError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))
            .map_err(map_sqlx_error)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        // WAL keeps readers from blocking the writer
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!("WAL mode enabled");

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );
        Ok(Self { pool })
    }

    /// Create an in-memory database for testing
    pub async fn in_memory() -> Result<Self, ApplicationError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(map_sqlx_error)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self { pool })
    }

    /// Get the underlying pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the schema when it does not exist yet
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), ApplicationError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS raw_reviews (
                review_id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                rating TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS structured_reviews (
                review_id TEXT PRIMARY KEY REFERENCES raw_reviews(review_id),
                overall_sentiment TEXT NOT NULL,
                sentiment_score REAL,
                topics_mentioned TEXT,
                problems_identified TEXT,
                suggested_improvements TEXT,
                key_insights TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS review_statuses (
                review_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                stage TEXT,
                error_message TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                duration_seconds REAL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                metadata TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        info!("Database migrations completed");
        Ok(())
    }
}
