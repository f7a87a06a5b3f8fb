//! revq CLI
//!
//! Operator tooling for the review queue: enqueue reviews, inspect and
//! clear the queues, purge the database, and run the long-lived worker and
//! maintenance loops.

#![allow(clippy::print_stdout)]

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use application::{QueueMaintenance, ReliableQueue, ReviewPipeline, ReviewWorker};
use clap::{Parser, Subcommand};
use domain::WorkerId;
use infrastructure::{
    AppConfig, Database, DeepSeekAnalyzer, RedisQueueStore, SqliteReviewStore,
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// revq CLI
#[derive(Parser)]
#[command(name = "revq")]
#[command(author, version, about = "Customer review queue CLI", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue every review from a CSV file
    EnqueueAll {
        /// Path to the reviews CSV
        csv_path: PathBuf,
    },

    /// Enqueue a single review
    EnqueueSingle {
        review_id: String,
        date: String,
        rating: String,
        text: String,
    },

    /// Show per-queue counts
    QueueStatus,

    /// Clear all queues and claim records
    ClearQueue,

    /// Delete every review record from the database (DANGEROUS)
    ClearDatabase {
        /// Operator token authorizing the deletion
        #[arg(long)]
        password: Option<String>,
    },

    /// Re-drive reviews marked failed through the pipeline
    RetryFailed,

    /// Run a review worker until interrupted
    Worker {
        /// Stable worker identity (generated when omitted)
        #[arg(long)]
        worker_id: Option<String>,
    },

    /// Run the queue maintenance loop until interrupted
    Maintenance,
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

async fn connect_queue(config: &AppConfig) -> anyhow::Result<Arc<ReliableQueue<RedisQueueStore>>> {
    let store = RedisQueueStore::connect(&config.store).await?;
    Ok(Arc::new(ReliableQueue::new(
        Arc::new(store),
        config.queue.clone(),
    )))
}

async fn open_repository(config: &AppConfig) -> anyhow::Result<Arc<SqliteReviewStore>> {
    let database = Database::connect(&config.database).await?;
    database.migrate().await?;
    Ok(Arc::new(SqliteReviewStore::new(database.pool().clone())))
}

async fn build_pipeline(
    config: &AppConfig,
) -> anyhow::Result<Arc<ReviewPipeline<DeepSeekAnalyzer, SqliteReviewStore>>> {
    let analyzer = Arc::new(DeepSeekAnalyzer::new(config.analyzer.clone())?);
    let repository = open_repository(config).await?;
    Ok(Arc::new(ReviewPipeline::new(analyzer, repository)))
}

/// Flip to `true` on the first interrupt signal
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = log_filter_from_verbosity(cli.verbose);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(filter)
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Commands::EnqueueAll { csv_path } => {
            let queue = connect_queue(&config).await?;
            let message = commands::enqueue_all(&queue, &csv_path).await?;
            println!("{message}");
        },

        Commands::EnqueueSingle {
            review_id,
            date,
            rating,
            text,
        } => {
            let queue = connect_queue(&config).await?;
            let message =
                commands::enqueue_single(&queue, &review_id, &date, &rating, &text).await?;
            println!("{message}");
        },

        Commands::QueueStatus => {
            let queue = connect_queue(&config).await?;
            let message = commands::queue_status(&queue).await?;
            println!("{message}");
        },

        Commands::ClearQueue => {
            let queue = connect_queue(&config).await?;
            let message = commands::clear_queue(&queue).await?;
            println!("{message}");
        },

        Commands::ClearDatabase { password } => {
            let repository = open_repository(&config).await?;
            let message =
                commands::clear_database(repository.as_ref(), password.as_deref()).await?;
            println!("{message}");
        },

        Commands::RetryFailed => {
            let pipeline = build_pipeline(&config).await?;
            let message = commands::retry_failed(&pipeline, config.queue.max_retries).await?;
            println!("{message}");
        },

        Commands::Worker { worker_id } => {
            let queue = connect_queue(&config).await?;
            let pipeline = build_pipeline(&config).await?;
            let id = worker_id.map_or_else(WorkerId::generate, WorkerId::named);
            let worker = ReviewWorker::new(queue, pipeline, id, config.worker.clone());
            worker.run(shutdown_signal()).await;
        },

        Commands::Maintenance => {
            let queue = connect_queue(&config).await?;
            let maintenance = QueueMaintenance::new(queue, config.maintenance.clone());
            maintenance.run(shutdown_signal()).await;
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(log_filter_from_verbosity(0), "warn");
        assert_eq!(log_filter_from_verbosity(1), "info");
        assert_eq!(log_filter_from_verbosity(2), "debug");
        assert_eq!(log_filter_from_verbosity(9), "trace");
    }

    #[test]
    fn cli_parses_worker_command() {
        let cli = Cli::parse_from(["revq", "worker", "--worker-id", "worker-7"]);
        match cli.command {
            Commands::Worker { worker_id } => assert_eq!(worker_id.as_deref(), Some("worker-7")),
            _ => panic!("expected worker command"),
        }
    }

    #[test]
    fn cli_parses_clear_database_password() {
        let cli = Cli::parse_from(["revq", "clear-database", "--password", "YES_DELETE_IT"]);
        match cli.command {
            Commands::ClearDatabase { password } => {
                assert_eq!(password.as_deref(), Some("YES_DELETE_IT"));
            },
            _ => panic!("expected clear-database command"),
        }
    }

    #[test]
    fn cli_parses_enqueue_single_positionals() {
        let cli = Cli::parse_from([
            "revq",
            "enqueue-single",
            "R1",
            "2025-01-01",
            "4",
            "Good product",
        ]);
        match cli.command {
            Commands::EnqueueSingle {
                review_id, rating, ..
            } => {
                assert_eq!(review_id, "R1");
                assert_eq!(rating, "4");
            },
            _ => panic!("expected enqueue-single command"),
        }
    }
}
