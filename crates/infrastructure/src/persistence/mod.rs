//! SQLite persistence for the review record store

mod connection;
mod error;
mod review_store;

pub use connection::{Database, DatabaseConfig};
pub use error::map_sqlx_error;
pub use review_store::SqliteReviewStore;
