//! Port for the queue's key/value store
//!
//! This is the only capability surface the queue logic sees: list push/pop,
//! an atomic list-to-list move, string keys with TTL, key scans, and a
//! sorted set for the retry schedule. The adapter behind it is the single
//! place that speaks the store's wire protocol.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ApplicationError;

/// Port for the atomic primitives of the queue store
///
/// Every fallible operation surfaces failures as
/// [`ApplicationError::StoreUnavailable`]; callers treat them as retryable
/// and must not lose work on top of them.
#[async_trait]
pub trait QueueStorePort: Send + Sync {
    /// Push a blob onto the head of a list
    async fn push_front(&self, list: &str, blob: &str) -> Result<(), ApplicationError>;

    /// Pop the oldest blob off the tail of a list, blocking up to `timeout`
    async fn pop_back(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ApplicationError>;

    /// Atomically pop the oldest blob of `from` and push it onto `to`
    ///
    /// Blocks up to `timeout` when `from` is empty. Atomicity is what keeps
    /// a claimed message from vanishing between the two lists.
    async fn atomic_move(
        &self,
        from: &str,
        to: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ApplicationError>;

    /// Number of blobs in a list
    async fn list_len(&self, list: &str) -> Result<u64, ApplicationError>;

    /// All blobs in a list, head first
    async fn list_range(&self, list: &str) -> Result<Vec<String>, ApplicationError>;

    /// Remove up to `count` occurrences of an exact blob from a list
    ///
    /// Removing zero occurrences is not an error.
    async fn list_remove(
        &self,
        list: &str,
        count: i64,
        blob: &str,
    ) -> Result<u64, ApplicationError>;

    /// Set a string key with a store-enforced time-to-live
    async fn set_with_ttl(
        &self,
        key: &str,
        blob: &str,
        ttl: Duration,
    ) -> Result<(), ApplicationError>;

    /// Read a string key; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, ApplicationError>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64, ApplicationError>;

    /// All live keys starting with `prefix`
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, ApplicationError>;

    /// Add a member to a sorted set (score = due time)
    async fn zset_add(&self, key: &str, blob: &str, score: f64) -> Result<(), ApplicationError>;

    /// Members with score in `[lo, hi]`, ascending
    async fn zset_range_by_score(
        &self,
        key: &str,
        lo: f64,
        hi: f64,
    ) -> Result<Vec<String>, ApplicationError>;

    /// Remove a member from a sorted set, returning how many were removed
    async fn zset_remove(&self, key: &str, blob: &str) -> Result<u64, ApplicationError>;

    /// Cardinality of a sorted set
    async fn zset_card(&self, key: &str) -> Result<u64, ApplicationError>;

    /// Liveness probe against the store
    async fn ping(&self) -> bool;
}
