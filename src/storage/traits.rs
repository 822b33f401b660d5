//! Storage traits and error types
//!
//! This module defines the trait interfaces for the two durable stores and
//! their shared error type. Both traits take `&self` so a single store can be
//! shared across concurrently running workers behind an `Arc`.

use crate::crawler::RetryPolicy;
use crate::state::ItemStatus;
use crate::storage::{ProgressSnapshot, ResultRecord, StaleClaim, WorkItem};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Item is not claimed: {0}")]
    NotClaimed(String),

    #[error("Invalid status in database: {0}")]
    InvalidStatus(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The durable work queue
///
/// Implementations must make `claim_next` exclusive: two concurrent callers
/// never receive the same key.
pub trait WorkQueue: Send + Sync {
    /// Inserts `key` as pending if absent
    ///
    /// Returns true if a new row was created.
    fn enqueue(&self, key: &str) -> StorageResult<bool>;

    /// Inserts every absent key in one transaction
    ///
    /// Returns the number of newly created rows.
    fn enqueue_many(&self, keys: &[String]) -> StorageResult<usize>;

    /// Atomically claims the next eligible item
    ///
    /// Eligible means pending, or failed with fewer than `max_retries`
    /// attempts. Items are preferred by retry count, then creation order.
    fn claim_next(&self) -> StorageResult<Option<WorkItem>>;

    /// Processing -> Completed
    fn report_success(&self, key: &str) -> StorageResult<()>;

    /// Processing -> Failed, returning the new retry count
    fn report_failure(&self, key: &str, error: &str) -> StorageResult<u32>;

    /// Failed -> Pending for every failed item, clearing retry counts
    fn reset_failed(&self) -> StorageResult<usize>;

    /// Fails every processing claim older than `older_than`
    fn sweep_stale(&self, older_than: Duration) -> StorageResult<Vec<StaleClaim>>;

    /// Counts per status from one consistent read
    fn progress_snapshot(&self) -> StorageResult<ProgressSnapshot>;

    /// Gets an item by key
    fn get_item(&self, key: &str) -> StorageResult<Option<WorkItem>>;

    /// Gets all items in a status, in creation order
    fn items_by_status(&self, status: ItemStatus) -> StorageResult<Vec<WorkItem>>;

    /// The retry policy this queue applies when claiming
    fn retry_policy(&self) -> RetryPolicy;
}

/// The durable result table
pub trait ResultStore: Send + Sync {
    /// Inserts or overwrites the record for `record.key`
    fn upsert(&self, record: &ResultRecord) -> StorageResult<()>;

    /// Gets a record by key
    fn get_result(&self, key: &str) -> StorageResult<Option<ResultRecord>>;

    /// Gets every record, ordered by key
    fn all_results(&self) -> StorageResult<Vec<ResultRecord>>;

    /// Counts stored records
    fn count_results(&self) -> StorageResult<u64>;
}
