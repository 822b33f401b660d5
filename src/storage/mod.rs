//! Storage module for persisting crawl progress and results
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The durable work queue and its claim/report protocol
//! - Result records keyed by entry id
//! - Run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ResultStore, StorageError, StorageResult, WorkQueue};

use crate::state::ItemStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// One unit of crawlable work
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub id: i64,
    pub key: String,
    pub status: ItemStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    pub last_attempted: Option<DateTime<Utc>>,
    pub processing_started: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Structured output for one entry
///
/// The payload is opaque to the queue engine; only the parser that produced
/// it knows its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub key: String,
    pub source_tag: String,
    pub payload: serde_json::Value,
}

impl ResultRecord {
    pub fn new(
        key: impl Into<String>,
        source_tag: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            key: key.into(),
            source_tag: source_tag.into(),
            payload,
        }
    }
}

/// Per-status item counts taken at a single point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl ProgressSnapshot {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn count(&self, status: ItemStatus) -> u64 {
        match status {
            ItemStatus::Pending => self.pending,
            ItemStatus::Processing => self.processing,
            ItemStatus::Completed => self.completed,
            ItemStatus::Failed => self.failed,
        }
    }
}

/// A processing claim whose worker is presumed dead
#[derive(Debug, Clone, PartialEq)]
pub struct StaleClaim {
    pub key: String,
    pub processing_started: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
