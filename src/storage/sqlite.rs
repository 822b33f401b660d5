//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `WorkQueue` and
//! `ResultStore` traits. The connection sits behind a mutex so one store can
//! serve every concurrent worker; claims additionally run inside
//! `BEGIN IMMEDIATE` transactions so separate processes sharing the same file
//! never claim the same key either.

use crate::crawler::{RetryDecision, RetryPolicy, WorkerError};
use crate::state::ItemStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ResultStore, StorageError, StorageResult, WorkQueue};
use crate::storage::{
    ProgressSnapshot, ResultRecord, RunRecord, RunStatus, StaleClaim, WorkItem,
};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const ITEM_COLUMNS: &str =
    "id, key, status, retry_count, error, last_attempted, processing_started, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    policy: RetryPolicy,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            policy: RetryPolicy::default(),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy applied by `claim_next`
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ===== Run Management =====

    /// Creates a new crawl run and returns its id
    pub fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![Utc::now(), config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Marks a run as finished with the given status
    pub fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), Utc::now(), run_id],
        )?;
        Ok(())
    }

    /// Gets the most recent run
    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    let status: String = row.get(4)?;
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&status).ok_or_else(|| {
                            invalid_status(4, status.clone())
                        })?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}

fn invalid_status(column: usize, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        Box::new(StorageError::InvalidStatus(value)),
    )
}

fn row_to_work_item(row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    let status: String = row.get(2)?;
    Ok(WorkItem {
        id: row.get(0)?,
        key: row.get(1)?,
        status: ItemStatus::from_db_string(&status).ok_or_else(|| invalid_status(2, status.clone()))?,
        retry_count: row.get(3)?,
        error: row.get(4)?,
        last_attempted: row.get(5)?,
        processing_started: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl WorkQueue for SqliteStorage {
    fn enqueue(&self, key: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO work_items (key, status, created_at) VALUES (?1, ?2, ?3)",
            params![key, ItemStatus::Pending.to_db_string(), Utc::now()],
        )?;
        Ok(inserted == 1)
    }

    fn enqueue_many(&self, keys: &[String]) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO work_items (key, status, created_at) VALUES (?1, ?2, ?3)",
            )?;
            for key in keys {
                inserted += stmt.execute(params![
                    key,
                    ItemStatus::Pending.to_db_string(),
                    Utc::now()
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn claim_next(&self) -> StorageResult<Option<WorkItem>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate = tx
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM work_items
                     WHERE status = ?1 OR (status = ?2 AND retry_count < ?3)
                     ORDER BY retry_count ASC, id ASC
                     LIMIT 1"
                ),
                params![
                    ItemStatus::Pending.to_db_string(),
                    ItemStatus::Failed.to_db_string(),
                    self.policy.max_retries
                ],
                row_to_work_item,
            )
            .optional()?;

        let Some(mut item) = candidate else {
            tx.commit()?;
            return Ok(None);
        };
        debug_assert_eq!(
            self.policy.decide(item.status, item.retry_count),
            RetryDecision::EligibleNow
        );
        debug_assert!(item.status.can_transition_to(ItemStatus::Processing));

        let now = Utc::now();
        tx.execute(
            "UPDATE work_items SET status = ?1, processing_started = ?2 WHERE id = ?3",
            params![ItemStatus::Processing.to_db_string(), now, item.id],
        )?;
        tx.commit()?;

        item.status = ItemStatus::Processing;
        item.processing_started = Some(now);
        Ok(Some(item))
    }

    fn report_success(&self, key: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE work_items
             SET status = ?1, error = NULL, processing_started = NULL, last_attempted = ?2
             WHERE key = ?3 AND status = ?4",
            params![
                ItemStatus::Completed.to_db_string(),
                Utc::now(),
                key,
                ItemStatus::Processing.to_db_string()
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotClaimed(key.to_string()));
        }
        Ok(())
    }

    fn report_failure(&self, key: &str, error: &str) -> StorageResult<u32> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE work_items
             SET status = ?1, error = ?2, retry_count = retry_count + 1,
                 processing_started = NULL, last_attempted = ?3
             WHERE key = ?4 AND status = ?5",
            params![
                ItemStatus::Failed.to_db_string(),
                error,
                Utc::now(),
                key,
                ItemStatus::Processing.to_db_string()
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotClaimed(key.to_string()));
        }
        let retry_count: u32 = tx.query_row(
            "SELECT retry_count FROM work_items WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(retry_count)
    }

    fn reset_failed(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let reset = conn.execute(
            "UPDATE work_items SET status = ?1, retry_count = 0, error = NULL WHERE status = ?2",
            params![
                ItemStatus::Pending.to_db_string(),
                ItemStatus::Failed.to_db_string()
            ],
        )?;
        Ok(reset)
    }

    fn sweep_stale(&self, older_than: Duration) -> StorageResult<Vec<StaleClaim>> {
        let threshold = chrono::Duration::from_std(older_than)
            .map_err(|e| StorageError::Database(format!("Invalid staleness threshold: {}", e)))?;
        let now = Utc::now();
        let Some(cutoff) = now.checked_sub_signed(threshold) else {
            return Ok(Vec::new());
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let claimed: Vec<WorkItem> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM work_items WHERE status = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(
                params![ItemStatus::Processing.to_db_string()],
                row_to_work_item,
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut swept = Vec::new();
        for item in claimed {
            // A processing row without a start time can only come from a crash
            let is_stale = item
                .processing_started
                .map_or(true, |started| started <= cutoff);
            if !is_stale {
                continue;
            }

            let since = item
                .processing_started
                .map_or_else(|| "unknown".to_string(), |started| started.to_rfc3339());
            let message = WorkerError::StaleClaim(since).to_string();
            tx.execute(
                "UPDATE work_items
                 SET status = ?1, error = ?2, retry_count = retry_count + 1,
                     processing_started = NULL, last_attempted = ?3
                 WHERE id = ?4",
                params![ItemStatus::Failed.to_db_string(), message, now, item.id],
            )?;
            swept.push(StaleClaim {
                key: item.key,
                processing_started: item.processing_started,
                retry_count: item.retry_count + 1,
            });
        }

        tx.commit()?;
        Ok(swept)
    }

    fn progress_snapshot(&self) -> StorageResult<ProgressSnapshot> {
        let conn = self.lock()?;
        let snapshot = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = ?3 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = ?4 THEN 1 ELSE 0 END), 0)
             FROM work_items",
            params![
                ItemStatus::Pending.to_db_string(),
                ItemStatus::Processing.to_db_string(),
                ItemStatus::Completed.to_db_string(),
                ItemStatus::Failed.to_db_string()
            ],
            |row| {
                Ok(ProgressSnapshot {
                    pending: row.get::<_, i64>(0)? as u64,
                    processing: row.get::<_, i64>(1)? as u64,
                    completed: row.get::<_, i64>(2)? as u64,
                    failed: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(snapshot)
    }

    fn get_item(&self, key: &str) -> StorageResult<Option<WorkItem>> {
        let conn = self.lock()?;
        let item = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM work_items WHERE key = ?1"),
                params![key],
                row_to_work_item,
            )
            .optional()?;
        Ok(item)
    }

    fn items_by_status(&self, status: ItemStatus) -> StorageResult<Vec<WorkItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM work_items WHERE status = ?1 ORDER BY id ASC"
        ))?;
        let items = stmt
            .query_map(params![status.to_db_string()], row_to_work_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

impl ResultStore for SqliteStorage {
    fn upsert(&self, record: &ResultRecord) -> StorageResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO results (key, source_tag, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(key) DO UPDATE SET
                source_tag = excluded.source_tag,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![record.key, record.source_tag, payload, Utc::now()],
        )?;
        Ok(())
    }

    fn get_result(&self, key: &str) -> StorageResult<Option<ResultRecord>> {
        let row: Option<(String, String, String)> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT key, source_tag, payload FROM results WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
        };

        row.map(|(key, source_tag, payload)| {
            Ok(ResultRecord {
                key,
                source_tag,
                payload: serde_json::from_str(&payload)?,
            })
        })
        .transpose()
    }

    fn all_results(&self) -> StorageResult<Vec<ResultRecord>> {
        let rows: Vec<(String, String, String)> = {
            let conn = self.lock()?;
            let mut stmt =
                conn.prepare("SELECT key, source_tag, payload FROM results ORDER BY key ASC")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        rows.into_iter()
            .map(|(key, source_tag, payload)| {
                Ok(ResultRecord {
                    key,
                    source_tag,
                    payload: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }

    fn count_results(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
