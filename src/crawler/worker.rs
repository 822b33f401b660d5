//! Single-item fetch cycle
//!
//! A `FetchWorker` takes one claimed item through rate limit, fetch, parse
//! and store, then reports the outcome to the queue. Per-item failures never
//! escape `process`; only a failure to write the queue itself does.

use crate::crawler::retry::RetryDecision;
use crate::crawler::traits::{Parser, Transport, WorkerError};
use crate::crawler::RateLimiter;
use crate::state::ItemStatus;
use crate::storage::{ResultStore, StorageError, WorkItem, WorkQueue};
use std::sync::Arc;

/// What happened to one claimed item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Completed, with the number of records stored
    Completed { records: usize },

    /// Failed; `retry_count` is the count after this failure
    Failed { retry_count: u32, error: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Runs the fetch/parse/store cycle for claimed items
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct FetchWorker {
    transport: Arc<dyn Transport>,
    parser: Arc<dyn Parser>,
    results: Arc<dyn ResultStore>,
    queue: Arc<dyn WorkQueue>,
    limiter: Arc<RateLimiter>,
}

impl FetchWorker {
    pub fn new(
        transport: Arc<dyn Transport>,
        parser: Arc<dyn Parser>,
        results: Arc<dyn ResultStore>,
        queue: Arc<dyn WorkQueue>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            transport,
            parser,
            results,
            queue,
            limiter,
        }
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    /// Processes one claimed item and reports its outcome
    ///
    /// # Returns
    ///
    /// * `Ok(ItemOutcome)` - The outcome that was recorded in the queue
    /// * `Err(StorageError)` - The outcome could not be recorded
    pub async fn process(&self, item: &WorkItem) -> Result<ItemOutcome, StorageError> {
        match self.attempt(&item.key).await {
            Ok(records) => {
                self.queue.report_success(&item.key)?;
                tracing::debug!("Completed {} ({} records)", item.key, records);
                Ok(ItemOutcome::Completed { records })
            }
            Err(error) => self.fail(&item.key, &error),
        }
    }

    /// Records a failure for `key` and logs whether it will be retried
    pub fn fail(&self, key: &str, error: &WorkerError) -> Result<ItemOutcome, StorageError> {
        let message = error.to_string();
        let retry_count = self.queue.report_failure(key, &message)?;

        match self
            .queue
            .retry_policy()
            .decide(ItemStatus::Failed, retry_count)
        {
            RetryDecision::EligibleNever => {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    key,
                    retry_count,
                    message
                );
            }
            _ => {
                tracing::warn!("Attempt {} failed for {}: {}", retry_count, key, message);
            }
        }

        Ok(ItemOutcome::Failed {
            retry_count,
            error: message,
        })
    }

    async fn attempt(&self, key: &str) -> Result<usize, WorkerError> {
        self.limiter.await_slot().await;

        let raw = self.transport.fetch(key).await?;

        let records = self.parser.parse(&raw, key)?;
        if records.is_empty() {
            return Err(WorkerError::EmptyContent);
        }

        for record in &records {
            self.results.upsert(record)?;
        }

        Ok(records.len())
    }
}
