//! Crawl orchestration - bounded concurrent draining of the work queue
//!
//! The orchestrator claims up to `concurrency` items, runs one task per item,
//! waits for the whole batch, logs progress, and repeats until a claim
//! attempt comes back empty. All state lives in the queue, so running it
//! again later simply continues where the previous run stopped.

use crate::crawler::traits::WorkerError;
use crate::crawler::worker::{FetchWorker, ItemOutcome};
use crate::storage::{ProgressSnapshot, StorageError};
use futures::future::join_all;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinError;

/// Totals for one call to `CrawlOrchestrator::run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: u64,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub records: u64,
    /// True if the run stopped because shutdown was requested
    pub interrupted: bool,
    /// Queue state after the last batch
    pub snapshot: ProgressSnapshot,
}

/// Drains the work queue with bounded concurrency
pub struct CrawlOrchestrator {
    worker: FetchWorker,
    shutdown: Option<watch::Receiver<bool>>,
}

impl CrawlOrchestrator {
    pub fn new(worker: FetchWorker) -> Self {
        Self {
            worker,
            shutdown: None,
        }
    }

    /// Stops claiming new batches once `shutdown` flips to true
    ///
    /// The batch in flight at that moment is allowed to finish.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map_or(false, |receiver| *receiver.borrow())
    }

    /// Runs until the queue has nothing claimable
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The queue drained, or shutdown was requested
    /// * `Err(HarvestError)` - The queue could not be read or written
    pub async fn run(&self, concurrency: usize) -> crate::Result<RunSummary> {
        let concurrency = concurrency.max(1);
        let queue = self.worker.queue().clone();
        let mut summary = RunSummary::default();
        let start_time = Instant::now();

        tracing::info!("Starting crawl with concurrency {}", concurrency);

        loop {
            if self.shutdown_requested() {
                tracing::info!("Shutdown requested, not claiming further items");
                summary.interrupted = true;
                break;
            }

            let mut batch = Vec::with_capacity(concurrency);
            while batch.len() < concurrency {
                match queue.claim_next()? {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }

            if batch.is_empty() {
                tracing::info!("No claimable items left, crawl complete");
                break;
            }

            summary.batches += 1;
            tracing::debug!("Batch {}: {} items", summary.batches, batch.len());

            let (keys, handles): (Vec<String>, Vec<_>) = batch
                .into_iter()
                .map(|item| {
                    let worker = self.worker.clone();
                    let key = item.key.clone();
                    (key, tokio::spawn(async move { worker.process(&item).await }))
                })
                .unzip();

            for (key, joined) in keys.into_iter().zip(join_all(handles).await) {
                let outcome = self.settle(&key, joined)?;
                summary.attempted += 1;
                match outcome {
                    ItemOutcome::Completed { records } => {
                        summary.succeeded += 1;
                        summary.records += records as u64;
                    }
                    ItemOutcome::Failed { .. } => summary.failed += 1,
                }
            }

            let snapshot = queue.progress_snapshot()?;
            let rate = summary.attempted as f64 / start_time.elapsed().as_secs_f64().max(0.001);
            tracing::info!(
                "Progress: {} completed, {} failed, {} pending, {} processing ({:.2} items/sec)",
                snapshot.completed,
                snapshot.failed,
                snapshot.pending,
                snapshot.processing,
                rate
            );
            summary.snapshot = snapshot;
        }

        summary.snapshot = queue.progress_snapshot()?;
        tracing::info!(
            "Crawl finished: {} attempted, {} succeeded, {} failed in {} batches",
            summary.attempted,
            summary.succeeded,
            summary.failed,
            summary.batches
        );

        Ok(summary)
    }

    /// Turns a finished task into an outcome, failing the item if it panicked
    fn settle(
        &self,
        key: &str,
        joined: Result<Result<ItemOutcome, StorageError>, JoinError>,
    ) -> Result<ItemOutcome, StorageError> {
        match joined {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let reason = panic_message(join_error);
                tracing::error!("Worker for {} panicked: {}", key, reason);
                self.worker.fail(key, &WorkerError::Panicked(reason))
            }
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return "task cancelled".to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
