//! Statistics from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! queue progress and run history from the storage layer.

use crate::state::ItemStatus;
use crate::storage::{ProgressSnapshot, ResultStore, RunRecord, SqliteStorage, WorkItem, WorkQueue};
use crate::Result;
use std::fmt::Write;

/// How many failed items are listed individually
const FAILED_SAMPLE: usize = 10;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Work items per status
    pub snapshot: ProgressSnapshot,

    /// Number of stored result records
    pub result_count: u64,

    /// The most recent crawl run, if any
    pub latest_run: Option<RunRecord>,

    /// The first few failed items, in creation order
    pub failed_sample: Vec<WorkItem>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &SqliteStorage) -> Result<HarvestStatistics> {
    let snapshot = storage.progress_snapshot()?;
    let result_count = storage.count_results()?;
    let latest_run = storage.latest_run()?;

    let mut failed_sample = storage.items_by_status(ItemStatus::Failed)?;
    failed_sample.truncate(FAILED_SAMPLE);

    Ok(HarvestStatistics {
        snapshot,
        result_count,
        latest_run,
        failed_sample,
    })
}

/// One-line progress summary
pub fn format_progress(snapshot: &ProgressSnapshot) -> String {
    let total = snapshot.total();
    let percentage = if total > 0 {
        (snapshot.completed as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    format!(
        "{}/{} completed ({:.1}%), {} failed, {} pending, {} processing",
        snapshot.completed, total, percentage, snapshot.failed, snapshot.pending, snapshot.processing
    )
}

/// Prints a one-line progress summary to stdout
pub fn print_progress(snapshot: &ProgressSnapshot) {
    println!("Progress: {}", format_progress(snapshot));
}

/// Renders statistics as the text `print_statistics` shows
pub fn render_statistics(stats: &HarvestStatistics) -> String {
    let mut out = String::new();
    let total = stats.snapshot.total();

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Harvest Statistics ===\n");

    let _ = writeln!(out, "Work Items ({} total):", total);
    for status in ItemStatus::ALL {
        let count = stats.snapshot.count(status);
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "  {}: {} ({:.1}%)", status, count, percentage);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Stored entries: {}", stats.result_count);
    let _ = writeln!(out);

    match &stats.latest_run {
        Some(run) => {
            let _ = writeln!(out, "Latest Run:");
            let _ = writeln!(out, "  Id: {}", run.id);
            let _ = writeln!(out, "  Status: {}", run.status.to_db_string());
            let _ = writeln!(out, "  Started: {}", run.started_at.to_rfc3339());
            if let Some(finished) = run.finished_at {
                let _ = writeln!(out, "  Finished: {}", finished.to_rfc3339());
                let _ = writeln!(
                    out,
                    "  Duration: {}s",
                    (finished - run.started_at).num_seconds()
                );
            }
        }
        None => {
            let _ = writeln!(out, "No crawl runs recorded");
        }
    }

    if !stats.failed_sample.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed Items (first {}):", stats.failed_sample.len());
        for item in &stats.failed_sample {
            let _ = writeln!(
                out,
                "  - {} [{} attempts]: {}",
                item.key,
                item.retry_count,
                item.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", render_statistics(stats));
}
