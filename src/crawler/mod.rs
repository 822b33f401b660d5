//! Crawler module for the durable crawl-queue engine
//!
//! This module contains the core crawling logic, including:
//! - Process-wide rate limiting
//! - Retry eligibility
//! - HTTP transport and HTML parsing collaborators
//! - Seed discovery
//! - The per-item fetch worker and the batch orchestrator

mod discovery;
mod fetcher;
mod orchestrator;
mod parser;
mod rate_limiter;
mod retry;
mod traits;
mod worker;

pub use discovery::{beta_code, LetterIndexDiscovery, LinkListDiscovery};
pub use fetcher::{build_http_client, user_agent_string, HttpTransport};
pub use orchestrator::{CrawlOrchestrator, RunSummary};
pub use parser::{entry_id, extract_links, resolve_link, EntryPageParser};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_MAX_RETRIES};
pub use traits::{Discovery, ParseError, Parser, Transport, TransportError, WorkerError};
pub use worker::{FetchWorker, ItemOutcome};

use crate::config::Config;
use crate::storage::{open_storage, RunStatus, SqliteStorage, WorkQueue};
use crate::url::normalize_key;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Knobs for a single invocation of `run_crawl`
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOptions {
    /// Seed even if the queue already has items
    pub reseed: bool,
}

/// Opens the configured database with the configured retry ceiling
pub fn open_queue(config: &Config) -> Result<Arc<SqliteStorage>> {
    let storage = open_storage(Path::new(&config.output.database_path))?
        .with_retry_policy(RetryPolicy::new(config.crawler.max_retries));
    Ok(Arc::new(storage))
}

/// Builds the seed discovery described by the `[seed]` section, if any
pub fn build_discovery(
    config: &Config,
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
) -> Result<Option<Box<dyn Discovery>>> {
    let Some(template) = config.seed.index_url_template.as_deref() else {
        return Ok(None);
    };

    let index = LetterIndexDiscovery::new(template);
    let discovery: Box<dyn Discovery> = match config.seed.link_selector.as_deref() {
        Some(selector) => Box::new(LinkListDiscovery::new(index, transport, limiter, selector)?),
        None => Box::new(index),
    };
    Ok(Some(discovery))
}

/// Enqueues the configured seed keys plus everything discovery finds
///
/// Keys are normalized first; keys that fail normalization and letters that
/// fail discovery are logged and skipped.
///
/// # Returns
///
/// The number of newly created work items
pub async fn seed_queue(
    config: &Config,
    queue: &dyn WorkQueue,
    discovery: Option<&dyn Discovery>,
) -> Result<usize> {
    let mut candidates: Vec<String> = config.seed.keys.clone();

    if let Some(discovery) = discovery {
        for letter in &config.seed.letters {
            match discovery.seed(letter).await {
                Ok(keys) => candidates.extend(keys),
                Err(e) => tracing::warn!("Discovery failed for {}: {}", letter, e),
            }
        }
    }

    let mut keys = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match normalize_key(&candidate) {
            Ok(key) => keys.push(key),
            Err(e) => tracing::warn!("Skipping seed '{}': {}", candidate, e),
        }
    }

    let inserted = queue.enqueue_many(&keys)?;
    tracing::info!(
        "Seeded {} new items ({} candidates)",
        inserted,
        keys.len()
    );
    Ok(inserted)
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the database
/// 2. Close out a previous run that never finished
/// 3. Sweep stale claims while any item is still marked processing
/// 4. Build the collaborators and record a new run
/// 5. Seed the queue if it is empty (or `reseed` is set)
/// 6. Drain the queue
/// 7. Record how the run ended
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
/// * `options` - Per-invocation options
/// * `shutdown` - Cooperative shutdown signal
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    options: CrawlOptions,
    shutdown: Option<watch::Receiver<bool>>,
) -> Result<RunSummary> {
    let storage = open_queue(config)?;

    if let Some(previous) = storage.latest_run()? {
        if previous.status == RunStatus::Running {
            tracing::warn!("Run {} did not finish cleanly", previous.id);
            storage.finish_run(previous.id, RunStatus::Interrupted)?;
        }
    }

    // Claims younger than the threshold survive until a later start
    if storage.progress_snapshot()?.processing > 0 {
        tracing::warn!("Found claims from an earlier process, sweeping stale ones");
        sweep_stale_claims(&storage, config)?;
    }

    let limiter = Arc::new(RateLimiter::from_millis(config.crawler.request_delay_ms));
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(config)?);
    let parser: Arc<dyn Parser> = Arc::new(EntryPageParser::new(&config.parser)?);
    let discovery = build_discovery(config, transport.clone(), limiter.clone())?;

    let run_id = storage.create_run(config_hash)?;
    tracing::info!("Starting run {}", run_id);

    if options.reseed || storage.progress_snapshot()?.total() == 0 {
        if let Err(e) = seed_queue(config, storage.as_ref(), discovery.as_deref()).await {
            tracing::error!("Run {} failed while seeding: {}", run_id, e);
            storage.finish_run(run_id, RunStatus::Failed)?;
            return Err(e);
        }
    }

    let worker = FetchWorker::new(
        transport,
        parser,
        storage.clone(),
        storage.clone(),
        limiter,
    );
    let mut orchestrator = CrawlOrchestrator::new(worker);
    if let Some(shutdown) = shutdown {
        orchestrator = orchestrator.with_shutdown(shutdown);
    }

    match orchestrator.run(config.crawler.concurrency as usize).await {
        Ok(summary) => {
            let status = if summary.interrupted {
                RunStatus::Interrupted
            } else {
                RunStatus::Completed
            };
            storage.finish_run(run_id, status)?;
            Ok(summary)
        }
        Err(e) => {
            tracing::error!("Run {} failed: {}", run_id, e);
            storage.finish_run(run_id, RunStatus::Failed)?;
            Err(e)
        }
    }
}

/// Fails every claim older than the configured staleness threshold
///
/// Returns the number of items swept.
pub fn sweep_stale_claims(storage: &SqliteStorage, config: &Config) -> Result<usize> {
    let threshold = Duration::from_secs(config.crawler.stale_claim_secs);
    let swept = storage.sweep_stale(threshold)?;
    for claim in &swept {
        tracing::warn!(
            "Swept stale claim on {} (retry count now {})",
            claim.key,
            claim.retry_count
        );
    }

    let still_processing = storage.progress_snapshot()?.processing;
    if still_processing > 0 {
        tracing::info!(
            "{} claims are younger than {}s and were left alone",
            still_processing,
            threshold.as_secs()
        );
    }

    Ok(swept.len())
}
