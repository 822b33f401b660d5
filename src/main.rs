//! Lexicon Harvester main entry point
//!
//! This is the command-line interface for the resumable lexicon harvester.

use clap::Parser;
use lexicon_harvester::config::{load_config_with_hash, Config};
use lexicon_harvester::crawler::{
    beta_code, open_queue, run_crawl, sweep_stale_claims, CrawlOptions,
};
use lexicon_harvester::output::{
    export_to_path, load_statistics, print_progress, print_statistics,
};
use lexicon_harvester::storage::{SqliteStorage, WorkQueue};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Lexicon Harvester: a polite, resumable dictionary crawler
///
/// Entries are fetched one page at a time at a fixed pace. Progress is kept
/// in SQLite, so an interrupted run picks up where it left off.
#[derive(Parser, Debug)]
#[command(name = "lexicon-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A polite, resumable lexicon harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be seeded without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "export", "reset_failed", "sweep_stale"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "reset_failed", "sweep_stale"])]
    stats: bool,

    /// Export stored entries to the configured export path and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "reset_failed", "sweep_stale"])]
    export: bool,

    /// Move every failed item back to pending with a fresh retry budget and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export", "sweep_stale"])]
    reset_failed: bool,

    /// Fail claims left behind by a dead process and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export", "reset_failed"])]
    sweep_stale: bool,

    /// Seed the queue even if it already has items
    #[arg(long)]
    reseed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else if cli.reset_failed {
        handle_reset_failed(&config)?;
    } else if cli.sweep_stale {
        handle_sweep_stale(&config)?;
    } else {
        handle_crawl(&config, &config_hash, cli.reseed).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lexicon_harvester=info,warn"),
            1 => EnvFilter::new("lexicon_harvester=debug,info"),
            2 => EnvFilter::new("lexicon_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be seeded
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Lexicon Harvester Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Stale claim threshold: {}s", config.crawler.stale_claim_secs);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nTransport:");
    println!(
        "  URL template: {}",
        config.transport.url_template.as_deref().unwrap_or("(URL keys only)")
    );
    println!("  Timeout: {}s", config.transport.timeout_secs);

    println!("\nParser:");
    println!("  Content selector: {}", config.parser.content_selector);
    println!("  Headword selector: {}", config.parser.headword_selector);
    println!("  Language: {}", config.parser.language);
    println!("  Source tag: {}", config.parser.source_tag);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Export: {}", config.output.export_path);

    println!("\nSeed Keys ({}):", config.seed.keys.len());
    for key in &config.seed.keys {
        println!("  - {}", key);
    }

    println!("\nSeed Letters ({}):", config.seed.letters.len());
    for letter in &config.seed.letters {
        match beta_code(letter) {
            Some(code) => println!("  - {} ({})", letter, code),
            None => println!("  - {} (unknown letter, will be skipped)", letter),
        }
    }
    if let Some(selector) = &config.seed.link_selector {
        println!("  Index pages will be fetched; links under '{}' become seeds", selector);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would seed from {} keys and {} letters",
        config.seed.keys.len(),
        config.seed.letters.len()
    );

    Ok(())
}

fn open_database(config: &Config) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
    Ok(SqliteStorage::new(Path::new(&config.output.database_path))?)
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes stored entries as JSON
fn handle_export(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_database(config)?;
    let count = export_to_path(&storage, Path::new(&config.output.export_path))?;
    println!("✓ Exported {} entries to: {}", count, config.output.export_path);
    Ok(())
}

/// Handles the --reset-failed mode
fn handle_reset_failed(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_database(config)?;
    let reset = storage.reset_failed()?;
    println!("✓ Reset {} failed items to pending", reset);
    print_progress(&storage.progress_snapshot()?);
    Ok(())
}

/// Handles the --sweep-stale mode
fn handle_sweep_stale(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_queue(config)?;
    let swept = sweep_stale_claims(&storage, config)?;
    println!("✓ Swept {} stale claims", swept);
    print_progress(&storage.progress_snapshot()?);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    reseed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, finishing in-flight items before stopping");
            let _ = shutdown_tx.send(true);
        }
    });

    let options = CrawlOptions { reseed };
    let summary = match run_crawl(config, config_hash, options, Some(shutdown_rx)).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    print_progress(&summary.snapshot);
    if summary.interrupted {
        tracing::info!("Crawl interrupted; run again to resume");
        return Ok(());
    }

    if summary.snapshot.failed > 0 {
        tracing::warn!(
            "{} items failed; use --reset-failed to retry them",
            summary.snapshot.failed
        );
    }

    let storage = open_database(config)?;
    let count = export_to_path(&storage, Path::new(&config.output.export_path))?;
    println!("✓ Exported {} entries to: {}", count, config.output.export_path);

    Ok(())
}
