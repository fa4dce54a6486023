//! fipe-crawler main entry point
//!
//! This is the command-line interface for the FIPE price table ingester.

use anyhow::Context;
use clap::Parser;
use fipe_crawler::config::{load_config_with_hash, Config};
use fipe_crawler::crawler::CrawlProgress;
use fipe_crawler::{CheckpointStore, CrawlOutcome, Crawler};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// fipe-crawler: A resumable ingester for the FIPE vehicle price table
///
/// fipe-crawler walks reference periods, manufacturers, models and
/// model-years, caching every upstream response on disk and storing the
/// prices in SQLite. Interrupt it with Ctrl-C at any time; the next run
/// resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "fipe-crawler")]
#[command(version)]
#[command(about = "A resumable ingester for the FIPE vehicle price table", long_about = None)]
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

    /// Start from the beginning, ignoring any saved checkpoint
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the resume position without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Progress bars only on an interactive terminal
    let progress = CrawlProgress::new(!cli.quiet && std::io::stderr().is_terminal());

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet, &progress);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, cli.fresh)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, cli.fresh, progress).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, progress: &CrawlProgress) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("fipe_crawler=info,warn"),
            1 => EnvFilter::new("fipe_crawler=debug,info"),
            2 => EnvFilter::new("fipe_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let progress = progress.clone();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || progress.writer())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration and resume position
fn handle_dry_run(config: &Config, fresh: bool) -> anyhow::Result<()> {
    println!("=== fipe-crawler Dry Run ===\n");

    println!("Upstream:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Timeout: {}s", config.api.timeout_secs);
    println!("  Pacing: {}ms", config.api.pacing_ms);

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!(
        "  Backoff: {}ms base, {}ms cap",
        config.retry.base_delay_ms, config.retry.max_delay_ms
    );
    println!(
        "  Cool-downs: {}ms after 429, {}ms after 5xx",
        config.retry.rate_limit_cooldown_ms, config.retry.server_error_cooldown_ms
    );

    println!("\nCache:");
    println!("  Directory: {}", config.cache.directory);
    println!(
        "  Reference period TTL: {}s",
        config.cache.reference_ttl_secs
    );

    println!("\nCrawl:");
    println!(
        "  Vehicle type: {:?} ({})",
        config.crawl.vehicle_type,
        config.crawl.vehicle_type.id()
    );
    println!("  Mode: {:?}", config.crawl.mode);
    println!(
        "  Years: {} to {}",
        config
            .crawl
            .year_from
            .map_or("any".to_string(), |y| y.to_string()),
        config
            .crawl
            .year_to
            .map_or("any".to_string(), |y| y.to_string())
    );
    println!(
        "  Failure policy: listing={}, price={}",
        config.crawl.failure_policy.listing, config.crawl.failure_policy.price
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let store = CheckpointStore::new(&config.crawl.checkpoint_path);
    let checkpoint = if fresh {
        Default::default()
    } else {
        store
            .load()
            .with_context(|| format!("Failed to read {}", store.path().display()))?
    };

    println!("\n✓ Configuration is valid");
    if checkpoint.is_start() {
        println!("✓ Would start from the beginning");
    } else {
        println!(
            "✓ Would resume at period {}, manufacturer {}, model {}, model-year {}",
            checkpoint.period, checkpoint.manufacturer, checkpoint.model, checkpoint.year_model
        );
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use fipe_crawler::output::{load_statistics, print_statistics};
    use fipe_crawler::storage::open_repository;

    println!("Database: {}\n", config.output.database_path);

    let repository = open_repository(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&repository)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
///
/// Ctrl-C saves the checkpoint; completion clears it. A fatal error leaves
/// the checkpoint file as it was.
async fn handle_crawl(
    config: &Config,
    fresh: bool,
    progress: CrawlProgress,
) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&config.crawl.checkpoint_path);

    let checkpoint = if fresh {
        tracing::info!("Starting fresh crawl (ignoring saved checkpoint)");
        Default::default()
    } else {
        let checkpoint = store
            .load()
            .with_context(|| format!("Failed to read {}", store.path().display()))?;
        if checkpoint.is_start() {
            tracing::info!("No checkpoint found, starting from the beginning");
        } else {
            tracing::info!("Resuming from checkpoint {:?}", checkpoint);
        }
        checkpoint
    };

    let mut crawler = Crawler::new(config, checkpoint)?.with_progress(progress.clone());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let outcome = crawler.run_until(shutdown).await;
    progress.finish();

    match outcome {
        Ok(CrawlOutcome::Completed(_)) => {
            store.clear()?;
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Ok(CrawlOutcome::Interrupted(checkpoint)) => {
            crawler.stats().log_summary();
            store.save(&checkpoint)?;
            tracing::warn!("Checkpoint saved to {}", store.path().display());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
