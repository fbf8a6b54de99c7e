//! Sense Crawler main entry point
//!
//! This is the command-line interface for the Sense Typing font catalog crawler.

use anyhow::Context;
use clap::Parser;
use sense_crawler::config::{load_config_with_hash, Config};
use sense_crawler::crawler::run_crawl;
use sense_crawler::output::{
    generate_markdown_summary, generate_summary, load_statistics, print_statistics,
};
use sense_crawler::storage::SqliteStorage;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sense Crawler: a polite font catalog crawler
///
/// Pages through a font listing site, fetches every font detail page and
/// stores the parsed records in SQLite. Requests are paced by a token bucket
/// that backs off when the site answers 429, and transient failures are
/// retried with exponential backoff.
#[derive(Parser, Debug)]
#[command(name = "sense-crawler")]
#[command(version)]
#[command(about = "A polite font catalog crawler", long_about = None)]
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

    /// Start a fresh crawl instead of resuming the latest unfinished run
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sense_crawler=info,warn"),
            1 => EnvFilter::new("sense_crawler=debug,info"),
            2 => EnvFilter::new("sense_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Sense Crawler Dry Run ===\n");

    println!("Listing:");
    println!("  URL template: {}", config.crawler.listing_url);
    println!(
        "  Pages: {} to {} ({} max)",
        config.crawler.start_page,
        config.crawler.last_page(),
        config.crawler.max_pages
    );
    println!(
        "  First page: {}",
        config.crawler.listing_page_url(config.crawler.start_page)
    );

    println!("\nRate Limit:");
    println!("  Burst: {} requests", config.rate_limit.max_tokens);
    println!(
        "  Refill: {} requests/second",
        config.rate_limit.refill_per_second
    );

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!(
        "  Delay: {}ms doubling up to {}ms",
        config.retry.initial_delay_ms, config.retry.max_delay_ms
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSelectors:");
    println!("  Font links: {}", config.selectors.item_link);
    println!("  Next page: {}", config.selectors.next_page);
    println!("  Name: {}", config.selectors.name);
    println!("  Foundry: {}", config.selectors.foundry);
    println!("  License: {}", config.selectors.license);
    println!("  Tags: {}", config.selectors.tag);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    write_summary(&storage, config)?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

fn write_summary(storage: &SqliteStorage, config: &Config) -> anyhow::Result<()> {
    tracing::info!("Loading crawl data from database...");
    let summary = generate_summary(storage)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))
        .with_context(|| format!("Failed to write {}", config.output.summary_path))?;

    Ok(())
}

/// Handles the main crawl operation
///
/// Ctrl-C stops the crawl between requests; the run is left resumable.
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            signal_token.cancel();
        }
    });

    let report = run_crawl(config.clone(), config_hash, fresh, &cancel)
        .await
        .context("Crawl failed")?;

    if report.interrupted {
        tracing::info!(
            "Run {} interrupted with {} fonts stored; run again to resume",
            report.run_id,
            report.items_stored
        );
        return Ok(());
    }

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    write_summary(&storage, &config)?;
    tracing::info!(
        "Crawl completed successfully, summary written to {}",
        config.output.summary_path
    );

    Ok(())
}
