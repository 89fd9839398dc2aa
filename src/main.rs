//! Legis-Harvest main entry point
//!
//! This is the command-line interface for the Legis-Harvest catalog harvester.

use anyhow::Context;
use clap::Parser;
use legis_harvest::config::{apply_overrides, load_config_with_hash, Config, ConfigOverrides};
use legis_harvest::crawler::run_harvest;
use legis_harvest::output::{format_run_summary, load_statistics, print_statistics};
use legis_harvest::storage::SqliteStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Legis-Harvest: an incremental legislation catalog harvester
///
/// Legis-Harvest walks the paginated search results of a legislation
/// catalog, fetches the detail page of every item it has not seen in the
/// current run, and upserts the merged records into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "legis-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An incremental legislation catalog harvester", long_about = None)]
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

    /// Maximum number of listing pages to visit
    #[arg(long, value_name = "N", env = "MAX_PAGES_TO_SCRAPE")]
    max_pages: Option<u32>,

    /// Path to the SQLite database, overriding the configuration
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let overrides = ConfigOverrides {
        max_pages: cli.max_pages,
        database_path: cli.database,
    };
    let config = apply_overrides(config, &overrides).context("Invalid command-line override")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_harvest(config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("legis_harvest=info,warn"),
            1 => EnvFilter::new("legis_harvest=debug,info"),
            2 => EnvFilter::new("legis_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved settings
fn handle_dry_run(config: &Config) {
    println!("=== Legis-Harvest Dry Run ===\n");

    println!("Catalog:");
    println!("  Root URL: {}", config.catalog.root_url);
    println!("  Detail base URL: {}", config.catalog.detail_base_url);

    println!("\nCrawler Configuration:");
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Batch threshold: {}", config.crawler.batch_threshold);
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);
    println!("  Task delay: {}ms", config.crawler.task_delay_ms);

    println!("\nFetch:");
    println!("  Max attempts: {}", config.fetch.max_retries);
    println!("  Retry base delay: {}ms", config.fetch.retry_base_delay_ms);
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  User agent: {}", config.fetch.user_agent);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would harvest up to {} pages starting at {}",
        config.crawler.max_pages, config.catalog.root_url
    );
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    // Open the database
    let store = SqliteStore::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    // Load statistics
    let stats = load_statistics(&store).context("Failed to load statistics")?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: &str) -> anyhow::Result<ExitCode> {
    tracing::info!(
        "Harvesting {} (max pages: {}, concurrency: {}, batch: {})",
        config.catalog.root_url,
        config.crawler.max_pages,
        config.crawler.concurrency,
        config.crawler.batch_threshold
    );

    let summary = run_harvest(config, config_hash)
        .await
        .context("Harvest could not start")?;

    println!("{}", format_run_summary(&summary));

    if summary.is_aborted() {
        tracing::error!("Harvest aborted: {}", summary.termination);
        Ok(ExitCode::FAILURE)
    } else {
        tracing::info!("Harvest completed successfully");
        Ok(ExitCode::SUCCESS)
    }
}
