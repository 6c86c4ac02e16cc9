//! mp-harvest main entry point
//!
//! Command-line interface for the article harvester. Exit code 0 means the
//! run completed; any fatal error exits non-zero before or during the run.

use clap::Parser;
use mp_harvest::checkpoint::SqliteStore;
use mp_harvest::config::load_config_with_hash;
use mp_harvest::crawler::{crawl, load_summary, print_summary};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// mp-harvest: a resumable article harvester for WeChat official accounts
#[derive(Parser, Debug)]
#[command(name = "mp-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable, rate-limited article harvester", long_about = None)]
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

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding previous checkpoint state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be harvested without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the checkpoint database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
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
            0 => EnvFilter::new("mp_harvest=info,warn"),
            1 => EnvFilter::new("mp_harvest=debug,info"),
            2 => EnvFilter::new("mp_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the harvest plan
fn handle_dry_run(config: &mp_harvest::Config) {
    println!("=== mp-harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!(
        "  Min request interval: {}ms (host: {}ms)",
        config.crawler.min_request_interval, config.crawler.min_host_interval
    );

    println!("\nSession:");
    println!("  API base: {}", config.session.api_base);
    println!("  Credentials: {}", config.session.credentials_path);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    if config.window.since.is_some() || config.window.until.is_some() {
        println!("\nPublication window:");
        if let Some(since) = config.window.since {
            println!("  Since: {}", since);
        }
        if let Some(until) = config.window.until {
            println!("  Until: {}", until);
        }
    }

    println!("\nAccounts ({}):", config.accounts.len());
    for account in &config.accounts {
        match &account.fakeid {
            Some(fakeid) => println!("  - {} (fakeid: {})", account.name, fakeid),
            None => println!("  - {} (fakeid resolved by search)", account.name),
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the checkpoint database
fn handle_stats(config: &mp_harvest::Config) -> anyhow::Result<()> {
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let store = SqliteStore::new(Path::new(&config.output.database_path))?;
    let summary = load_summary(&store)?;
    print_summary(&summary);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: mp_harvest::Config,
    config_hash: &str,
    fresh: bool,
) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (discarding previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }
    tracing::info!("Accounts to harvest: {}", config.accounts.len());

    match crawl(config, config_hash, fresh).await {
        Ok(_) => {
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
