//! Furlong main entry point
//!
//! This is the command-line interface for the Furlong discovery crawler.

use anyhow::Context;
use clap::Parser;
use furlong::config::{load_config_with_hash, validate, Config};
use furlong::crawler::{start_crawl, CrawlEvent, CrawlOptions, HttpSource};
use furlong::output::{load_sessions, load_statistics, print_report, print_sessions, print_statistics};
use furlong::storage::{open_storage, SqliteStorage, StopReason, Storage};
use furlong::url::classify;
use furlong::normalize_url;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Furlong: a polite discovery crawler for racing results and profiles
///
/// Furlong walks a racing site from a seed address, records every race,
/// horse, jockey and trainer page it finds in a SQLite ledger, and stops
/// once new discoveries dry up.
#[derive(Parser, Debug)]
#[command(name = "furlong")]
#[command(version)]
#[command(about = "A polite discovery crawler for racing results and profiles", long_about = None)]
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

    /// Resume from the last session's pending queue and unfetched ledger rows
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl from the seed, ignoring previous queue state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Override the seed address
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Override the discovery quota
    #[arg(long, value_name = "N")]
    quota: Option<u32>,

    /// Override the session deadline (minutes)
    #[arg(long, value_name = "MINUTES")]
    timeout_mins: Option<f64>,

    /// Override the saturation threshold
    #[arg(long, value_name = "RATE")]
    saturation: Option<f64>,

    /// Override the saturation window size (pages)
    #[arg(long, value_name = "PAGES")]
    window: Option<usize>,

    /// Validate config and show the effective settings without crawling
    #[arg(long, conflicts_with_all = ["stats", "sessions", "retry_failed"])]
    dry_run: bool,

    /// Show ledger counts by kind and status and exit
    #[arg(long, conflicts_with_all = ["dry_run", "sessions", "retry_failed"])]
    stats: bool,

    /// List recent crawl sessions and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "retry_failed"])]
    sessions: bool,

    /// Move every failed address back to unprocessed and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "sessions"])]
    retry_failed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            return Err(e).context("Failed to load configuration");
        }
    };

    apply_overrides(&mut config, &cli).context("Invalid command-line override")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.sessions {
        handle_sessions(&config)
    } else if cli.retry_failed {
        handle_retry_failed(&config)
    } else {
        let resume = if cli.fresh {
            Some(false)
        } else if cli.resume {
            Some(true)
        } else {
            None
        };
        handle_crawl(config, config_hash, resume).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("furlong=info,warn"),
            1 => EnvFilter::new("furlong=debug,info"),
            2 => EnvFilter::new("furlong=trace,debug"),
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

/// Applies command-line overrides and re-validates
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(seed) = &cli.seed {
        config.site.seed = seed.clone();
    }
    if let Some(quota) = cli.quota {
        config.crawler.quota = quota;
    }
    if let Some(timeout_mins) = cli.timeout_mins {
        config.crawler.timeout_mins = timeout_mins;
    }
    if let Some(saturation) = cli.saturation {
        config.crawler.saturation_threshold = saturation;
    }
    if let Some(window) = cli.window {
        config.crawler.window_size = window;
    }

    validate(config)?;
    Ok(())
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))
}

/// Handles the --dry-run mode: validates config and shows the effective settings
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Furlong Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Discovery quota: {}", crawler.quota);
    println!("  Deadline: {} minutes", crawler.timeout_mins);
    println!(
        "  Saturation: stop below {} new per page over {} pages",
        crawler.saturation_threshold, crawler.window_size
    );
    println!(
        "  Politeness delay: {}-{}ms",
        crawler.min_delay_ms, crawler.max_delay_ms
    );
    println!("  Fetch timeout: {}s", crawler.fetch_timeout_secs);
    println!(
        "  Snapshot: {} addresses, every {} pages",
        crawler.snapshot_cap, crawler.checkpoint_interval
    );
    println!("  Participant priority offset: {}", crawler.priority_offset);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSite:");
    let seed = normalize_url(&config.site.seed)?;
    let class = classify(&seed);
    println!("  Seed: {} ({:?}, {})", seed, class.shape, class.kind);
    println!("  Allowed domains ({}):", config.site.allowed_domains.len());
    for domain in &config.site.allowed_domains {
        println!("    - {}", domain);
    }
    println!("  Follow prefixes ({}):", config.site.follow_prefixes.len());
    for prefix in &config.site.follow_prefixes {
        println!("    - {}", prefix);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows ledger counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --sessions mode: lists recent crawl sessions
fn handle_sessions(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let sessions = load_sessions(&storage, 20)?;
    print_sessions(&sessions);

    Ok(())
}

/// Handles the --retry-failed mode: requeues failed addresses
fn handle_retry_failed(config: &Config) -> anyhow::Result<()> {
    let mut storage = open_database(config)?;
    let requeued = storage.requeue_failed()?;

    println!("✓ Requeued {} failed addresses", requeued);

    Ok(())
}

/// Decides whether to resume when neither --resume nor --fresh was given
///
/// A crawl resumes if the latest session stopped with work still pending.
fn should_resume(storage: &SqliteStorage) -> anyhow::Result<bool> {
    let latest = storage.latest_session()?;
    Ok(matches!(
        latest,
        Some(session) if session.stop_reason != Some(StopReason::Exhausted)
    ))
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    resume: Option<bool>,
) -> anyhow::Result<()> {
    let storage = open_database(&config)?;

    let resume = match resume {
        Some(choice) => choice,
        None => should_resume(&storage)?,
    };
    if resume {
        tracing::info!("Resuming from the previous session's pending work");
    } else {
        tracing::info!("Starting fresh crawl from {}", config.site.seed);
    }

    let source = HttpSource::new(
        &config.user_agent,
        Duration::from_secs(config.crawler.fetch_timeout_secs),
    )
    .context("Failed to build HTTP client")?;

    let mut options = CrawlOptions::from_config(&config);
    options.config_hash = config_hash;
    options.resume = resume;

    let mut handle = start_crawl(storage, source, options).context("Failed to start crawl")?;
    tracing::info!("Session {} started", handle.session_id());

    let cancel = handle.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current page");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let mut last_discovered = 0;
    while let Some(event) = handle.next_event().await {
        match event {
            CrawlEvent::Progress {
                discovered,
                queue_depth,
                saturation_rate,
            } => {
                if discovered != last_discovered {
                    last_discovered = discovered;
                    tracing::debug!(
                        "discovered {} | queued {} | rate {:.3}",
                        discovered,
                        queue_depth,
                        saturation_rate
                    );
                }
            }
            // Already written to the log by the crawl task
            CrawlEvent::Log(_) => {}
        }
    }

    let report = handle.wait().await?;
    print_report(&report);

    Ok(())
}
