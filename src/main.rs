//! Listing-Ingest main entry point
//!
//! This is the command-line interface for the listing ingestion worker.

use anyhow::{bail, Context};
use clap::Parser;
use listing_ingest::config::{load_config, validate, Config};
use listing_ingest::ingest::{run_passes, ExtractionSchema};
use listing_ingest::output::{print_summary, RunStatistics};
use listing_ingest::publish::AmqpConnector;
use listing_ingest::{Fetcher, ListingExtractor, PassSummary, ProxyPool, RobotsGate, StaticPage};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Listing-Ingest: a polite listing ingestion worker
///
/// Fetches listing pages (respecting robots.txt, rotating proxies), extracts
/// structured listings, and publishes each one to a durable AMQP queue.
/// Settings come from an optional TOML file and the environment (a `.env`
/// file is read if present).
#[derive(Parser, Debug)]
#[command(name = "listing-ingest")]
#[command(version)]
#[command(about = "A polite listing ingestion worker", long_about = None)]
struct Cli {
    /// Target URLs to ingest (overrides TARGET_URLS)
    #[arg(value_name = "URL")]
    targets: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extract from a saved HTML file instead of fetching over HTTP
    #[arg(long, value_name = "FILE")]
    html_file: Option<PathBuf>,

    /// Validate config and show what would be ingested without connecting
    #[arg(long)]
    dry_run: bool,

    /// Cancel all passes after this many seconds
    #[arg(long, value_name = "SECS")]
    deadline_secs: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    // Load and validate configuration
    match &cli.config {
        Some(path) => tracing::info!("Loading configuration from: {}", path.display()),
        None => tracing::info!("Loading configuration from environment"),
    }
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if !cli.targets.is_empty() {
        config.worker.targets = cli.targets.clone();
        validate(&config).context("invalid target URL")?;
    }

    if config.worker.targets.is_empty() {
        match &cli.html_file {
            Some(path) => config
                .worker
                .targets
                .push(format!("file://{}", path.display())),
            None => bail!("no targets: pass URLs as arguments or set TARGET_URLS"),
        }
    }

    if cli.dry_run {
        handle_dry_run(&config, cli.html_file.as_ref());
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_watch(cancel.clone(), cli.deadline_secs);

    let summaries = handle_ingest(&config, cli.html_file.as_ref(), cancel).await?;
    print_summary(&summaries);

    if RunStatistics::from_summaries(&summaries).all_succeeded() {
        tracing::info!("Ingestion completed successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("One or more passes failed");
        Ok(ExitCode::FAILURE)
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_ingest=info,warn"),
            1 => EnvFilter::new("listing_ingest=debug,info"),
            2 => EnvFilter::new("listing_ingest=trace,debug"),
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

/// Cancels `cancel` on Ctrl-C or when the deadline passes
fn spawn_shutdown_watch(cancel: CancellationToken, deadline_secs: Option<u64>) {
    tokio::spawn(async move {
        let deadline = async {
            match deadline_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::warn!("Interrupt received, cancelling passes"),
                Err(e) => {
                    tracing::error!("Failed to listen for interrupt: {}", e);
                    return;
                }
            },
            _ = deadline => tracing::warn!("Deadline reached, cancelling passes"),
            _ = cancel.cancelled() => return,
        }

        cancel.cancel();
    });
}

/// Handles the --dry-run mode: validates config and shows what would be ingested
fn handle_dry_run(config: &Config, html_file: Option<&PathBuf>) {
    println!("=== Listing-Ingest Dry Run ===\n");

    println!("Broker:");
    println!("  Endpoint: {}:{}", config.broker.host, config.broker.port);
    println!("  User: {}", config.broker.user);
    println!("  Password: {}", redact(&config.broker.pass));
    println!("  Virtual host: {}", config.broker.vhost);
    println!("  Queue: {} (durable)", config.broker.queue_name);
    println!("  Publisher confirms: {}", config.broker.publisher_confirms);

    println!("\nFetching:");
    match html_file {
        Some(path) => println!("  Source: {} (no HTTP requests)", path.display()),
        None => {
            println!("  User agent: {}", config.fetch.user_agent);
            println!("  Timeout: {}s", config.fetch.timeout_seconds);
            println!("  Max attempts: {}", config.fetch.max_retries);
            println!(
                "  Backoff: {}ms base, {}ms cap",
                config.fetch.backoff_base_ms, config.fetch.backoff_max_ms
            );
            println!("  Proxies ({}):", config.fetch.proxies.len());
            for proxy in &config.fetch.proxies {
                println!("    - {}", proxy);
            }
            if config.fetch.proxy_failure_threshold > 0 {
                println!(
                    "  Proxy health: bench after {} failures for {}s",
                    config.fetch.proxy_failure_threshold, config.fetch.proxy_cooldown_seconds
                );
            }
        }
    }

    println!("\nRobots:");
    println!(
        "  Unreachable robots.txt: {}",
        if config.robots.default_deny { "deny" } else { "allow" }
    );
    println!("  Cache TTL: {}s", config.robots.cache_ttl_seconds);

    println!("\nWorker:");
    println!("  Source tag: {}", config.worker.source_tag);
    println!("  Max concurrent targets: {}", config.worker.max_concurrent_targets);
    println!("  Targets ({}):", config.worker.targets.len());
    for target in &config.worker.targets {
        println!("    - {}", target);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would ingest {} target(s) into queue '{}'",
        config.worker.targets.len(),
        config.broker.queue_name
    );
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(empty)"
    } else {
        "********"
    }
}

/// Handles the main ingestion run
async fn handle_ingest(
    config: &Config,
    html_file: Option<&PathBuf>,
    cancel: CancellationToken,
) -> anyhow::Result<Vec<PassSummary>> {
    let extractor = Arc::new(ListingExtractor::new(
        ExtractionSchema::default(),
        config.worker.source_tag.as_str(),
    )?);
    let connector = Arc::new(AmqpConnector::new(&config.broker)?);

    let targets = &config.worker.targets;
    let max_concurrent = config.worker.max_concurrent_targets;

    let summaries = match html_file {
        Some(path) => {
            let page = StaticPage::from_file(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            run_passes(targets, page, extractor, connector, max_concurrent, cancel).await
        }
        None => {
            let proxies = Arc::new(ProxyPool::from_config(&config.fetch));
            if proxies.is_empty() {
                tracing::info!("No proxies configured, connecting directly");
            } else {
                tracing::info!("Rotating across {} proxies", proxies.len());
            }
            let robots = Arc::new(RobotsGate::new(&config.fetch, &config.robots)?);
            let fetcher = Fetcher::new(&config.fetch, proxies, robots)?.with_cancellation(cancel.clone());
            run_passes(targets, fetcher, extractor, connector, max_concurrent, cancel).await
        }
    };

    Ok(summaries)
}
