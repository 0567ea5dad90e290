//! Shelf-Sentry main entry point
//!
//! This is the command-line runner for the Shelf-Sentry fetching core.

use anyhow::Context;
use clap::Parser;
use shelf_sentry::config::{load_config_with_hash, Config};
use shelf_sentry::{FetchError, FetchResult, Orchestrator};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Shelf-Sentry: resilient fetching for uncooperative product sources
///
/// Fetches every configured source through its prioritized tiers with
/// per-domain rate limiting, browser sessions, retries and circuit breakers,
/// falling back to the last cached result when every tier fails.
#[derive(Parser, Debug)]
#[command(name = "shelf-sentry")]
#[command(version = "1.0.0")]
#[command(about = "Resilient fetching for product sources", long_about = None)]
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

    /// Validate config and list sources and tiers without fetching
    #[arg(long, conflicts_with_all = ["source", "health"])]
    check: bool,

    /// Fetch only this source
    #[arg(long, value_name = "ID")]
    source: Option<String>,

    /// Where to write the fetched records (default: <data-dir>/all_products.json)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the JSON health report after the run
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.check {
        handle_check(&config);
        return Ok(());
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let results = match &cli.source {
        Some(id) => {
            let result = orchestrator.fetch_source(id, &cancel).await;
            BTreeMap::from([(id.clone(), result)])
        }
        None => orchestrator.scrape_all(&cancel).await,
    };

    let saved = orchestrator.save_cookies();
    tracing::debug!("Saved cookies for {} domains", saved);

    print_results(&results);

    let output = cli
        .output
        .unwrap_or_else(|| config.paths.data_dir.join("all_products.json"));
    write_records(&results, &output)?;

    if cli.health {
        println!("{}", serde_json::to_string_pretty(&orchestrator.health_report())?);
    } else if !cli.quiet {
        println!("\n{}", orchestrator.health_summary());
    }

    if cancel.is_cancelled() {
        anyhow::bail!("interrupted");
    }
    if results.values().all(|r| r.is_err()) {
        anyhow::bail!("no source produced any records");
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_sentry=info,warn"),
            1 => EnvFilter::new("shelf_sentry=debug,info"),
            2 => EnvFilter::new("shelf_sentry=trace,debug"),
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

/// Cancels in-flight fetches on Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling fetches");
            cancel.cancel();
        }
    });
}

/// Handles --check: the config is already validated, show what would run
fn handle_check(config: &Config) {
    println!("=== Shelf-Sentry Config Check ===\n");

    println!("Data directory: {}", config.paths.data_dir.display());
    println!(
        "Network: timeout {}s, connect {}s",
        config.network.timeout.as_secs(),
        config.network.connect_timeout.as_secs()
    );
    println!(
        "Retry: {} attempts, base {:.1}s, max {:.1}s",
        config.retry.max_attempts,
        config.retry.base_delay.as_secs_f64(),
        config.retry.max_delay.as_secs_f64()
    );
    println!(
        "Rate limit: {} rpm default, {} domain overrides",
        config.rate_limit.default.requests_per_minute,
        config.rate_limit.domains.len()
    );

    println!("\nSources ({}):", config.sources.len());
    for source in &config.sources {
        println!(
            "  - {} ({}), min {} products",
            source.id, source.display_name, source.min_products
        );
        let mut tiers: Vec<_> = source.tiers.iter().collect();
        tiers.sort_by_key(|t| t.priority);
        for tier in tiers {
            println!("    {}. {} -> {}", tier.priority, tier.name, tier.url);
        }
    }

    println!("\n✓ Configuration is valid");
}

fn print_results(results: &BTreeMap<String, Result<FetchResult, FetchError>>) {
    for (id, result) in results {
        match result {
            Ok(r) if r.from_cache() => println!(
                "{}: {} records from cache ({:.1}h old)",
                id,
                r.product_count(),
                r.cache_age_hours().unwrap_or_default()
            ),
            Ok(r) => println!(
                "{}: {} records from tier {}",
                id,
                r.product_count(),
                r.tier_name()
            ),
            Err(e) => println!("{}: FAILED ({})", id, e),
        }
    }
}

/// Writes every record, tagged with its source, as one JSON array
fn write_records(
    results: &BTreeMap<String, Result<FetchResult, FetchError>>,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    let records: Vec<_> = results
        .values()
        .filter_map(|r| r.as_ref().ok())
        .flat_map(|r| {
            r.records.iter().map(move |record| {
                serde_json::json!({
                    "source": r.source_id,
                    "from_cache": r.from_cache(),
                    "record": record,
                })
            })
        })
        .collect();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(&records)?)
        .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}
