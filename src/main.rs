//! Sumi-Chronicle main entry point
//!
//! This is the command-line interface for the Sumi-Chronicle archiver.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use sumi_chronicle::config::{load_config_with_hash, Config};
use sumi_chronicle::crawler::{Mode, ModePolicy, Traversal};
use sumi_chronicle::output::{configured_sinks, export_json, load_statistics, print_statistics};
use sumi_chronicle::storage::{open_storage, RunSummary};
use sumi_chronicle::StopReason;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Sumi-Chronicle: a chronological archiver for paginated sources
///
/// Sumi-Chronicle walks a source's "older posts" chain from its newest page,
/// resolves a best-effort publication date for every item and archives each
/// item exactly once across every run.
#[derive(Parser, Debug)]
#[command(name = "sumi-chronicle")]
#[command(version = "1.0.0")]
#[command(about = "A chronological archiver for paginated sources", long_about = None)]
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

    /// Operating mode (incremental, bounded-historical, full-historical)
    #[arg(long)]
    mode: Option<Mode>,

    /// Override the mode's page cap
    #[arg(long, value_name = "PAGES")]
    max_pages: Option<u32>,

    /// Override the delay between requests, in seconds
    #[arg(long, value_name = "SECONDS")]
    delay: Option<f64>,

    /// Validate config and show the traversal plan without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "export", "re_resolve"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "re_resolve"])]
    stats: bool,

    /// Export every archived item as JSON and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "re_resolve"])]
    export: bool,

    /// Re-fetch low/unknown confidence items and improve their dates
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export"])]
    re_resolve: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else if cli.re_resolve {
        handle_re_resolve(config, config_hash).await?;
    } else {
        handle_run(config, config_hash).await?;
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
            0 => EnvFilter::new("sumi_chronicle=info,warn"),
            1 => EnvFilter::new("sumi_chronicle=debug,info"),
            2 => EnvFilter::new("sumi_chronicle=trace,debug"),
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

/// Applies `--mode`, `--max-pages` and `--delay` on top of the file
fn apply_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(mode) = cli.mode {
        config.traversal.mode = mode;
    }
    if let Some(pages) = cli.max_pages {
        if pages == 0 {
            bail!("--max-pages must be at least 1");
        }
        config.traversal.page_cap = Some(pages);
    }
    if let Some(delay) = cli.delay {
        if !delay.is_finite() || delay < 0.0 {
            bail!("--delay must be a non-negative number of seconds");
        }
        config.traversal.page_delay_secs = delay;
    }
    Ok(())
}

/// Returns a channel that flips to `true` on Ctrl-C
fn cancellation_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current step");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Handles the --dry-run mode: validates config and shows the traversal plan
fn handle_dry_run(config: &Config) {
    let policy = ModePolicy::for_mode(config.traversal.mode, config.traversal.page_cap);

    println!("=== Sumi-Chronicle Dry Run ===\n");

    println!("Source:");
    println!("  Newest page: {}", config.source.base_url);
    println!(
        "  Earliest date: {}",
        config.source.earliest_date.as_deref().unwrap_or("not set")
    );
    if config.source.keywords.is_empty() {
        println!("  Keywords: none (every item is included)");
    } else {
        println!("  Keywords: {}", config.source.keywords.join(", "));
    }

    println!("\nTraversal:");
    println!("  Mode: {}", policy.mode);
    println!(
        "  Page cap: {}",
        policy
            .page_cap
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );
    if let Some(pages) = policy.early_stop_after {
        println!("  Early stop: after {} consecutive pages with nothing new", pages);
    }
    println!("  Checkpoint every: {} pages", policy.checkpoint_every);
    println!("  Page delay: {}s", config.traversal.page_delay_secs);
    println!("  Max attempts: {}", config.traversal.max_attempts);
    println!("  Detail pages: {}", config.traversal.fetch_detail_pages);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(path) = &config.output.json_lines_path {
        println!("  JSON lines: {}", path);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes the whole archive as JSON
fn handle_export(config: &Config) -> anyhow::Result<()> {
    let Some(path) = &config.output.export_path else {
        bail!("--export needs output.export-path in the configuration");
    };

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let written = export_json(&storage, Path::new(path))?;
    println!("✓ Exported {} items to: {}", written, path);

    Ok(())
}

/// Handles the --re-resolve mode
async fn handle_re_resolve(config: Config, config_hash: String) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let cancel = cancellation_on_ctrl_c();

    let mut traversal = Traversal::new(config, storage, Vec::new(), cancel)?
        .with_config_hash(config_hash);
    let summary = traversal.re_resolve().await?;

    println!(
        "Re-resolved {} items: {} improved, {} could not be fetched",
        summary.examined, summary.improved, summary.failed
    );
    Ok(())
}

/// Handles the main traversal
async fn handle_run(config: Config, config_hash: String) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let sinks = configured_sinks(&config)?;
    let cancel = cancellation_on_ctrl_c();

    let mut traversal = Traversal::new(config, storage, sinks, cancel)?
        .with_config_hash(config_hash);
    let summary = traversal.run().await.context("traversal aborted")?;

    print_summary(&summary);

    if summary.stop_reason == StopReason::FetchError {
        bail!(
            "run {} failed: {}",
            summary.run_id,
            summary.failure.as_deref().unwrap_or("fetch error")
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Run {} ({}) ===", summary.run_id, summary.mode);
    println!("  Stop reason: {}", summary.stop_reason);
    println!("  Pages visited: {}", summary.pages_visited);
    println!("  Items seen: {}", summary.items_seen);
    println!("  New items: {}", summary.items_accepted);
    println!("  Already archived: {}", summary.items_duplicate);
    println!("  Filtered out: {}", summary.items_filtered);
    println!("  Anomalies: {}", summary.anomalies);
    println!("  Needs review: {}", summary.review_flagged);
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());
}
