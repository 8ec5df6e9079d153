//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest catalog harvester.

use anyhow::{bail, Context};
use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::crawler::{create_batches_with, Coordinator};
use catalog_harvest::extract::SchoolDetailExtractor;
use catalog_harvest::output::{format_summary, write_summary};
use catalog_harvest::render::{Browser, WebDriverRenderer};
use catalog_harvest::storage::open_sink;
use catalog_harvest::HarvestError;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a resilient paginated-catalog harvester
///
/// Walks a server-rendered catalog page by page through its pagination
/// control, extracts one record per detail page and appends every record to
/// a CSV file as soon as it is produced.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resilient paginated-catalog harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Harvest only an explicit page range
    #[arg(long)]
    sample: bool,

    /// First page of the sample range
    #[arg(long, default_value_t = 1, requires = "sample")]
    start_page: u32,

    /// Last page of the sample range
    #[arg(long, default_value_t = 2, requires = "sample")]
    end_page: u32,

    /// Validate config and show the run plan without harvesting
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli);
        return Ok(());
    }

    handle_harvest(config, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration and plan
fn handle_dry_run(config: &Config, cli: &Cli) {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Site:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Detail marker: {}", config.site.detail_marker);
    println!("  Next-page selectors: {}", config.site.next_selectors.join(", "));

    println!("\nScraper:");
    println!("  Max concurrent fetches: {}", config.scraper.max_concurrent);
    println!("  Sessions per batch: {}", config.scraper.sessions_per_batch);
    println!("  Batch size: {} pages", config.scraper.batch_size);
    println!("  Page size: {}", config.scraper.page_size);
    println!(
        "  Retries: {} (base {}ms, cap {}ms)",
        config.scraper.retry_attempts,
        config.scraper.retry_base_delay_ms,
        config.scraper.retry_max_delay_ms
    );

    println!("\nRenderer:");
    println!("  WebDriver: {}", config.renderer.webdriver_url);
    println!(
        "  Browser: {} (headless: {})",
        config.renderer.browser, config.renderer.headless
    );

    println!("\nOutput:");
    println!("  Results directory: {}", config.output.results_dir.display());
    if let Some(path) = &config.output.output_file {
        println!("  Output file: {}", path.display());
    }

    if cli.sample {
        let span = cli.end_page.saturating_sub(cli.start_page) + 1;
        let batches = create_batches_with(
            span,
            config.scraper.batch_size,
            config.scraper.max_concurrent,
        );
        println!(
            "\n✓ Would harvest pages {}-{} in {} batches",
            cli.start_page,
            cli.end_page,
            batches.len()
        );
    } else {
        println!("\n✓ Would discover the page count and harvest the full catalog");
    }
    println!("✓ Configuration is valid");
}

/// Handles the harvest itself
async fn handle_harvest(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let Some(browser) = Browser::from_name(&config.renderer.browser) else {
        bail!("Unsupported browser '{}'", config.renderer.browser);
    };
    let renderer = WebDriverRenderer::new(
        &config.renderer.webdriver_url,
        browser,
        config.renderer.headless,
        config.scraper.timeout(),
    )?
    .with_poll_interval(Duration::from_millis(config.renderer.poll_interval_ms));

    let sink = Arc::new(open_sink(&config.output.results_dir));
    let extractor = Arc::new(SchoolDetailExtractor::new()?);
    let summary_path = config.output.summary_path.clone();

    let cancel = CancellationToken::new();
    let mut coordinator = Coordinator::new(
        config,
        Arc::new(renderer),
        sink,
        extractor,
        cancel.clone(),
    )?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let result = if cli.sample {
        coordinator.run_sample(cli.start_page, cli.end_page).await
    } else {
        coordinator.run_full().await
    };

    let summary = coordinator.summary();
    println!("{}", format_summary(&summary));
    if let Some(path) = summary_path {
        write_summary(&summary, &path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        tracing::info!("Summary written to {}", path.display());
    }

    match result {
        Ok(_) => {
            tracing::info!("Harvest completed successfully");
            Ok(())
        }
        Err(HarvestError::Cancelled) => {
            tracing::warn!("Harvest interrupted; output file closed cleanly");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
