//! Wayfinder main entry point
//!
//! This is the command-line interface for the Wayfinder flow mapper.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wayfinder::config::{load_config_with_hash, Config};
use wayfinder::report::{export_sqlite, print_summary, write_json, write_markdown};
use wayfinder::{CrawlReport, CrawlRun};

/// Wayfinder: crawl a site and turn its user flows into test requirements
///
/// Wayfinder crawls a site politely, records every page, link and form it
/// finds into a flow graph, then walks that graph to enumerate user flows
/// and derive the test requirements that cover them.
#[derive(Parser, Debug)]
#[command(name = "wayfinder")]
#[command(version)]
#[command(about = "Crawl a site and derive user-flow test requirements", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Write the JSON report here (overrides output.json-path)
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Write the Markdown report here (overrides output.markdown-path)
    #[arg(long, value_name = "PATH")]
    markdown: Option<PathBuf>,

    /// Append the run to this SQLite database (overrides output.database-path)
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Ignore the crawled site's robots.txt
    #[arg(long)]
    no_robots: bool,
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

    apply_overrides(&mut config, &cli);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let report = handle_crawl(config.clone(), config_hash).await?;
    write_reports(&report, &config)?;

    if !cli.quiet {
        print_summary(&report);
    }

    if report.status().is_failed() {
        anyhow::bail!(
            "crawl failed: every entry URL failed ({} failures)",
            report.frontier.failures.len()
        );
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
            0 => EnvFilter::new("wayfinder=info,warn"),
            1 => EnvFilter::new("wayfinder=debug,info"),
            2 => EnvFilter::new("wayfinder=trace,debug"),
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

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(path) = &cli.json {
        config.output.json_path = Some(path.display().to_string());
    }
    if let Some(path) = &cli.markdown {
        config.output.markdown_path = Some(path.display().to_string());
    }
    if let Some(path) = &cli.database {
        config.output.database_path = Some(path.display().to_string());
    }
    if cli.no_robots {
        tracing::info!("robots.txt checks disabled from the command line");
        config.crawl.respect_robots_txt = false;
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) {
    let crawl = &config.crawl;

    println!("=== Wayfinder Dry Run ===\n");

    println!("Crawl Bounds:");
    println!("  Max depth: {}", crawl.max_depth);
    println!("  Max pages: {}", crawl.max_pages);
    match crawl.wall_clock_budget() {
        Some(budget) => println!("  Wall-clock budget: {:?}", budget),
        None => println!("  Wall-clock budget: none"),
    }
    println!("  Max flow length: {}", crawl.max_flow_length);
    println!("  Max flows: {}", crawl.max_flows);

    println!("\nPoliteness:");
    println!("  Workers: {} (batch size {})", crawl.worker_count, crawl.batch_size);
    println!("  Per-host concurrency: {}", crawl.per_host_concurrency);
    println!("  Global rate limit: {}/s", crawl.global_rate_limit_per_sec);
    println!("  Min host interval: {}ms", crawl.min_host_interval_ms);
    println!(
        "  Retries: {} (base delay {}ms)",
        crawl.retry_budget, crawl.retry_base_delay_ms
    );
    println!("  Respect robots.txt: {}", crawl.respect_robots_txt);
    println!("  User-Agent: {}", config.user_agent.header_value());

    println!("\nScope:");
    println!("  Same host only: {}", crawl.same_host_only);
    for pattern in &config.scope.allow_paths {
        println!("  Allow: {}", pattern);
    }
    for pattern in &config.scope.deny_paths {
        println!("  Deny: {}", pattern);
    }

    println!("\nEntry URLs ({}):", crawl.entry_urls.len());
    for url in &crawl.entry_urls {
        println!("  - {}", url);
    }

    if !config.annotations.is_empty() {
        println!("\nAnnotations ({}):", config.annotations.len());
        for annotation in &config.annotations {
            println!(
                "  - {} ({:?}){}",
                annotation.url,
                annotation.role,
                annotation
                    .label
                    .as_deref()
                    .map(|label| format!(": {}", label))
                    .unwrap_or_default()
            );
        }
    }

    println!("\nOutput:");
    println!("  JSON: {}", config.output.json_path.as_deref().unwrap_or("-"));
    println!("  Markdown: {}", config.output.markdown_path.as_deref().unwrap_or("-"));
    println!("  Database: {}", config.output.database_path.as_deref().unwrap_or("-"));

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
///
/// Ctrl-C cancels the run; the partial report is still produced.
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<CrawlReport> {
    let run = CrawlRun::new(config)?.with_config_hash(config_hash);

    let token = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl and writing partial results");
            token.cancel();
        }
    });

    let report = run.execute().await?;
    tracing::info!("Crawl finished with status {}", report.status());
    Ok(report)
}

fn write_reports(report: &CrawlReport, config: &Config) -> anyhow::Result<()> {
    if let Some(path) = &config.output.json_path {
        write_json(report, Path::new(path))
            .with_context(|| format!("failed to write JSON report to {}", path))?;
    }
    if let Some(path) = &config.output.markdown_path {
        write_markdown(report, Path::new(path))
            .with_context(|| format!("failed to write Markdown report to {}", path))?;
    }
    if let Some(path) = &config.output.database_path {
        export_sqlite(report, Path::new(path))
            .with_context(|| format!("failed to export to {}", path))?;
    }
    Ok(())
}
