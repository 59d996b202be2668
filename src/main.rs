//! Token Transfer Bubble-Map CLI
//!
//! Fetches transfers into one receiver for one token and writes a bubble-map
//! page with the reduced graph embedded.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use transfer_bubblemap::bitquery::{BitqueryClient, TransferQuery};
use transfer_bubblemap::config::PipelineConfig;
use transfer_bubblemap::output::write_outputs;
use transfer_bubblemap::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "transfer-bubblemap")]
#[command(version)]
#[command(about = "Build a bubble map of token transfers into one receiver", long_about = None)]
struct Cli {
    /// Token mint / currency address
    currency: String,

    /// Receiver address whose inbound transfers are mapped
    receiver: String,

    /// Transfer date (YYYY-MM-DD), defaults to today (UTC)
    since: Option<NaiveDate>,

    /// Path to configuration file (optional, uses env vars if not provided)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Bitquery OAuth token
    #[arg(long, env = "BITQUERY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// HTML template containing the data placeholder
    #[arg(long)]
    template: Option<PathBuf>,

    /// Rendered HTML output path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the graph as raw JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Records requested per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Maximum pages to fetch
    #[arg(long)]
    max_pages: Option<u32>,

    /// Pause between pages (ms)
    #[arg(long)]
    inter_page_delay_ms: Option<u64>,

    /// Per-request timeout (ms)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Attempts per page before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Base delay for linear retry backoff (ms)
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Maximum nodes kept in the graph
    #[arg(long)]
    node_cap: Option<usize>,

    /// Maximum links kept in the graph
    #[arg(long)]
    edge_cap: Option<usize>,
}

impl Cli {
    /// CLI flags override file and environment settings
    fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(token) = &self.token {
            config.service.api_token = token.clone();
        }
        if let Some(path) = &self.template {
            config.output.template_path = path.clone();
        }
        if let Some(path) = &self.output {
            config.output.html_path = path.clone();
        }
        if let Some(path) = &self.json {
            config.output.json_path = Some(path.clone());
        }
        if let Some(v) = self.page_size {
            config.paging.page_size = v;
        }
        if let Some(v) = self.max_pages {
            config.paging.max_pages = v;
        }
        if let Some(v) = self.inter_page_delay_ms {
            config.paging.inter_page_delay_ms = v;
        }
        if let Some(v) = self.timeout_ms {
            config.retry.timeout_ms = v;
        }
        if let Some(v) = self.max_attempts {
            config.retry.max_attempts = v;
        }
        if let Some(v) = self.backoff_ms {
            config.retry.backoff_base_ms = v;
        }
        if let Some(v) = self.node_cap {
            config.limits.node_cap = v;
        }
        if let Some(v) = self.edge_cap {
            config.limits.edge_cap = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PipelineConfig::load().context("Failed to load config from environment")?,
    };
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    config.require_token().context("Missing API token")?;

    let since = cli.since.unwrap_or_else(|| Utc::now().date_naive());
    let query = TransferQuery::new(since, &cli.currency, &cli.receiver)
        .context("Invalid command arguments")?;

    info!(
        "Starting with configuration: since={} currency={} receiver={} paging={:?} retry={:?} limits={:?}",
        query.since, query.currency, query.receiver, config.paging, config.retry, config.limits
    );

    let client = BitqueryClient::from_config(&config.service).context("Failed to build HTTP client")?;
    let pipeline = Pipeline::new(client, &config)?;

    let outcome = pipeline
        .run(&query)
        .await
        .context("Failed to fetch transfers")?;

    let summary = &outcome.summary;
    info!(
        "Run complete: stop={} pages={} records={} nodes={}/{} links={}/{}",
        summary.stop_reason,
        summary.pages_fetched,
        summary.records_folded,
        summary.kept_nodes,
        summary.total_nodes,
        summary.kept_edges,
        summary.eligible_edges
    );

    write_outputs(&outcome.graph, &config.output).context("Failed to write output")?;

    Ok(())
}
