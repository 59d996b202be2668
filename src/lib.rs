//! Token Transfer Bubble-Map Library
//!
//! Pulls paged Solana transfer records for one token/receiver pair from the
//! Bitquery GraphQL API and reduces them to a bounded participant graph for a
//! static bubble-map page.
//!
//! # Pipeline Stages
//!
//! 1. **Fetch** ([`fetch`]): One page per request, with timeout and linear backoff retries
//! 2. **Aggregate** ([`aggregate`]): Folds each page into per-node and per-edge USD totals
//! 3. **Reduce** ([`reduce`]): Keeps the top nodes, drops edges to pruned nodes, keeps the top edges
//! 4. **Drive** ([`pipeline`]): Pages until an empty page, a short page, or the page cap
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use transfer_bubblemap::bitquery::{BitqueryClient, TransferQuery};
//! use transfer_bubblemap::config::PipelineConfig;
//! use transfer_bubblemap::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load()?;
//!     let client = BitqueryClient::from_config(&config.service)?;
//!     let pipeline = Pipeline::new(client, &config)?;
//!     let since = NaiveDate::from_ymd_opt(2025, 9, 24).unwrap();
//!     let query = TransferQuery::new(since, "Es9vMFrz...", "CapuXNQo...")?;
//!     let outcome = pipeline.run(&query).await?;
//!     println!("{} nodes, {} links", outcome.graph.nodes.len(), outcome.graph.edges.len());
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod bitquery;
pub mod config;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod reduce;
pub mod schemas;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome};
pub use schemas::{Edge, Graph, Node};
