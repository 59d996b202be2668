//! Pipeline driver: fetch and fold pages until a stop condition, then reduce.
//!
//! Pages are fetched and folded strictly one after another. The accumulators
//! live for exactly one [`Pipeline::run`] call.

use crate::aggregate::{fold_page, EdgeAccumulator, NodeAccumulator};
use crate::bitquery::{PageSource, TransferQuery};
use crate::config::{ConfigError, GraphLimits, PagingConfig, PipelineConfig};
use crate::fetch::{PagedFetcher, RetriesExhausted};
use crate::reduce::reduce;
use crate::schemas::{Graph, RunSummary, StopReason, TransferRecord};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] RetriesExhausted),
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub graph: Graph,
    pub summary: RunSummary,
}

enum State {
    Fetching { offset: u64 },
    Aggregating { offset: u64, page: Vec<TransferRecord> },
    Stopped(StopReason),
}

pub struct Pipeline<S> {
    fetcher: PagedFetcher<S>,
    paging: PagingConfig,
    limits: GraphLimits,
}

impl<S: PageSource> Pipeline<S> {
    pub fn new(source: S, config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            fetcher: PagedFetcher::new(source, config.retry),
            paging: config.paging,
            limits: config.limits,
        })
    }

    /// Run the paging loop to completion and reduce the result.
    ///
    /// A page that exhausts its retries aborts the run; no partial graph is
    /// returned.
    pub async fn run(&self, query: &TransferQuery) -> Result<PipelineOutcome, PipelineError> {
        let limit = self.paging.page_size;
        let mut nodes = NodeAccumulator::new();
        let mut edges = EdgeAccumulator::new();
        let mut pages_fetched: u32 = 0;
        let mut records_folded: usize = 0;

        info!(
            "Starting paging loop: since={} currency={} receiver={} page_size={} max_pages={}",
            query.since, query.currency, query.receiver, limit, self.paging.max_pages
        );

        let mut state = State::Fetching { offset: 0 };
        let stop_reason = loop {
            state = match state {
                State::Fetching { offset } => {
                    info!("Fetching page offset={} limit={}", offset, limit);
                    let page = self.fetcher.fetch(&query.page(limit, offset)).await?;
                    info!("Received page length={}", page.len());

                    if page.is_empty() {
                        info!("Empty page received, stopping");
                        State::Stopped(StopReason::Exhausted)
                    } else {
                        State::Aggregating { offset, page }
                    }
                }
                State::Aggregating { offset, page } => {
                    fold_page(&page, &mut nodes, &mut edges);
                    pages_fetched += 1;
                    records_folded += page.len();
                    info!(
                        "Aggregated page into maps: node_count={} link_pairs={}",
                        nodes.len(),
                        edges.len()
                    );

                    if pages_fetched >= self.paging.max_pages {
                        info!("max_pages reached, stopping");
                        State::Stopped(StopReason::MaxPages)
                    } else if page.len() < limit as usize {
                        info!("Last page detected (shorter than page_size), stopping");
                        State::Stopped(StopReason::ShortPage)
                    } else {
                        if let Some(delay) = self.paging.inter_page_delay() {
                            debug!("Sleeping {:?} before next page", delay);
                            tokio::time::sleep(delay).await;
                        }
                        State::Fetching {
                            offset: offset + limit as u64,
                        }
                    }
                }
                State::Stopped(reason) => break reason,
            };
        };

        let reduction = reduce(&nodes, &edges, self.limits);
        let summary = RunSummary {
            pages_fetched,
            records_folded,
            stop_reason,
            total_nodes: reduction.total_nodes,
            kept_nodes: reduction.graph.nodes.len(),
            eligible_edges: reduction.eligible_edges,
            kept_edges: reduction.graph.edges.len(),
        };
        info!(
            "Paging finished: reason={} pages={} records={}",
            summary.stop_reason, summary.pages_fetched, summary.records_folded
        );

        Ok(PipelineOutcome {
            graph: reduction.graph,
            summary,
        })
    }
}
