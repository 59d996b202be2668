//! Graph reduction: rank, cap, and close the edge set over the kept nodes.
//!
//! Ordering is fully determined by the data. Nodes sort by value descending,
//! then id ascending; edges by value descending, then source, then target.

use crate::aggregate::{from_micros, EdgeAccumulator, EdgeKey, EdgeTotals, NodeAccumulator};
use crate::config::GraphLimits;
use crate::schemas::{Edge, Graph, Node};
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::info;

/// Graph plus the counts needed to report how much was pruned.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub graph: Graph,
    pub total_nodes: usize,
    /// Edges whose both endpoints survived node pruning
    pub eligible_edges: usize,
}

/// Reduce the accumulators to a bounded graph. Inputs are only read.
pub fn reduce(nodes: &NodeAccumulator, edges: &EdgeAccumulator, limits: GraphLimits) -> Reduction {
    let mut ranked: Vec<(&str, u128)> = nodes.iter().collect();
    ranked.sort_unstable_by_key(|&(id, value)| (Reverse(value), id));
    ranked.truncate(limits.node_cap);

    let kept: HashSet<&str> = ranked.iter().map(|&(id, _)| id).collect();
    info!(
        "Built nodes: total={} kept={}",
        nodes.len(),
        ranked.len()
    );

    let mut eligible: Vec<(&EdgeKey, &EdgeTotals)> = edges
        .iter()
        .filter(|(key, _)| kept.contains(key.sender.as_str()) && kept.contains(key.receiver.as_str()))
        .collect();
    let eligible_edges = eligible.len();
    info!("Built links (pre-prune): eligible={}", eligible_edges);

    eligible.sort_unstable_by_key(|&(key, totals)| (Reverse(totals.value_micros), key));
    eligible.truncate(limits.edge_cap);
    info!("Pruned links: kept={}", eligible.len());

    let graph = Graph {
        nodes: ranked
            .into_iter()
            .map(|(id, value)| Node {
                id: id.to_string(),
                label: id.to_string(),
                value: from_micros(value),
            })
            .collect(),
        edges: eligible
            .into_iter()
            .map(|(key, totals)| Edge {
                source: key.sender.clone(),
                target: key.receiver.clone(),
                value: from_micros(totals.value_micros),
                count: totals.count,
            })
            .collect(),
    };

    Reduction {
        graph,
        total_nodes: nodes.len(),
        eligible_edges,
    }
}
