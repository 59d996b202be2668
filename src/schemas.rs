//! Data schemas for the bubble-map pipeline.
//!
//! Upstream transfer records are decoded leniently: only the amount and the two
//! addresses feed the graph, everything else is carried along inert.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier used when a transfer has no sender address
pub const UNKNOWN_SENDER: &str = "UNKNOWN_SENDER";

/// Identifier used when a transfer has no receiver address
pub const UNKNOWN_RECEIVER: &str = "UNKNOWN_RECEIVER";

// ============================================================================
// PART A: Upstream transfer schema
// ============================================================================

/// One transfer as returned by `solana.transfers`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferRecord {
    /// Amount in USD. `None` when missing or not a JSON number.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    pub sender: Option<Party>,

    #[serde(default, deserialize_with = "lenient")]
    pub receiver: Option<Party>,

    #[serde(default, deserialize_with = "lenient")]
    pub currency: Option<CurrencyInfo>,

    #[serde(default, deserialize_with = "lenient")]
    pub transaction: Option<TransactionRef>,

    #[serde(default, deserialize_with = "lenient")]
    pub block: Option<BlockRef>,

    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<DateRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Party {
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrencyInfo {
    pub symbol: Option<String>,
    pub address: Option<String>,
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRef {
    pub signature: Option<String>,
    pub transaction_index: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockRef {
    pub height: Option<u64>,
    pub timestamp: Option<BlockTimestamp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockTimestamp {
    pub iso8601: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRef {
    pub date: Option<String>,
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

/// A value of the wrong shape decodes as `None` instead of failing the page.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

impl TransferRecord {
    /// Build a record from the three fields the graph consumes.
    pub fn from_parts(amount: Option<f64>, sender: Option<&str>, receiver: Option<&str>) -> Self {
        Self {
            amount,
            sender: sender.map(|a| Party {
                address: Some(a.to_string()),
            }),
            receiver: receiver.map(|a| Party {
                address: Some(a.to_string()),
            }),
            ..Default::default()
        }
    }

    /// Absolute USD value; missing or non-finite amounts count as zero.
    pub fn usd(&self) -> f64 {
        self.amount
            .filter(|v| v.is_finite())
            .map(f64::abs)
            .unwrap_or(0.0)
    }

    pub fn sender_address(&self) -> &str {
        party_address(&self.sender).unwrap_or(UNKNOWN_SENDER)
    }

    pub fn receiver_address(&self) -> &str {
        party_address(&self.receiver).unwrap_or(UNKNOWN_RECEIVER)
    }
}

fn party_address(party: &Option<Party>) -> Option<&str> {
    party
        .as_ref()
        .and_then(|p| p.address.as_deref())
        .filter(|a| !a.is_empty())
}

// ============================================================================
// PART B: Output graph schema
// ============================================================================

/// Participant bubble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Always equal to `id`
    pub label: String,
    /// Total absolute USD seen as sender or receiver
    pub value: f64,
}

/// Directed transfer aggregate between two retained nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub value: f64,
    pub count: u64,
}

/// Bounded graph handed to the visualization template
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    /// Serialized as `links`, the name the template reads
    #[serde(rename = "links")]
    pub edges: Vec<Edge>,
}

impl Graph {
    /// True when every edge endpoint is present in the node list.
    pub fn is_closed(&self) -> bool {
        let ids: std::collections::HashSet<&str> =
            self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges
            .iter()
            .all(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// Why the paging loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The service returned an empty page
    Exhausted,
    /// The configured page cap was reached
    MaxPages,
    /// A page came back shorter than requested
    ShortPage,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "exhausted"),
            StopReason::MaxPages => write!(f, "max_pages"),
            StopReason::ShortPage => write!(f, "short_page"),
        }
    }
}

/// Counters for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub pages_fetched: u32,
    pub records_folded: usize,
    pub stop_reason: StopReason,
    pub total_nodes: usize,
    pub kept_nodes: usize,
    pub eligible_edges: usize,
    pub kept_edges: usize,
}
