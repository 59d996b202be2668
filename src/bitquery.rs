//! Bitquery GraphQL client for Solana token transfers.
//!
//! One call to [`PageSource::fetch_page`] is one HTTP attempt. Timeouts and
//! retries live in [`crate::fetch`], so any source (including test doubles)
//! gets the same retry behaviour.

use crate::config::ServiceConfig;
use crate::schemas::TransferRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Longest response body snippet kept in an error
const BODY_SNIPPET_LEN: usize = 300;

/// Transfers into one receiver for one currency on one date, newest first.
pub const TRANSFERS_QUERY: &str = r#"
query TransfersForBubbleMap($since: ISO8601DateTime!, $currency: String, $receiver: String, $limit: Int = 1000, $offset: Int = 0) {
  solana {
    transfers(
      date: { is: $since }
      options: { limit: $limit, offset: $offset, desc: ["date.date", "block.height"] }
      currency: { is: $currency }
      receiverAddress: { is: $receiver }
    ) {
      amount(in: USD)
      currency { symbol address decimals }
      sender { address }
      receiver { address }
      transaction { signature transactionIndex }
      block { height timestamp { iso8601 } }
      date { date }
    }
  }
}"#;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Service error: {0}")]
    Service(String),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl FetchError {
    /// Every failure of a single attempt is worth another try; the retry
    /// budget is what bounds the run.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(_)
            | FetchError::Timeout(_)
            | FetchError::Status { .. }
            | FetchError::Service(_)
            | FetchError::Deserialize(_) => true,
        }
    }

    /// Transport-level failures versus well-formed responses carrying an error.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http(_) | FetchError::Timeout(_) | FetchError::Status { .. } => "transport",
            FetchError::Service(_) | FetchError::Deserialize(_) => "service",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("currency address must not be empty")]
    EmptyCurrency,

    #[error("receiver address must not be empty")]
    EmptyReceiver,
}

/// Validated command input: which transfers to map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferQuery {
    pub since: NaiveDate,
    pub currency: String,
    pub receiver: String,
}

impl TransferQuery {
    pub fn new(since: NaiveDate, currency: &str, receiver: &str) -> Result<Self, QueryError> {
        let currency = currency.trim();
        let receiver = receiver.trim();
        if currency.is_empty() {
            return Err(QueryError::EmptyCurrency);
        }
        if receiver.is_empty() {
            return Err(QueryError::EmptyReceiver);
        }
        Ok(Self {
            since,
            currency: currency.to_string(),
            receiver: receiver.to_string(),
        })
    }

    /// Parameters for the page starting at `offset`.
    pub fn page(&self, limit: u32, offset: u64) -> QueryParams {
        QueryParams {
            since: self.since,
            currency: self.currency.clone(),
            receiver: self.receiver.clone(),
            limit,
            offset,
        }
    }
}

/// GraphQL variables for one page request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParams {
    pub since: NaiveDate,
    pub currency: String,
    pub receiver: String,
    pub limit: u32,
    pub offset: u64,
}

/// Anything that can return one page of transfers per call.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, params: &QueryParams) -> Result<Vec<TransferRecord>, FetchError>;
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for std::sync::Arc<T> {
    async fn fetch_page(&self, params: &QueryParams) -> Result<Vec<TransferRecord>, FetchError> {
        (**self).fetch_page(params).await
    }
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'static str,
    variables: &'a QueryParams,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    solana: Option<SolanaData>,
}

#[derive(Debug, Deserialize)]
struct SolanaData {
    /// `None` when the key is absent, `Some(None)` when it is `null`
    #[serde(default, deserialize_with = "present")]
    transfers: Option<Option<Vec<TransferRecord>>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Bearer-authenticated client for the Bitquery GraphQL endpoint.
pub struct BitqueryClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl BitqueryClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("transfer-bubblemap/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, FetchError> {
        Self::new(config.endpoint.clone(), config.api_token.clone())
    }

    /// Pull the transfer list out of a GraphQL response body.
    fn parse_body(body: &str) -> Result<Vec<TransferRecord>, FetchError> {
        let response: GraphQlResponse = serde_json::from_str(body)?;

        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            return Err(FetchError::Service(serde_json::to_string(&errors)?));
        }

        let solana = response
            .data
            .and_then(|d| d.solana)
            .ok_or_else(|| FetchError::Service("response missing data.solana".to_string()))?;

        let transfers = solana.transfers.ok_or_else(|| {
            FetchError::Service("response missing data.solana.transfers".to_string())
        })?;

        Ok(transfers.unwrap_or_default())
    }
}

#[async_trait]
impl PageSource for BitqueryClient {
    async fn fetch_page(&self, params: &QueryParams) -> Result<Vec<TransferRecord>, FetchError> {
        let request = GraphQlRequest {
            query: TRANSFERS_QUERY,
            variables: params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        debug!("HTTP status={}", status);

        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(BODY_SNIPPET_LEN).collect(),
            });
        }

        let transfers = Self::parse_body(&body)?;
        debug!("items={}", transfers.len());
        Ok(transfers)
    }
}
