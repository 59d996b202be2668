//! Paged fetcher: one logical page request with timeout and linear backoff.

use crate::bitquery::{FetchError, PageSource, QueryParams};
use crate::config::RetryPolicy;
use crate::schemas::TransferRecord;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Every attempt for a page failed. Fatal to the run.
#[derive(Error, Debug)]
#[error("page at offset {offset} failed after {attempts} attempts: {last}")]
pub struct RetriesExhausted {
    pub offset: u64,
    pub attempts: u32,
    #[source]
    pub last: FetchError,
}

/// Wraps a [`PageSource`] with per-attempt timeouts and retries.
pub struct PagedFetcher<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: PageSource> PagedFetcher<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch one page, retrying up to `max_attempts` times in total.
    ///
    /// After failed attempt `n` the fetcher sleeps `backoff_base_ms * n`. The
    /// last failure is returned without sleeping.
    pub async fn fetch(&self, params: &QueryParams) -> Result<Vec<TransferRecord>, RetriesExhausted> {
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.timeout();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(
                "[fetch] attempt={} limit={} offset={} since={} currency={}",
                attempt, params.limit, params.offset, params.since, params.currency
            );

            let result = match tokio::time::timeout(timeout, self.source.fetch_page(params)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            };

            let err = match result {
                Ok(page) => {
                    debug!("[fetch] offset={} items={}", params.offset, page.len());
                    return Ok(page);
                }
                Err(err) => err,
            };

            warn!(
                "[fetch] {} error on attempt {}/{} at offset {}: {}",
                err.kind(),
                attempt,
                max_attempts,
                params.offset,
                err
            );

            if attempt >= max_attempts || !err.is_retryable() {
                error!(
                    "[fetch] giving up on offset {} after {} attempts",
                    params.offset, attempt
                );
                return Err(RetriesExhausted {
                    offset: params.offset,
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.policy.backoff_for(attempt);
            debug!("[fetch] retrying after {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Source that replays a script of outcomes and records when each call began.
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<TransferRecord>, FetchError>>>,
        calls: Mutex<Vec<(Instant, u64)>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Result<Vec<TransferRecord>, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<(Instant, u64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, params: &QueryParams) -> Result<Vec<TransferRecord>, FetchError> {
            self.calls.lock().unwrap().push((Instant::now(), params.offset));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Source that never answers.
    struct HangingSource;

    #[async_trait]
    impl PageSource for HangingSource {
        async fn fetch_page(&self, _params: &QueryParams) -> Result<Vec<TransferRecord>, FetchError> {
            std::future::pending().await
        }
    }

    pub(crate) fn params(offset: u64) -> QueryParams {
        QueryParams {
            since: NaiveDate::from_ymd_opt(2025, 9, 24).unwrap(),
            currency: "cur".to_string(),
            receiver: "recv".to_string(),
            limit: 100,
            offset,
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout_ms: 1_000,
            max_attempts,
            backoff_base_ms: 800,
        }
    }

    /// Paused-clock timers may land a tick late.
    pub(crate) fn assert_elapsed(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    fn failure() -> Result<Vec<TransferRecord>, FetchError> {
        Err(FetchError::Service("boom".to_string()))
    }

    fn record() -> TransferRecord {
        TransferRecord::from_parts(Some(1.0), Some("A"), Some("B"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let source = std::sync::Arc::new(ScriptedSource::new(vec![
            failure(),
            failure(),
            Ok(vec![record()]),
        ]));
        let fetcher = PagedFetcher::new(source.clone(), policy(5));

        let page = fetcher.fetch(&params(0)).await.unwrap();
        assert_eq!(page.len(), 1);

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert_elapsed(calls[1].0 - calls[0].0, Duration::from_millis(800));
        assert_elapsed(calls[2].0 - calls[1].0, Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let source = std::sync::Arc::new(ScriptedSource::new(
            (0..10).map(|_| failure()).collect(),
        ));
        let fetcher = PagedFetcher::new(source.clone(), policy(5));

        let start = Instant::now();
        let err = fetcher.fetch(&params(300)).await.unwrap_err();
        assert_eq!(err.attempts, 5);
        assert_eq!(err.offset, 300);
        assert!(matches!(err.last, FetchError::Service(_)));
        assert_eq!(source.calls().len(), 5);
        // 800 * (1 + 2 + 3 + 4); no sleep after the final attempt
        assert_elapsed(Instant::now() - start, Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let source = std::sync::Arc::new(ScriptedSource::new(vec![failure(), Ok(vec![record()])]));
        let fetcher = PagedFetcher::new(source.clone(), policy(1));

        assert!(fetcher.fetch(&params(0)).await.is_err());
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let fetcher = PagedFetcher::new(HangingSource, policy(2));

        let start = Instant::now();
        let err = fetcher.fetch(&params(0)).await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last, FetchError::Timeout(_)));
        // two 1s timeouts plus one 800ms backoff
        assert_elapsed(Instant::now() - start, Duration::from_millis(2800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_is_success() {
        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let fetcher = PagedFetcher::new(source, policy(5));
        assert!(fetcher.fetch(&params(0)).await.unwrap().is_empty());
    }
}
