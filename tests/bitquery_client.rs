use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use transfer_bubblemap::bitquery::{BitqueryClient, FetchError, PageSource, TransferQuery};
use transfer_bubblemap::config::PipelineConfig;
use transfer_bubblemap::pipeline::{Pipeline, PipelineError};
use transfer_bubblemap::schemas::{StopReason, UNKNOWN_SENDER};

fn query() -> TransferQuery {
    TransferQuery::new(NaiveDate::from_ymd_opt(2025, 9, 24).unwrap(), "USDT", "RECV").unwrap()
}

fn transfers_body(transfers: serde_json::Value) -> serde_json::Value {
    json!({ "data": { "solana": { "transfers": transfers } } })
}

fn fast_config(endpoint: &str) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.service.endpoint = endpoint.to_string();
    config.service.api_token = "test-token".to_string();
    config.retry.backoff_base_ms = 10;
    config.retry.timeout_ms = 5_000;
    config.paging.inter_page_delay_ms = 0;
    config.paging.page_size = 2;
    config
}

#[tokio::test]
async fn test_client_sends_variables_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "variables": {
                "since": "2025-09-24",
                "currency": "USDT",
                "receiver": "RECV",
                "limit": 2,
                "offset": 4
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(transfers_body(json!([
            { "amount": 12.0, "sender": { "address": "A" }, "receiver": { "address": "RECV" } },
            { "amount": null, "sender": null, "receiver": { "address": "RECV" } }
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let client = BitqueryClient::new(server.uri(), "test-token").unwrap();
    let page = client.fetch_page(&query().page(2, 4)).await.unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page[0].usd(), 12.0);
    assert_eq!(page[1].sender_address(), UNKNOWN_SENDER);
}

#[tokio::test]
async fn test_client_reports_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let client = BitqueryClient::new(server.uri(), "test-token").unwrap();
    let err = client.fetch_page(&query().page(2, 0)).await.unwrap_err();

    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "upstream unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_client_reports_graphql_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Query too complex" }]
        })))
        .mount(&server)
        .await;

    let client = BitqueryClient::new(server.uri(), "test-token").unwrap();
    let err = client.fetch_page(&query().page(2, 0)).await.unwrap_err();

    assert!(matches!(err, FetchError::Service(ref msg) if msg.contains("Query too complex")));
}

#[tokio::test]
async fn test_pipeline_pages_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "offset": 0 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(transfers_body(json!([
            { "amount": 10.0, "sender": { "address": "A" }, "receiver": { "address": "RECV" } },
            { "amount": 4.0, "sender": { "address": "B" }, "receiver": { "address": "RECV" } }
        ]))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "offset": 2 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(transfers_body(json!([
            { "amount": -6.0, "sender": { "address": "A" }, "receiver": { "address": "RECV" } }
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let config = fast_config(&server.uri());
    let client = BitqueryClient::from_config(&config.service).unwrap();
    let outcome = Pipeline::new(client, &config).unwrap().run(&query()).await.unwrap();

    assert_eq!(outcome.summary.pages_fetched, 2);
    assert_eq!(outcome.summary.stop_reason, StopReason::ShortPage);

    let ids: Vec<&str> = outcome.graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["RECV", "A", "B"]);
    assert_eq!(outcome.graph.nodes[0].value, 20.0);

    let top = &outcome.graph.edges[0];
    assert_eq!((top.source.as_str(), top.target.as_str()), ("A", "RECV"));
    assert_eq!(top.value, 16.0);
    assert_eq!(top.count, 2);
}

#[tokio::test]
async fn test_pipeline_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(transfers_body(json!([
            { "amount": 1.0, "sender": { "address": "A" }, "receiver": { "address": "RECV" } }
        ]))))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let config = fast_config(&server.uri());
    let client = BitqueryClient::from_config(&config.service).unwrap();
    let outcome = Pipeline::new(client, &config).unwrap().run(&query()).await.unwrap();

    assert_eq!(outcome.summary.pages_fetched, 1);
    assert_eq!(outcome.graph.edges.len(), 1);
}

#[tokio::test]
async fn test_pipeline_fails_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "rate limited" }]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = fast_config(&server.uri());
    config.retry.max_attempts = 3;
    let client = BitqueryClient::from_config(&config.service).unwrap();
    let err = Pipeline::new(client, &config).unwrap().run(&query()).await.unwrap_err();

    match err {
        PipelineError::Fetch(exhausted) => {
            assert_eq!(exhausted.attempts, 3);
            assert!(matches!(exhausted.last, FetchError::Service(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}
