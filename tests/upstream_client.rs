//! Upstream client behavior against a mock decision service.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use apigate::config::Config;
use apigate::error::GateError;
use apigate::models::CheckRequest;
use apigate::upstream::UpstreamClient;

use helpers::mock_upstream::MockUpstream;

fn client_for(addr: std::net::SocketAddr, api_key: Option<&str>) -> UpstreamClient {
    let config = Config {
        upstream_base_url: format!("http://{addr}"),
        upstream_api_key: api_key.map(str::to_string),
        ..Default::default()
    };
    UpstreamClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_check_batch_maps_verdicts() {
    let (addr, handle) = MockUpstream::new().with_blocked_key("1.2.3.4").start().await;
    let client = client_for(addr, None);

    let keys = vec!["1.2.3.4".to_string(), "5.6.7.8".to_string()];
    let decisions = client.check_batch(&keys).await.unwrap();

    assert_eq!(decisions.len(), 2);
    let denied = decisions.iter().find(|d| d.key == "1.2.3.4").unwrap();
    assert!(!denied.allow);
    let allowed = decisions.iter().find(|d| d.key == "5.6.7.8").unwrap();
    assert!(allowed.allow);

    // The request body is exactly the JSON array of keys.
    let recorded = handle.batch_requests().await;
    assert_eq!(recorded, vec![keys]);
}

#[tokio::test]
async fn test_check_batch_non_2xx_is_status_error() {
    let (addr, _handle) = MockUpstream::new()
        .with_batch_status(StatusCode::INTERNAL_SERVER_ERROR)
        .start()
        .await;
    let client = client_for(addr, None);

    let result = client.check_batch(&["k".to_string()]).await;
    assert!(matches!(
        result,
        Err(GateError::UpstreamStatus { status: 500 })
    ));
}

#[tokio::test]
async fn test_check_batch_malformed_body_is_decode_error() {
    let (addr, _handle) = MockUpstream::new()
        .with_batch_raw_body("this is not json")
        .start()
        .await;
    let client = client_for(addr, None);

    let result = client.check_batch(&["k".to_string()]).await;
    assert!(matches!(result, Err(GateError::UpstreamDecode { .. })));
}

#[tokio::test]
async fn test_connection_refused_is_connection_error() {
    let config = Config {
        // Nothing listens here.
        upstream_base_url: "http://127.0.0.1:1".to_string(),
        upstream_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let client = UpstreamClient::new(&config).unwrap();

    let result = client.check_batch(&["k".to_string()]).await;
    assert!(matches!(result, Err(GateError::UpstreamConnection { .. })));
}

#[tokio::test]
async fn test_api_key_header_sent_when_configured() {
    let (addr, handle) = MockUpstream::new().start().await;
    let client = client_for(addr, Some("sekrit"));

    client.check_batch(&["k".to_string()]).await.unwrap();

    let keys = handle.api_keys_seen().await;
    assert_eq!(keys, vec![Some("sekrit".to_string())]);
}

#[tokio::test]
async fn test_api_key_header_absent_when_unconfigured() {
    let (addr, handle) = MockUpstream::new().start().await;
    let client = client_for(addr, None);

    client.check_batch(&["k".to_string()]).await.unwrap();

    let keys = handle.api_keys_seen().await;
    assert_eq!(keys, vec![None]);
}

#[tokio::test]
async fn test_check_one_individual_endpoint() {
    let (addr, _handle) = MockUpstream::new().with_blocked_key("1.2.3.4").start().await;
    let client = client_for(addr, None);

    let blocked = client
        .check_one(&CheckRequest {
            ip_address: "1.2.3.4".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!blocked.allow);

    let allowed = client
        .check_one(&CheckRequest {
            ip_address: "5.6.7.8".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(allowed.allow);
}

#[tokio::test]
async fn test_ship_logs_status_check() {
    let (addr, handle) = MockUpstream::new().start().await;
    let client = client_for(addr, None);

    let entry = apigate::models::LogEntry {
        ip_address: "1.2.3.4".to_string(),
        email: "tok".to_string(),
        user_agent: "ua".to_string(),
        http_method: "GET".to_string(),
        endpoint: "/v1".to_string(),
        event_type: String::new(),
        username: String::new(),
        response_code: None,
        track_request: true,
    };
    client.ship_logs(&[entry]).await.unwrap();
    assert_eq!(handle.log_batches().await.len(), 1);

    let (bad_addr, _bad_handle) = MockUpstream::new()
        .with_log_status(StatusCode::BAD_GATEWAY)
        .start()
        .await;
    let bad_client = client_for(bad_addr, None);
    let result = bad_client.ship_logs(&[]).await;
    assert!(matches!(
        result,
        Err(GateError::UpstreamStatus { status: 502 })
    ));
}

#[tokio::test]
async fn test_client_is_shareable() {
    // One pooled client serves both the engine and the shipper.
    let (addr, _handle) = MockUpstream::new().start().await;
    let client = client_for(addr, None);
    let clone = client.clone();

    let config = Arc::new(Config {
        upstream_base_url: format!("http://{addr}"),
        ..Default::default()
    });
    let engine = apigate::engine::DecisionEngine::new(config.clone(), client);
    let shipper = apigate::shipper::LogShipper::new(&config, clone);

    // Both halves stay functional.
    let response = engine
        .check(CheckRequest {
            ip_address: "1.2.3.4".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(response.allow);
    assert_eq!(shipper.buffered(), 0);
}
