//! Failure injection tests for the relay.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncReadExt;

use graph_relay::protocol::FrameError;

mod common;
use common::MockReply;

/// An address with nothing listening on it.
async fn dead_address() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_unreachable_backend_keeps_connection_usable() {
    let dead = dead_address().await;
    let alive = common::start_counting_backend("127.0.0.1").await;
    let relay = common::start_relay(common::relay_config(&[(Some("b1"), dead), (Some("b2"), alive)])).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let failed = conn.request(&common::graph_request(0)).await;
    assert_eq!(failed["error"], "backend_comm_failure");
    assert!(failed["detail"].as_str().unwrap().contains(&dead.to_string()));

    let ok = conn.request(&common::graph_request(1)).await;
    assert_eq!(ok["backend"], "b2");
    assert_eq!(ok["req_id"], 1);

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let slow = common::start_mock_backend(|_| async { MockReply::Hang(Duration::from_secs(5)) }).await;
    let mut config = common::relay_config(&[(Some("b1"), slow)]);
    config.timeouts.backend_ms = 300;
    let relay = common::start_relay(config).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let started = std::time::Instant::now();
    let reply = conn.request(&common::graph_request(0)).await;
    assert_eq!(reply["error"], "backend_comm_failure");
    assert!(reply["detail"].as_str().unwrap().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(3));

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_backend_closing_without_reply() {
    let closer = common::start_mock_backend(|_| async { MockReply::Close }).await;
    let relay = common::start_relay(common::relay_config(&[(Some("b1"), closer)])).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let reply = conn.request(&common::graph_request(0)).await;
    assert_eq!(reply["error"], "backend_comm_failure");

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_backend_error_payload_is_relayed() {
    let failing = common::start_mock_backend(|_| async { MockReply::Line(r#"{"error":"backend_failed"}"#.into()) }).await;
    let relay = common::start_relay(common::relay_config(&[(Some("b1"), failing)])).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let reply = conn.request(&common::graph_request(0)).await;
    assert_eq!(serde_json::Value::Object(reply), json!({"error": "backend_failed"}));

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_unrecognized_identity_uses_contacted_name() {
    let liar = common::start_mock_backend(|request| async move {
        MockReply::Line(json!({"backend": "203.0.113.9", "vertex_count": 2, "req_id": request["req_id"]}).to_string())
    })
    .await;
    let relay = common::start_relay(common::relay_config(&[(Some("b1"), liar)])).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let reply = conn.request(&common::graph_request(4)).await;
    assert_eq!(reply["backend"], "b1");
    // Missing key fields are filled in from the request.
    assert_eq!(reply["client_ip"], "127.0.0.1");
    assert_eq!(reply["req_id"], 4);

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_unnamed_backend_is_unknown() {
    let liar = common::start_mock_backend(|_| async {
        MockReply::Line(json!({"backend_ip": "203.0.113.9", "vertex_count": 2}).to_string())
    })
    .await;
    let relay = common::start_relay(common::relay_config(&[(None, liar)])).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let reply = conn.request(&common::graph_request(0)).await;
    assert_eq!(reply["backend"], "UNKNOWN");

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_input_rejected_then_closed() {
    let backend = common::start_counting_backend("127.0.0.1").await;
    let relay = common::start_relay(common::relay_config(&[(Some("b1"), backend)])).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    conn.send_raw(b"this is not json\n").await;
    let reply = conn.read().await.unwrap();
    assert_eq!(reply["error"], "invalid_request");
    assert!(matches!(conn.read().await, Err(FrameError::ConnectionClosed)));

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_schema_mismatch_rejected() {
    let backend = common::start_counting_backend("127.0.0.1").await;
    let relay = common::start_relay(common::relay_config(&[(Some("b1"), backend)])).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let reply = conn.request(&json!({"graph": {"A": ["B"]}})).await;
    assert_eq!(reply["error"], "invalid_request");

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_input_rejected() {
    let backend = common::start_counting_backend("127.0.0.1").await;
    let mut config = common::relay_config(&[(Some("b1"), backend)]);
    config.framing.max_message_bytes = 1024;
    let relay = common::start_relay(config).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let mut payload = b"{\"graph\":{\"A\":[\"".to_vec();
    payload.extend(std::iter::repeat(b'x').take(2000));
    conn.send_raw(&payload).await;

    let reply = tokio::time::timeout(Duration::from_secs(3), conn.read())
        .await
        .expect("relay answered in time")
        .unwrap();
    assert_eq!(reply["error"], "invalid_request");

    relay.shutdown.trigger();
}

#[tokio::test]
async fn test_idle_client_is_disconnected() {
    let backend = common::start_counting_backend("127.0.0.1").await;
    let mut config = common::relay_config(&[(Some("b1"), backend)]);
    config.timeouts.client_idle_ms = 200;
    let relay = common::start_relay(config).await;
    let mut conn = common::Conn::connect(relay.addr).await;

    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(3), conn.stream.read(&mut buf))
        .await
        .expect("relay closed the idle connection")
        .unwrap();
    assert_eq!(n, 0);

    relay.shutdown.trigger();
}
