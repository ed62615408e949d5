//! Server tests
//!
//! End-to-end over real WebSockets against a relay on an ephemeral port,
//! plus the static file routes through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use chatrelay_core::encode_frame;
use chatrelay_router::{build_app, server::STATIC_ERROR_BODY, MemoryLogSink, Router, RouterConfig};
use chatrelay_test_utils::TestRelay;
use chatrelay_transport::{
    TransportEvent, TransportReceiver, TransportSender, WebSocketClient, WebSocketClientSender,
    WebSocketReceiver,
};
use std::time::Duration;
use tokio::time::timeout;
use tower::ServiceExt;

async fn join(relay: &TestRelay, expected_clients: usize) -> (WebSocketClientSender, WebSocketReceiver) {
    let pair = WebSocketClient::connect(&relay.ws_url()).await.unwrap();
    assert!(relay.wait_for_clients(expected_clients).await);
    pair
}

async fn next_data(receiver: &mut WebSocketReceiver) -> Option<Bytes> {
    loop {
        match timeout(Duration::from_secs(2), receiver.recv()).await {
            Ok(Some(TransportEvent::Data(data))) => return Some(data),
            Ok(Some(TransportEvent::Connected)) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_websocket_broadcast() {
    let relay = TestRelay::start().await;
    let (mut alice, mut alice_rx) = join(&relay, 1).await;
    let (_bob, mut bob_rx) = join(&relay, 2).await;

    alice.send(encode_frame(b"hi bob").unwrap()).await.unwrap();

    assert_eq!(next_data(&mut bob_rx).await.unwrap(), Bytes::from_static(b"hi bob"));
    assert_eq!(next_data(&mut alice_rx).await.unwrap(), Bytes::from_static(b"hi bob"));

    assert!(relay.wait_for_log_lines(1).await);
    let line = &relay.log.lines()[0];
    // Key is the peer address as the server saw it
    assert!(line.starts_with("127.0.0.1:"), "unexpected log line {:?}", line);
    assert!(line.ends_with(": hi bob"));
}

#[tokio::test]
async fn test_websocket_disconnect_deregisters() {
    let relay = TestRelay::start().await;
    let (mut alice, _alice_rx) = join(&relay, 1).await;
    let (_bob, _bob_rx) = join(&relay, 2).await;

    alice.close().await.unwrap();
    assert!(relay.wait_for_clients(1).await);
}

#[tokio::test]
async fn test_websocket_bad_frame_isolated() {
    let relay = TestRelay::start().await;
    let (mut bad, _bad_rx) = join(&relay, 1).await;
    let (mut good, mut good_rx) = join(&relay, 2).await;

    bad.send(Bytes::from_static(b"00000")).await.unwrap();
    assert!(relay.wait_for_clients(1).await);

    good.send(encode_frame(b"still fine").unwrap()).await.unwrap();
    assert_eq!(
        next_data(&mut good_rx).await.unwrap(),
        Bytes::from_static(b"still fine")
    );
}

#[tokio::test]
async fn test_index_page_served() {
    let relay = TestRelay::start().await;
    let app = build_app(relay.router.clone(), relay.static_dir.path());

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"<html>chat</html>");
}

#[tokio::test]
async fn test_index_script_served() {
    let relay = TestRelay::start().await;
    let app = build_app(relay.router.clone(), relay.static_dir.path());

    let response = app
        .oneshot(Request::builder().uri("/index.js").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"// chat client");
}

#[tokio::test]
async fn test_missing_static_dir_yields_server_error() {
    let (router, _task) = Router::new(MemoryLogSink::new()).spawn(&RouterConfig::default());
    let app = build_app(router, "/nonexistent/chatrelay/static");

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], STATIC_ERROR_BODY.as_bytes());
}

#[tokio::test]
async fn test_unknown_route_not_found() {
    let (router, _task) = Router::new(MemoryLogSink::new()).spawn(&RouterConfig::default());
    let app = build_app(router, ".");

    let response = app
        .oneshot(Request::builder().uri("/secret.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
