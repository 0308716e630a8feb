//! Receiver behavior against an in-process STOMP server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use zhmc_core::{Error, Secret};
use zhmc_stomp::{NotificationReceiver, StompCodec, StompConfig, StompFrame};

/// Minimal STOMP server: accepts one connection, answers the CONNECT
/// handshake, waits for `subscriptions` SUBSCRIBE frames, then plays the
/// scripted frames and keeps the connection open.
async fn spawn_server(
    reject_logon: bool,
    subscriptions: usize,
    script: Vec<StompFrame>,
) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(socket, StompCodec);

        let connect = framed.next().await.unwrap().unwrap();
        assert_eq!(connect.command, "CONNECT");
        if reject_logon {
            let error = StompFrame::new("ERROR")
                .with_header("message", "Authentication failed")
                .with_body(b"bad credentials".to_vec());
            framed.send(error).await.unwrap();
            return;
        }
        framed
            .send(StompFrame::new("CONNECTED").with_header("version", "1.2"))
            .await
            .unwrap();

        for _ in 0..subscriptions {
            let frame = framed.next().await.unwrap().unwrap();
            assert_eq!(frame.command, "SUBSCRIBE");
        }
        for frame in script {
            framed.send(frame).await.unwrap();
        }
        // Stay alive until the client disconnects.
        while let Some(Ok(frame)) = framed.next().await {
            if frame.command == "DISCONNECT" {
                break;
            }
        }
    });
    addr
}

fn config(addr: std::net::SocketAddr) -> StompConfig {
    StompConfig::new("127.0.0.1", "user", Secret::new("pw"))
        .with_port(addr.port())
        .without_tls()
        .with_topic("test.object-notifications")
}

fn message(kind: &str, body: serde_json::Value) -> StompFrame {
    StompFrame::new("MESSAGE")
        .with_header("destination", "/topic/test.object-notifications")
        .with_header("notification-type", kind)
        .with_header("object-uri", "/api/partitions/1")
        .with_header("class", "partition")
        .with_body(serde_json::to_vec(&body).unwrap())
}

#[tokio::test]
async fn notifications_arrive_in_order() {
    let script = vec![
        message("status-change", json!({"change-reports": [
            {"property-name": "status", "new-value": "active"}]})),
        message("property-change", json!({"change-reports": [
            {"property-name": "description", "new-value": "one"}]})),
        message("property-change", json!({"change-reports": [
            {"property-name": "description", "new-value": "two"}]})),
    ];
    let addr = spawn_server(false, 1, script).await;
    let mut receiver = NotificationReceiver::connect(config(addr)).await.unwrap();

    let kinds: Vec<String> = [
        receiver.recv().await.unwrap().unwrap(),
        receiver.recv().await.unwrap().unwrap(),
        receiver.recv().await.unwrap().unwrap(),
    ]
    .iter()
    .map(|n| n.header_str("notification-type").unwrap().to_string())
    .collect();
    assert_eq!(kinds, ["status-change", "property-change", "property-change"]);
    receiver.close().await;
}

#[tokio::test]
async fn jms_error_is_in_band_and_stream_continues() {
    let script = vec![
        StompFrame::new("ERROR")
            .with_header("message", "subscription limit reached")
            .with_body(b"{\"detail\": 42}".to_vec()),
        message("property-change", json!({"change-reports": []})),
    ];
    let addr = spawn_server(false, 1, script).await;
    let mut receiver = NotificationReceiver::connect(config(addr)).await.unwrap();

    match receiver.recv().await.unwrap() {
        Err(Error::NotificationJms { message, details }) => {
            assert_eq!(message, "subscription limit reached");
            assert_eq!(details, json!({"detail": 42}));
        }
        other => panic!("unexpected item: {other:?}"),
    }
    // The connection survived the error frame.
    assert!(receiver.recv().await.unwrap().is_ok());
    receiver.close().await;
}

#[tokio::test]
async fn malformed_body_is_in_band_parse_error() {
    let script = vec![
        StompFrame::new("MESSAGE")
            .with_header("destination", "/topic/test.object-notifications")
            .with_body(b"this is not json".to_vec()),
        message("property-change", json!({"change-reports": []})),
    ];
    let addr = spawn_server(false, 1, script).await;
    let mut receiver = NotificationReceiver::connect(config(addr)).await.unwrap();

    assert!(matches!(
        receiver.recv().await.unwrap(),
        Err(Error::NotificationParse(_))
    ));
    assert!(receiver.recv().await.unwrap().is_ok());
    receiver.close().await;
}

#[tokio::test]
async fn rejected_logon_is_server_auth() {
    let addr = spawn_server(true, 0, Vec::new()).await;
    let err = NotificationReceiver::connect(config(addr)).await.unwrap_err();
    match err {
        Error::ServerAuth { userid, detail, .. } => {
            assert_eq!(userid, "user");
            assert_eq!(detail, "Authentication failed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn close_is_idempotent_and_unblocks_recv() {
    let addr = spawn_server(false, 1, Vec::new()).await;
    let mut receiver = NotificationReceiver::connect(config(addr)).await.unwrap();

    receiver.close().await;
    receiver.close().await;

    let next = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("recv() must not hang after close()");
    assert!(next.is_none());
}

#[tokio::test]
async fn stream_adapter_yields_notifications() {
    let script = vec![message("property-change", json!({"change-reports": []}))];
    let addr = spawn_server(false, 1, script).await;
    let receiver = NotificationReceiver::connect(config(addr)).await.unwrap();

    let mut stream = receiver.into_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.header_str("notification-type"), Some("property-change"));
}
