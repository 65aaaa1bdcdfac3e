use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::connection::{ConnectionManager, ConnectionStats, Reply, ReverseChannel};
use crate::error::AirPlayError;
use crate::protocol::body::{DecodedBody, RequestBody};
use crate::protocol::http::{Method, StatusCode};
use crate::state::DeviceEvent;
use crate::types::ClientConfig;

/// Accept one connection, read one request head and answer with `response`
async fn one_shot_server(response: &'static [u8]) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response).await.unwrap();
        received
    });

    (port, handle)
}

fn config(port: u16) -> ClientConfig {
    ClientConfig::builder().port(port).build()
}

#[test]
fn test_reply_into_result() {
    let ok = Reply {
        status: StatusCode::OK,
        content_type: None,
        body: DecodedBody::Raw(Vec::new()),
        error: None,
    };
    assert!(ok.is_ok());
    assert!(ok.into_result().is_ok());

    let failed = Reply {
        status: StatusCode::NOT_FOUND,
        content_type: None,
        body: DecodedBody::Raw(b"gone".to_vec()),
        error: Some(AirPlayError::UnexpectedStatus {
            status: 404,
            path: "/stop".into(),
        }),
    };
    assert!(!failed.is_ok());
    assert_eq!(failed.into_result().unwrap_err().status(), Some(404));
}

#[test]
fn test_stats_counters() {
    let mut stats = ConnectionStats::default();
    stats.record_sent(100);
    stats.record_received(200);
    stats.record_connect();

    assert_eq!(stats.requests_sent, 1);
    assert_eq!(stats.bytes_sent, 100);
    assert_eq!(stats.bytes_received, 200);
    assert_eq!(stats.connects, 1);
    assert!(stats.uptime().is_some());
}

#[tokio::test]
async fn test_request_sends_identification_headers() {
    let (port, server) = one_shot_server(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/parameters\r\nContent-Length: 12\r\n\r\nposition: 3\n",
    )
    .await;
    let manager = ConnectionManager::new("127.0.0.1", config(port));

    let reply = manager
        .request(Method::Get, "/scrub", RequestBody::Empty)
        .await
        .unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.body.as_parameters().unwrap()["position"], 3.0);

    let sent = String::from_utf8(server.await.unwrap()).unwrap();
    assert!(sent.starts_with("GET /scrub HTTP/1.1\r\n"));
    assert!(sent.contains("User-Agent: iTunes/11.0.2\r\n"));
    assert!(sent.contains("Content-Length: 0\r\n"));

    let stats = manager.stats().await;
    assert_eq!(stats.requests_sent, 1);
    assert_eq!(stats.connects, 1);
}

#[tokio::test]
async fn test_non_200_keeps_body() {
    let (port, _server) = one_shot_server(
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/parameters\r\nContent-Length: 9\r\n\r\nrate: 0\n\n",
    )
    .await;
    let manager = ConnectionManager::new("127.0.0.1", config(port));

    let reply = manager
        .request(Method::Post, "/rate?value=0", RequestBody::Empty)
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::INTERNAL_ERROR);
    assert!(matches!(
        reply.error,
        Some(AirPlayError::UnexpectedStatus { status: 500, ref path }) if path == "/rate?value=0"
    ));
    assert_eq!(reply.body.as_parameters().unwrap()["rate"], 0.0);
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to find a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let manager = ConnectionManager::new("127.0.0.1", config(port));

    let err = manager
        .request(Method::Get, "/server-info", RequestBody::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, AirPlayError::ConnectionFailed { .. }));
    assert!(err.is_connection_lost());
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_device_hangs_up() {
    let (port, _server) = one_shot_server(b"").await;
    let manager = ConnectionManager::new("127.0.0.1", config(port));

    let err = manager
        .request(Method::Post, "/stop", RequestBody::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, AirPlayError::Disconnected { .. }));
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_destroyed_manager_fails_fast() {
    let manager = ConnectionManager::new("127.0.0.1", config(1));
    manager.destroy();
    manager.destroy();

    assert!(manager.is_destroyed());
    let err = manager
        .request(Method::Post, "/stop", RequestBody::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, AirPlayError::ClientDestroyed));
}

#[tokio::test]
async fn test_destroy_wakes_pending_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();

    // Read the request and never answer
    let _server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = accepted_tx.send(());
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    });

    let manager = Arc::new(ConnectionManager::new("127.0.0.1", config(port)));
    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .request(Method::Get, "/playback-info", RequestBody::Empty)
                .await
        })
    };

    accepted_rx.await.unwrap();
    manager.destroy();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(AirPlayError::ClientDestroyed)));
    assert!(!manager.is_connected().await);
}

#[tokio::test]
async fn test_reverse_upgrade_rejected() {
    let (port, _server) =
        one_shot_server(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n").await;

    let sink = Arc::new(|_: DeviceEvent| {});
    let err = ReverseChannel::open("127.0.0.1", &config(port), sink)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AirPlayError::UpgradeRejected { status: 403 }));
}

#[tokio::test]
async fn test_reverse_handshake_and_first_push() {
    // Upgrade answer and the first push arrive in the same segment
    let (port, server) = one_shot_server(
        b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: PTTH/1.0\r\nConnection: Upgrade\r\n\r\n\
          POST /event HTTP/1.1\r\nContent-Type: application/octet-stream\r\nContent-Length: 3\r\n\r\nabc",
    )
    .await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = events.clone();
        Arc::new(move |event: DeviceEvent| events.lock().unwrap().push(event))
    };

    let channel = ReverseChannel::open("127.0.0.1", &config(port), sink)
        .await
        .unwrap();

    let sent = String::from_utf8(server.await.unwrap()).unwrap();
    assert!(sent.starts_with("POST /reverse HTTP/1.1\r\n"));
    assert!(sent.contains("Upgrade: PTTH/1.0\r\n"));
    assert!(sent.contains("Connection: Upgrade\r\n"));
    assert!(sent.contains("X-Apple-Purpose: event\r\n"));
    assert!(sent.contains("User-Agent: iTunes/11.0.2\r\n"));

    for _ in 0..100 {
        if !events.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, DecodedBody::Raw(b"abc".to_vec()));
    drop(events);

    channel.close();
    channel.close();
}
