use std::sync::{Arc, Mutex};
use std::time::Duration;

use airplay_video::protocol::body::content_type;
use airplay_video::protocol::http::{Method, StatusCode};
use airplay_video::testing::MockDevice;
use airplay_video::{AirPlayClient, AirPlayError, ClientConfig, DecodedBody, PlaybackState};
use tokio::time::timeout;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

async fn playing_client() -> (MockDevice, AirPlayClient) {
    let device = MockDevice::spawn().await.expect("Failed to start mock device");
    let config = ClientConfig::builder().port(device.port()).build();
    let client = AirPlayClient::with_config("127.0.0.1", config);

    client
        .play("http://example.com/movie.mp4", None)
        .await
        .expect("Play failed");
    timeout(Duration::from_secs(5), device.wait_for_reverse())
        .await
        .expect("Reverse channel never arrived");

    (device, client)
}

#[tokio::test]
async fn test_state_event_updates_state_and_notifies() {
    init_tracing();
    let (device, client) = playing_client().await;
    assert_eq!(client.state(), PlaybackState::UNKNOWN);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client.subscribe(move |event| {
        sink.lock().unwrap().push(event.state());
    });
    let mut events = client.events();

    let response = device
        .push_xml_event(&[("category", "video"), ("state", "playing")])
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("No event delivered")
        .unwrap();
    assert_eq!(event.category(), Some("video"));
    assert_eq!(event.state(), Some(PlaybackState::PLAYING));

    assert_eq!(client.state(), PlaybackState::PLAYING);
    assert_eq!(*seen.lock().unwrap(), vec![Some(PlaybackState::PLAYING)]);
    assert!(!client.is_destroyed());

    client.destroy();
}

#[tokio::test]
async fn test_stopped_event_destroys_client() {
    init_tracing();
    let (device, client) = playing_client().await;
    let mut events = client.events();

    let response = device
        .push_xml_event(&[("state", "stopped")])
        .await
        .unwrap();
    assert!(response.is_ok());

    // The event is delivered after the teardown
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("No event delivered")
        .unwrap();
    assert!(event.state().is_some_and(|s| s.is_stopped()));
    assert!(client.is_destroyed());
    assert_eq!(client.state(), PlaybackState::STOPPED);

    assert!(matches!(
        client.playback_info().await,
        Err(AirPlayError::ClientDestroyed)
    ));

    timeout(Duration::from_secs(5), device.wait_reverse_closed())
        .await
        .expect("Reverse channel still open");
}

#[tokio::test]
async fn test_unknown_push_gets_404_and_channel_survives() {
    init_tracing();
    let (device, client) = playing_client().await;
    let mut events = client.events();

    let response = device
        .push(Method::Post, "/events", None, b"")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());

    let response = device.push(Method::Get, "/event", None, b"").await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = device
        .push(Method::Delete, "/event", None, b"")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    // Still serving
    device
        .push_xml_event(&[("state", "paused")])
        .await
        .unwrap();
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.state(), Some(PlaybackState::PAUSED));
    assert!(client.has_reverse_channel());

    client.destroy();
}

#[tokio::test]
async fn test_non_xml_event_is_passed_through_raw() {
    init_tracing();
    let (device, client) = playing_client().await;
    let mut events = client.events();

    let response = device
        .push_event(Some(content_type::BINARY_PLIST), b"bplist00 not really")
        .await
        .unwrap();
    assert!(response.is_ok());

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.payload, DecodedBody::Raw(b"bplist00 not really".to_vec()));
    assert_eq!(event.state(), None);
    assert_eq!(client.state(), PlaybackState::UNKNOWN);

    client.destroy();
}

#[tokio::test]
async fn test_malformed_xml_event_is_still_acknowledged() {
    init_tracing();
    let (device, client) = playing_client().await;
    let mut events = client.events();

    let response = device
        .push_event(Some(content_type::APPLE_PLIST), b"<plist><dict><key>")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.payload.as_raw().is_some());

    client.destroy();
}

#[tokio::test]
async fn test_close_keeps_control_usable() {
    init_tracing();
    let (device, client) = playing_client().await;

    client.close();
    timeout(Duration::from_secs(5), device.wait_reverse_closed())
        .await
        .expect("Reverse channel still open");
    assert!(!client.has_reverse_channel());

    client.stop().await.unwrap();
    assert!(!client.is_destroyed());
    assert_eq!(device.requests().await.last().unwrap().path, "/stop");
}

#[tokio::test]
async fn test_play_replaces_reverse_channel() {
    init_tracing();
    let (device, client) = playing_client().await;

    client
        .play("http://example.com/other.mp4", Some(2.5))
        .await
        .unwrap();
    assert_eq!(device.reverse_requests().await, 2);

    let mut events = client.events();
    device
        .push_xml_event(&[("state", "loading")])
        .await
        .unwrap();
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.state(), Some(PlaybackState::LOADING));

    let plays: Vec<_> = device
        .requests()
        .await
        .into_iter()
        .filter(|r| r.path == "/play")
        .collect();
    assert_eq!(plays.len(), 2);

    client.destroy();
}
