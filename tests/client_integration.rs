use std::time::Duration;

use airplay_video::protocol::body::content_type;
use airplay_video::protocol::http::{Method, StatusCode};
use airplay_video::protocol::plist::{DictBuilder, PlistValue};
use airplay_video::testing::{CannedReply, MockDevice};
use airplay_video::types::ServerInfo;
use airplay_video::{AirPlayClient, AirPlayError, ClientConfig, PlaybackInfo, plist_dict};
use tokio::time::timeout;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn client_for(device: &MockDevice) -> AirPlayClient {
    let config = ClientConfig::builder().port(device.port()).build();
    AirPlayClient::with_config("127.0.0.1", config)
}

#[tokio::test]
async fn test_play_opens_reverse_channel_then_posts_play() {
    init_tracing();
    let device = MockDevice::spawn().await.expect("Failed to start mock device");
    let client = client_for(&device);

    let reply = timeout(
        Duration::from_secs(5),
        client.play("http://example.com/movie.mp4", Some(10.0)),
    )
    .await
    .expect("Play timed out")
    .expect("Play failed");
    assert!(reply.is_ok());

    assert_eq!(device.reverse_requests().await, 1);
    assert!(client.has_reverse_channel());

    let requests = device.requests().await;
    assert_eq!(requests.len(), 1);
    let play = &requests[0];
    assert_eq!(play.method, Method::Post);
    assert_eq!(play.path, "/play");
    assert_eq!(play.headers.get("user-agent"), Some("iTunes/11.0.2"));
    assert_eq!(
        play.headers.content_type(),
        Some(content_type::BINARY_PLIST)
    );

    let body = play.plist_body().expect("Play body should be a binary plist");
    assert_eq!(
        body.get("Content-Location").and_then(PlistValue::as_str),
        Some("http://example.com/movie.mp4")
    );
    assert_eq!(
        body.get("Start-Position").and_then(PlistValue::as_f64),
        Some(10.0)
    );

    client.destroy();
}

#[tokio::test]
async fn test_control_requests_share_one_connection() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let client = client_for(&device);

    client.scrub(None).await.unwrap();
    client.scrub(Some(42.5)).await.unwrap();
    client.rate(0.5).await.unwrap();
    client.pause().await.unwrap();
    client.resume().await.unwrap();
    client.stop().await.unwrap();

    let paths: Vec<(Method, String)> = device
        .requests()
        .await
        .into_iter()
        .map(|r| (r.method, r.path))
        .collect();
    assert_eq!(
        paths,
        vec![
            (Method::Get, "/scrub".to_string()),
            (Method::Post, "/scrub?position=42.5".to_string()),
            (Method::Post, "/rate?value=0.5".to_string()),
            (Method::Post, "/rate?value=0".to_string()),
            (Method::Post, "/rate?value=1".to_string()),
            (Method::Post, "/stop".to_string()),
        ]
    );

    assert_eq!(device.connections().await, 1);
    let stats = client.stats().await;
    assert_eq!(stats.requests_sent, 6);
    assert_eq!(stats.connects, 1);
}

#[tokio::test]
async fn test_property_verbs() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let client = client_for(&device);

    client.get_property("playbackAccessLog").await.unwrap();
    client
        .set_property(
            "forwardEndTime",
            DictBuilder::new().insert("value", 120.0).into_map(),
        )
        .await
        .unwrap();
    client.set_property("volume", 0.5).await.unwrap();

    let requests = device.requests().await;
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].path, "/getProperty?playbackAccessLog");
    assert!(requests[0].body.is_empty());

    assert_eq!(requests[1].method, Method::Put);
    assert_eq!(requests[1].path, "/setProperty?forwardEndTime");
    assert_eq!(
        requests[1]
            .plist_body()
            .and_then(|b| b.get("value").and_then(PlistValue::as_f64)),
        Some(120.0)
    );

    assert_eq!(requests[2].path, "/setProperty?volume");
    assert_eq!(
        requests[2]
            .plist_body()
            .and_then(|b| b.get("value").and_then(PlistValue::as_f64)),
        Some(0.5)
    );
}

#[tokio::test]
async fn test_string_property_is_sent_as_text_parameters() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let client = client_for(&device);

    client
        .set_property("selectedMediaArray", "index: 2\n")
        .await
        .unwrap();

    let request = device.last_request().await.unwrap();
    assert_eq!(request.path, "/setProperty?selectedMediaArray");
    assert_eq!(
        request.headers.content_type(),
        Some(content_type::TEXT_PARAMETERS)
    );
    assert_eq!(request.body, b"index: 2\n");
}

#[tokio::test]
async fn test_malformed_property_name_is_never_sent() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let client = client_for(&device);

    for name in ["", "volume?x=1", "a&b", "two words", "../stop"] {
        let err = client.get_property(name).await.unwrap_err();
        assert!(
            matches!(&err, AirPlayError::InvalidParameter { name: field, .. } if field == "name"),
            "{err}"
        );
    }
    assert!(matches!(
        client.set_property("vol#ume", 0.5).await,
        Err(AirPlayError::InvalidParameter { .. })
    ));

    assert!(device.requests().await.is_empty());
    assert_eq!(device.connections().await, 0);
}

#[tokio::test]
async fn test_scrub_reply_is_parsed_as_parameters() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    device
        .set_reply(
            "/scrub",
            CannedReply::parameters("duration: 3600.5\r\nposition: 12.25\r\n"),
        )
        .await;
    let client = client_for(&device);

    let reply = client.scrub(None).await.unwrap();
    let params = reply.body.as_parameters().expect("Expected parameters");
    assert_eq!(params.get("duration"), Some(&3600.5));
    assert_eq!(params.get("position"), Some(&12.25));

    let position = airplay_video::ScrubPosition::from_parameters(params);
    assert_eq!(position.position, Some(12.25));
}

#[tokio::test]
async fn test_playback_info_document() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let doc = plist_dict! {
        "duration" => 600.0,
        "position" => 30.0,
        "rate" => 1.0,
        "readyToPlay" => true,
        "playbackBufferEmpty" => false,
        "playbackBufferFull" => true,
        "playbackLikelyToKeepUp" => true,
    };
    device
        .set_reply("/playback-info", CannedReply::plist(&doc).unwrap())
        .await;
    let client = client_for(&device);

    let reply = client.playback_info().await.unwrap();
    let info = PlaybackInfo::from_plist(reply.document().unwrap()).unwrap();
    assert_eq!(info.duration, Some(600.0));
    assert_eq!(info.position, Some(30.0));
    assert!(info.is_playing());
}

#[tokio::test]
async fn test_server_info_xml_document() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
  <key>deviceid</key><string>58:55:CA:1A:E2:88</string>
  <key>features</key><integer>14839</integer>
  <key>model</key><string>AppleTV2,1</string>
  <key>protovers</key><string>1.0</string>
  <key>srcvers</key><string>120.2</string>
</dict>
</plist>"#;
    device
        .set_reply(
            "/server-info",
            CannedReply::ok().with_body(content_type::XML_PLIST, xml),
        )
        .await;
    let client = client_for(&device);

    let reply = client.server_info().await.unwrap();
    let info = ServerInfo::from_plist(reply.document().unwrap()).unwrap();
    assert_eq!(info.model.as_deref(), Some("AppleTV2,1"));
    assert!(info.has_feature(0));
}

#[tokio::test]
async fn test_error_status_keeps_decoded_body() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let doc = plist_dict! { "errorCode" => -1i64 };
    let mut reply = CannedReply::plist(&doc).unwrap();
    reply.status = StatusCode::INTERNAL_ERROR;
    device.set_reply("/play", reply).await;
    let client = client_for(&device);

    let reply = client.play("http://example.com/a.mp4", None).await.unwrap();
    assert!(!reply.is_ok());
    assert_eq!(reply.status.as_u16(), 500);
    assert_eq!(
        reply.body.get("errorCode").and_then(PlistValue::as_i64),
        Some(-1)
    );

    match reply.into_result() {
        Err(AirPlayError::UnexpectedStatus { status, path }) => {
            assert_eq!(status, 500);
            assert_eq!(path, "/play");
        }
        other => panic!("Expected UnexpectedStatus, got {other:?}"),
    }

    client.destroy();
}

#[tokio::test]
async fn test_play_proceeds_when_reverse_is_refused() {
    init_tracing();
    let mut device = MockDevice::new(airplay_video::testing::MockDeviceConfig {
        reverse_status: StatusCode::FORBIDDEN,
        ..Default::default()
    });
    device.start().await.unwrap();
    let client = client_for(&device);

    let reply = client.play("http://example.com/a.mp4", None).await.unwrap();
    assert!(reply.is_ok());
    assert!(!client.has_reverse_channel());
    assert_eq!(device.requests().await.len(), 1);
}

#[tokio::test]
async fn test_unreachable_device_reports_connection_failure() {
    init_tracing();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = AirPlayClient::with_config("127.0.0.1", ClientConfig::builder().port(port).build());
    let err = client.stop().await.unwrap_err();
    assert!(err.is_connection_lost());
}

#[tokio::test]
async fn test_destroy_refuses_further_calls() {
    init_tracing();
    let device = MockDevice::spawn().await.unwrap();
    let client = client_for(&device);

    client.stop().await.unwrap();
    client.destroy();
    client.destroy();

    assert!(matches!(
        client.scrub(None).await,
        Err(AirPlayError::ClientDestroyed)
    ));
    assert_eq!(device.requests().await.len(), 1);
}
