//! Reverse event channel
//!
//! The client dials the device and asks it, with `POST /reverse` and an
//! `Upgrade: PTTH/1.0` header, to turn the connection around. After the
//! `101 Switching Protocols` answer the device is the one sending requests,
//! and the client serves them:
//!
//! - `POST /event` is acknowledged with an empty `200`, then decoded and
//!   handed to the event callback
//! - any other request gets an empty `404` and the channel stays open

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AirPlayError;
use crate::protocol::body;
use crate::protocol::http::headers::names;
use crate::protocol::http::{
    HttpCodec, HttpRequest, Method, ParseError, ResponseBuilder, ServerCodec, StatusCode,
};
use crate::state::DeviceEvent;
use crate::types::ClientConfig;

/// Path the device pushes events to
pub const EVENT_PATH: &str = "/event";

/// Path that asks the device to reverse the connection
pub const REVERSE_PATH: &str = "/reverse";

/// Callback receiving every accepted event
pub type EventSink = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// A running reverse channel
///
/// Dropping the handle closes the channel the same way
/// [`close`](Self::close) does.
pub struct ReverseChannel {
    address: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReverseChannel {
    /// Dial the device, perform the upgrade and start listening for pushes
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the device cannot be reached and
    /// `UpgradeRejected` if it answers anything but `101`.
    pub async fn open(
        host: &str,
        config: &ClientConfig,
        on_event: EventSink,
    ) -> Result<Self, AirPlayError> {
        let address = format!("{}:{}", host, config.port);
        debug!("Opening reverse channel to {}", address);

        let mut stream = TcpStream::connect((host, config.port))
            .await
            .map_err(|e| AirPlayError::ConnectionFailed {
                address: address.clone(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;
        stream.set_nodelay(true)?;

        let leftover = upgrade(&mut stream, host, config).await?;

        let mut codec = ServerCodec::new(config.max_body_size);
        codec.feed(&leftover);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listen(
            stream,
            codec,
            shutdown_rx,
            on_event,
            address.clone(),
        ));

        info!("Reverse channel established with {}", address);
        Ok(Self {
            address,
            shutdown,
            task,
        })
    }

    /// Stop listening and close the socket once the current push is handled
    pub fn close(&self) {
        if !self.shutdown.send_replace(true) {
            debug!("Closing reverse channel to {}", self.address);
        }
    }

    /// Tear the listener down immediately
    pub fn destroy(&self) {
        self.shutdown.send_replace(true);
        self.task.abort();
    }

    /// Whether the listener has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Send `POST /reverse` and wait for `101`
///
/// Returns any bytes the device sent after the upgrade response; they
/// already belong to the first pushed request.
async fn upgrade(
    stream: &mut TcpStream,
    host: &str,
    config: &ClientConfig,
) -> Result<Vec<u8>, AirPlayError> {
    let request = HttpRequest::builder(Method::Post, REVERSE_PATH)
        .host(host, config.port)
        .header(names::UPGRADE, "PTTH/1.0")
        .header(names::CONNECTION, "Upgrade")
        .header(names::X_APPLE_PURPOSE, "event")
        .user_agent(&config.user_agent)
        .build();

    debug!(">> Sending POST {}", REVERSE_PATH);
    stream.write_all(&request.encode()).await?;
    stream.flush().await?;

    let mut codec = HttpCodec::new();
    let mut buf = [0u8; 1024];
    let response = loop {
        if let Some(response) = codec.decode()? {
            break response;
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(AirPlayError::Disconnected {
                address: format!("{}:{}", host, config.port),
            });
        }
        codec.feed(&buf[..n])?;
    };

    debug!("<< Received {} for {}", response.status, REVERSE_PATH);
    if response.status != StatusCode::SWITCHING_PROTOCOLS {
        return Err(AirPlayError::UpgradeRejected {
            status: response.status.as_u16(),
        });
    }

    Ok(codec.take_remaining())
}

async fn listen(
    mut stream: TcpStream,
    mut codec: ServerCodec,
    mut shutdown: watch::Receiver<bool>,
    on_event: EventSink,
    address: String,
) {
    let mut buf = vec![0u8; 4096];

    loop {
        loop {
            match codec.decode() {
                Ok(Some(request)) => {
                    if let Err(e) = serve(&mut stream, request, &on_event).await {
                        warn!("Reverse channel write failed: {}", e);
                        return;
                    }
                }
                Ok(None) => break,
                Err(e @ ParseError::UnsupportedMethod(_)) => {
                    warn!("Rejecting push from {}: {}", address, e);
                    if let Err(e) = stream.write_all(&ResponseBuilder::not_found().encode()).await {
                        warn!("Reverse channel write failed: {}", e);
                        return;
                    }
                }
                Err(e) => {
                    warn!("Dropping reverse channel to {}: {}", address, e);
                    return;
                }
            }
        }

        tokio::select! {
            _ = shutdown.wait_for(|closed| *closed) => {
                info!("Reverse channel to {} closed", address);
                return;
            }
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    info!("Device closed reverse channel {}", address);
                    return;
                }
                Ok(n) => codec.feed(&buf[..n]),
                Err(e) => {
                    warn!("Reverse channel read failed: {}", e);
                    return;
                }
            },
        }
    }
}

/// Answer one pushed request, then deliver it if it was an event
async fn serve(
    stream: &mut TcpStream,
    request: HttpRequest,
    on_event: &EventSink,
) -> std::io::Result<()> {
    if request.method != Method::Post || request.path != EVENT_PATH {
        warn!(
            "Rejecting push {} {}: only POST {} is served",
            request.method, request.path, EVENT_PATH
        );
        stream.write_all(&ResponseBuilder::not_found().encode()).await?;
        return Ok(());
    }

    // Acknowledged before decoding; a bad body still gets 200
    stream.write_all(&ResponseBuilder::ok().encode()).await?;

    let content_type = request.headers.content_type().map(str::to_string);
    debug!(
        "<< Received event ({}, {} bytes)",
        content_type.as_deref().unwrap_or("no content type"),
        request.body.len()
    );

    let payload = body::decode_event(&request.body, content_type.as_deref());
    on_event(DeviceEvent {
        content_type,
        raw: request.body,
        payload,
    });
    Ok(())
}
