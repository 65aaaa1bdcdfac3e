//! Mock `AirPlay` video receiver for testing purposes.
//!
//! The mock serves the HTTP control protocol on a loopback port:
//!
//! - every control request is recorded and answered with a canned reply,
//!   or an empty `200 OK` when none was configured for its path
//! - `POST /reverse` is answered `101 Switching Protocols` and the socket is
//!   kept so tests can push events back to the client

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, RwLock, mpsc};

use crate::protocol::body::content_type;
use crate::protocol::http::headers::names;
use crate::protocol::http::{
    Headers, HttpCodec, HttpRequest, HttpResponse, Method, ResponseBuilder, ServerCodec,
    StatusCode,
};
use crate::protocol::plist::{self, PlistEncodeError, PlistValue};

/// Configuration for the mock device.
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// Port to listen on; `0` lets the OS pick one.
    pub port: u16,
    /// Status answered to `POST /reverse`; anything but `101` refuses it.
    pub reverse_status: StatusCode,
    /// Largest request body accepted.
    pub max_body_size: usize,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            port: 0,
            reverse_status: StatusCode::SWITCHING_PROTOCOLS,
            max_body_size: 1024 * 1024,
        }
    }
}

/// A control request as the device received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request method
    pub method: Method,
    /// Path including query string
    pub path: String,
    /// Request headers
    pub headers: Headers,
    /// Raw body
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Decode the body as a binary property list.
    #[must_use]
    pub fn plist_body(&self) -> Option<PlistValue> {
        plist::decode(&self.body).ok()
    }
}

/// A reply the mock sends for a given path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedReply {
    /// Response status
    pub status: StatusCode,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

impl CannedReply {
    /// Empty reply with the given status.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status: StatusCode(status),
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Empty `200 OK`.
    #[must_use]
    pub fn ok() -> Self {
        Self::status(200)
    }

    /// Reply carrying a body of the given media type.
    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body.into();
        self
    }

    /// `200 OK` with a binary property list body.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded.
    pub fn plist(doc: &PlistValue) -> Result<Self, PlistEncodeError> {
        let body = plist::encode(doc)?;
        Ok(Self::ok().with_body(content_type::BINARY_PLIST, body))
    }

    /// `200 OK` with a `text/parameters` body.
    #[must_use]
    pub fn parameters(text: &str) -> Self {
        Self::ok().with_body(content_type::TEXT_PARAMETERS, text.as_bytes())
    }

    fn encode(&self) -> Vec<u8> {
        let builder = ResponseBuilder::new(self.status);
        match &self.content_type {
            Some(ct) => builder.body(self.body.clone(), ct).encode(),
            None => builder.encode(),
        }
    }
}

/// Internal state of the mock device.
#[derive(Default)]
struct DeviceState {
    /// Control requests in arrival order
    requests: Vec<RecordedRequest>,
    /// Replies by exact path, then by path without query
    replies: HashMap<String, CannedReply>,
    /// Number of `POST /reverse` requests received
    reverse_requests: usize,
    /// Number of accepted TCP connections
    connections: usize,
}

/// The socket the device pushes events on after the upgrade.
struct ReverseSocket {
    stream: TcpStream,
    codec: HttpCodec,
}

/// A mock `AirPlay` video receiver.
pub struct MockDevice {
    config: MockDeviceConfig,
    state: Arc<RwLock<DeviceState>>,
    reverse: Arc<Mutex<Option<ReverseSocket>>>,
    reverse_ready: Arc<Notify>,
    shutdown: Option<mpsc::Sender<()>>,
    address: Option<SocketAddr>,
}

impl MockDevice {
    /// Creates a new mock device with the given configuration.
    #[must_use]
    pub fn new(config: MockDeviceConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(DeviceState::default())),
            reverse: Arc::new(Mutex::new(None)),
            reverse_ready: Arc::new(Notify::new()),
            shutdown: None,
            address: None,
        }
    }

    /// Creates and starts a mock device on an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn spawn() -> io::Result<Self> {
        let mut device = Self::new(MockDeviceConfig::default());
        device.start().await?;
        Ok(device)
    }

    /// Starts accepting connections in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(&mut self) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(("127.0.0.1", self.config.port)).await?;
        let addr = listener.local_addr()?;
        self.address = Some(addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        self.shutdown = Some(shutdown_tx);

        let shared = Shared {
            config: self.config.clone(),
            state: self.state.clone(),
            reverse: self.reverse.clone(),
            reverse_ready: self.reverse_ready.clone(),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, _)) => {
                            let shared = shared.clone();
                            tokio::spawn(async move { shared.handle_connection(stream).await });
                        }
                        Err(e) => tracing::error!("Accept error: {}", e),
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(addr)
    }

    /// Stops accepting connections.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Address the mock listens on.
    #[must_use]
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Port the mock listens on, `0` before [`start`](Self::start).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.address.map_or(0, |a| a.port())
    }

    /// Answer `path` with `reply` from now on.
    ///
    /// `path` may include a query string; a reply registered without one
    /// matches every query on that path.
    pub async fn set_reply(&self, path: &str, reply: CannedReply) {
        self.state
            .write()
            .await
            .replies
            .insert(path.to_string(), reply);
    }

    /// Control requests received so far.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.read().await.requests.clone()
    }

    /// Most recent control request.
    pub async fn last_request(&self) -> Option<RecordedRequest> {
        self.state.read().await.requests.last().cloned()
    }

    /// Number of `POST /reverse` requests received.
    pub async fn reverse_requests(&self) -> usize {
        self.state.read().await.reverse_requests
    }

    /// Number of TCP connections accepted.
    pub async fn connections(&self) -> usize {
        self.state.read().await.connections
    }

    /// Whether a reversed socket is currently held.
    pub async fn has_reverse(&self) -> bool {
        self.reverse.lock().await.is_some()
    }

    /// Wait until a client has reversed a connection.
    pub async fn wait_for_reverse(&self) {
        loop {
            let notified = self.reverse_ready.notified();
            if self.has_reverse().await {
                return;
            }
            notified.await;
        }
    }

    /// Push `POST /event` to the client and return its response.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if no channel is reversed, or an I/O error if
    /// the client closed it.
    pub async fn push_event(
        &self,
        content_type: Option<&str>,
        body: &[u8],
    ) -> io::Result<HttpResponse> {
        self.push(Method::Post, "/event", content_type, body).await
    }

    /// Push `POST /event` with an XML plist body built from `doc`.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub async fn push_xml_event(&self, doc: &[(&str, &str)]) -> io::Result<HttpResponse> {
        let body = xml_plist(doc);
        self.push_event(Some(content_type::XML_PLIST), body.as_bytes())
            .await
    }

    /// Push an arbitrary request over the reversed socket.
    ///
    /// # Errors
    ///
    /// See [`push_event`](Self::push_event).
    pub async fn push(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> io::Result<HttpResponse> {
        let mut slot = self.reverse.lock().await;
        let socket = slot
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no reverse channel"))?;

        let mut builder = HttpRequest::builder(method, path)
            .header(names::X_APPLE_SESSION_ID, "00000000-0000-0000-0000-000000000000");
        if let Some(ct) = content_type {
            builder = builder.content_type(ct);
        }
        let request = builder.body(body.to_vec()).build();

        socket.stream.write_all(&request.encode()).await?;

        let mut buf = vec![0u8; 4096];
        loop {
            if let Some(response) = socket.codec.decode().map_err(io::Error::other)? {
                return Ok(response);
            }
            let n = socket.stream.read(&mut buf).await?;
            if n == 0 {
                slot.take();
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "client closed reverse channel",
                ));
            }
            socket.codec.feed(&buf[..n]).map_err(io::Error::other)?;
        }
    }

    /// Wait until the client closes the reversed socket.
    ///
    /// Returns immediately if there is none.
    pub async fn wait_reverse_closed(&self) {
        let mut slot = self.reverse.lock().await;
        if let Some(socket) = slot.as_mut() {
            let mut buf = [0u8; 256];
            while matches!(socket.stream.read(&mut buf).await, Ok(n) if n > 0) {}
        }
        slot.take();
    }
}

/// State shared with connection tasks.
#[derive(Clone)]
struct Shared {
    config: MockDeviceConfig,
    state: Arc<RwLock<DeviceState>>,
    reverse: Arc<Mutex<Option<ReverseSocket>>>,
    reverse_ready: Arc<Notify>,
}

impl Shared {
    /// Handles a single client connection.
    async fn handle_connection(self, mut stream: TcpStream) {
        self.state.write().await.connections += 1;

        let mut codec = ServerCodec::new(self.config.max_body_size);
        let mut buf = vec![0u8; 4096];

        loop {
            loop {
                match codec.decode() {
                    Ok(Some(request)) => {
                        if request.method == Method::Post && request.path == "/reverse" {
                            self.handle_reverse(stream).await;
                            return;
                        }
                        let reply = self.handle_request(request).await;
                        if stream.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Mock device dropping connection: {}", e);
                        return;
                    }
                }
            }

            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => codec.feed(&buf[..n]),
            }
        }
    }

    async fn handle_request(&self, request: HttpRequest) -> Vec<u8> {
        let mut state = self.state.write().await;

        let bare_path = request.path.split('?').next().unwrap_or_default();
        let reply = state
            .replies
            .get(&request.path)
            .or_else(|| state.replies.get(bare_path))
            .cloned()
            .unwrap_or_else(CannedReply::ok);

        state.requests.push(RecordedRequest {
            method: request.method,
            path: request.path,
            headers: request.headers,
            body: request.body,
        });

        reply.encode()
    }

    async fn handle_reverse(&self, mut stream: TcpStream) {
        self.state.write().await.reverse_requests += 1;

        let status = self.config.reverse_status;
        if status != StatusCode::SWITCHING_PROTOCOLS {
            let _ = stream.write_all(&ResponseBuilder::new(status).encode()).await;
            return;
        }

        // Held across the 101 so a push can never reach a replaced socket
        let mut slot = self.reverse.lock().await;

        let upgrade = ResponseBuilder::new(status)
            .header(names::UPGRADE, "PTTH/1.0")
            .header(names::CONNECTION, "Upgrade")
            .encode();
        if stream.write_all(&upgrade).await.is_err() {
            return;
        }

        // A newer reverse channel replaces the old one
        *slot = Some(ReverseSocket {
            stream,
            codec: HttpCodec::new(),
        });
        drop(slot);
        self.reverse_ready.notify_waiters();
    }
}

/// Render a flat string dictionary as an XML property list.
#[must_use]
pub fn xml_plist(entries: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
         \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n<dict>\n",
    );
    for (key, value) in entries {
        let _ = write!(
            xml,
            "  <key>{}</key>\n  <string>{}</string>\n",
            escape(key),
            escape(value)
        );
    }
    xml.push_str("</dict>\n</plist>\n");
    xml
}

fn escape(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}
