//! Persistent control connection to a receiver

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, watch};

use super::stats::ConnectionStats;
use crate::error::AirPlayError;
use crate::protocol::body::{self, DecodedBody, RequestBody};
use crate::protocol::http::headers::names;
use crate::protocol::http::{HttpCodec, HttpRequest, HttpResponse, Method, StatusCode};
use crate::protocol::plist::PlistValue;
use crate::types::ClientConfig;

/// Outcome of a control request that reached the device
///
/// A non-200 status does not discard the body: `error` is set and `body`
/// still holds whatever the device sent, decoded.
#[derive(Debug)]
pub struct Reply {
    /// Response status
    pub status: StatusCode,
    /// Declared `Content-Type`
    pub content_type: Option<String>,
    /// Body decoded by content type
    pub body: DecodedBody,
    /// Set when the status was anything but `200 OK`
    pub error: Option<AirPlayError>,
}

impl Reply {
    /// Whether the device answered `200 OK`
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The body, or the status error if there was one
    ///
    /// # Errors
    ///
    /// Returns `AirPlayError::UnexpectedStatus` for a non-200 reply.
    pub fn into_result(self) -> Result<DecodedBody, AirPlayError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.body),
        }
    }

    /// The decoded property-list document, if the body was one
    #[must_use]
    pub fn document(&self) -> Option<&PlistValue> {
        self.body.as_document()
    }
}

/// An open control socket and its response parser
struct Connection {
    stream: TcpStream,
    codec: HttpCodec,
}

/// Owns the single control connection to the device
///
/// The socket is opened on first use and reused for every request. The
/// lock is held from writing a request until its response is read, so
/// requests go out one at a time and answers cannot interleave.
pub struct ConnectionManager {
    host: String,
    config: ClientConfig,
    stream: Mutex<Option<Connection>>,
    stats: RwLock<ConnectionStats>,
    /// Flips to `true` once; wakes any request blocked on the socket
    destroyed: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Create a manager for `host`; nothing is dialled until the first request
    #[must_use]
    pub fn new(host: impl Into<String>, config: ClientConfig) -> Self {
        let (destroyed, _) = watch::channel(false);
        Self {
            host: host.into(),
            config,
            stream: Mutex::new(None),
            stats: RwLock::new(ConnectionStats::default()),
            destroyed,
        }
    }

    /// `host:port` of the device
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.config.port)
    }

    /// Device host name or address
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get connection statistics
    pub async fn stats(&self) -> ConnectionStats {
        self.stats.read().await.clone()
    }

    /// Whether [`destroy`](Self::destroy) has been called
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    /// Whether a control socket is currently open
    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Send one request and wait for its reply
    ///
    /// # Errors
    ///
    /// Returns an error only when no reply was obtained: the socket could not
    /// be opened, failed mid-exchange, or the manager was destroyed. A reply
    /// with a non-200 status is `Ok` with [`Reply::error`] set.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<Reply, AirPlayError> {
        if self.is_destroyed() {
            return Err(AirPlayError::ClientDestroyed);
        }

        let encoded = body::encode(body)?;
        let mut builder = HttpRequest::builder(method, path)
            .host(&self.host, self.config.port)
            .user_agent(&self.config.user_agent);
        if let Some(content_type) = encoded.content_type {
            builder = builder.content_type(content_type);
        }
        let request = builder.body(encoded.bytes).build();

        let mut slot = self.stream.lock().await;
        let mut destroyed = self.destroyed.subscribe();

        let outcome = tokio::select! {
            result = self.exchange(&mut slot, &request) => result,
            _ = destroyed.wait_for(|d| *d) => Err(AirPlayError::ClientDestroyed),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                // Whatever was half-sent or half-read makes the socket unusable
                *slot = None;
                return Err(e);
            }
        };

        if response
            .headers
            .get(names::CONNECTION)
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
        {
            tracing::debug!("Device closed control connection after {}", path);
            *slot = None;
        }
        drop(slot);

        Ok(self.make_reply(path, response))
    }

    /// Open the socket if needed, write the request and read one response
    async fn exchange(
        &self,
        slot: &mut Option<Connection>,
        request: &HttpRequest,
    ) -> Result<HttpResponse, AirPlayError> {
        let conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };
        let conn = slot.insert(conn);

        let encoded = request.encode();
        if self.config.debug_protocol {
            tracing::debug!(
                ">> Sending HTTP request:\n{}",
                String::from_utf8_lossy(&encoded[..encoded.len() - request.body.len()]).trim()
            );
        } else {
            tracing::debug!(
                ">> Sending {} {} ({} byte body)",
                request.method,
                request.path,
                request.body.len()
            );
        }

        conn.codec.reset();
        conn.stream.write_all(&encoded).await?;
        conn.stream.flush().await?;
        self.stats.write().await.record_sent(encoded.len());

        let mut buf = vec![0u8; 4096];
        loop {
            if let Some(response) = conn.codec.decode()? {
                tracing::debug!(
                    "<< Received {} for {} ({} bytes)",
                    response.status,
                    request.path,
                    response.body.len()
                );
                return Ok(response);
            }

            let n = conn.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(AirPlayError::Disconnected {
                    address: self.address(),
                });
            }
            if self.config.debug_protocol {
                tracing::debug!("<< Received HTTP data:\n{}", String::from_utf8_lossy(&buf[..n]).trim());
            }

            conn.codec.feed(&buf[..n])?;
            self.stats.write().await.record_received(n);
        }
    }

    async fn connect(&self) -> Result<Connection, AirPlayError> {
        let address = self.address();
        tracing::debug!("Connecting to {}", address);

        let stream = TcpStream::connect((self.host.as_str(), self.config.port))
            .await
            .map_err(|e| AirPlayError::ConnectionFailed {
                address: address.clone(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?;
        stream.set_nodelay(true)?;

        self.stats.write().await.record_connect();
        tracing::info!("Control connection established to {}", address);

        Ok(Connection {
            stream,
            codec: HttpCodec::new().with_max_size(self.config.max_body_size),
        })
    }

    fn make_reply(&self, path: &str, response: HttpResponse) -> Reply {
        let error = if response.is_ok() {
            None
        } else {
            tracing::warn!(
                "Unexpected response from {}: {} for {}",
                self.host,
                response.status,
                path
            );
            Some(AirPlayError::UnexpectedStatus {
                status: response.status.as_u16(),
                path: path.to_string(),
            })
        };

        let content_type = response.content_type().map(str::to_string);
        let body = body::decode(&response.body, content_type.as_deref());

        Reply {
            status: response.status,
            content_type,
            body,
            error,
        }
    }

    /// Close the control socket and refuse further requests
    ///
    /// A request blocked on the socket is woken and fails with
    /// `ClientDestroyed`. Calling this again is a no-op.
    pub fn destroy(&self) {
        if self.destroyed.send_replace(true) {
            return;
        }

        // If a request holds the lock it drops the socket itself on wake-up
        if let Ok(mut slot) = self.stream.try_lock() {
            slot.take();
        }
        tracing::info!("Control connection to {} destroyed", self.address());
    }
}
