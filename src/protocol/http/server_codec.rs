//! Parsing of requests pushed by the device over a reversed connection
//!
//! Once the reverse channel is upgraded the roles flip: the device sends
//! requests and the client answers them. This codec is the mirror image of
//! [`HttpCodec`](super::HttpCodec).

use std::str::{self, FromStr};

use bytes::{Buf, BytesMut};

use super::codec::find;
use super::headers::names;
use super::{HTTP_VERSION, Headers, HttpRequest, HttpResponse, Method, StatusCode};

/// Errors during request parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid request line: {0}")]
    InvalidRequestLine(String),

    /// The whole message was consumed; the stream is still in sync
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("body too large: {size} > {max}")]
    BodyTooLarge { size: usize, max: usize },

    #[error("invalid UTF-8 in headers")]
    InvalidUtf8,
}

impl ParseError {
    /// Whether parsing can continue with the next message
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ParseError::UnsupportedMethod(_))
    }
}

/// Maximum header section size (64 KB)
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Server-side HTTP codec
///
/// - `feed()` adds bytes to the internal buffer
/// - `decode()` attempts to parse one complete request
pub struct ServerCodec {
    buffer: BytesMut,
    max_body: usize,
}

impl ServerCodec {
    /// Create a new server codec accepting bodies up to `max_body` bytes
    #[must_use]
    pub fn new(max_body: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_body,
        }
    }

    /// Feed bytes into the internal buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get current buffer length
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Attempt to decode a complete request
    ///
    /// Returns `Ok(None)` while more data is needed.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the request is malformed. Only
    /// `UnsupportedMethod` leaves the buffer positioned at the next message.
    pub fn decode(&mut self) -> Result<Option<HttpRequest>, ParseError> {
        let Some(head_end) = find(&self.buffer, b"\r\n\r\n") else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return Err(ParseError::InvalidHeader("headers too large".into()));
            }
            return Ok(None);
        };

        let head = str::from_utf8(&self.buffer[..head_end]).map_err(|_| ParseError::InvalidUtf8)?;
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, path, version] = parts[..] else {
            return Err(ParseError::InvalidRequestLine(request_line.to_string()));
        };
        if !version.starts_with("HTTP/") {
            return Err(ParseError::InvalidRequestLine(request_line.to_string()));
        }

        let headers = Headers::parse_lines(lines)
            .map_err(|line| ParseError::InvalidHeader(line.to_string()))?;

        let content_length = headers
            .get(names::CONTENT_LENGTH)
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .map_err(|e| ParseError::InvalidContentLength(e.to_string()))?
            .unwrap_or(0);

        if content_length > self.max_body {
            return Err(ParseError::BodyTooLarge {
                size: content_length,
                max: self.max_body,
            });
        }

        let total = head_end + 4 + content_length;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let method = Method::from_str(method).map_err(|()| method.to_string());
        let path = path.to_string();

        self.buffer.advance(head_end + 4);
        let body = self.buffer.split_to(content_length).to_vec();

        match method {
            Ok(method) => Ok(Some(HttpRequest {
                method,
                path,
                headers,
                body,
            })),
            Err(name) => Err(ParseError::UnsupportedMethod(name)),
        }
    }
}

/// Builder for responses written back over the reversed connection
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Create a new response builder with the given status
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Create an OK (200) response
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Create a Not Found (404) response
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// Add a custom header
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a body with its media type
    #[must_use]
    pub fn body(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.body = body;
        self.headers.insert(names::CONTENT_TYPE, content_type);
        self
    }

    /// Build into an `HttpResponse`; `Content-Length` is always set
    #[must_use]
    pub fn build(mut self) -> HttpResponse {
        self.headers
            .insert(names::CONTENT_LENGTH, self.body.len().to_string());

        HttpResponse {
            version: HTTP_VERSION.to_string(),
            status: self.status,
            reason: self.status.reason().to_string(),
            headers: self.headers,
            body: self.body,
        }
    }

    /// Encode directly to bytes
    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        self.build().encode()
    }
}
