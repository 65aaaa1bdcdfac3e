use bytes::{Buf, BytesMut};
use thiserror::Error;

use super::{Headers, HttpResponse, StatusCode};

/// Errors during response parsing
#[derive(Debug, Error)]
pub enum HttpCodecError {
    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Sans-IO parser for HTTP responses
///
/// Feed bytes with `feed()`, take complete responses with `decode()`. The
/// body is buffered whole before a response is returned; `Content-Length`
/// delimits it and a missing header means an empty body.
pub struct HttpCodec {
    buffer: BytesMut,
    max_size: usize,
    /// Status line and headers of a response whose body is still arriving
    pending: Option<Head>,
}

struct Head {
    version: String,
    status: StatusCode,
    reason: String,
    headers: Headers,
    content_length: usize,
}

impl HttpCodec {
    /// Create a new codec with a 16 MiB limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_size: 16 * 1024 * 1024,
            pending: None,
        }
    }

    /// Set maximum buffered response size
    #[must_use]
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Feed bytes into the codec
    ///
    /// # Errors
    ///
    /// Returns `HttpCodecError::ResponseTooLarge` if the buffer would exceed the limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), HttpCodecError> {
        let size = self.buffer.len() + bytes.len();
        if size > self.max_size {
            return Err(HttpCodecError::ResponseTooLarge { size });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Try to decode a complete response
    ///
    /// Returns `Ok(None)` while more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns `HttpCodecError` if the status line, headers or length are invalid.
    pub fn decode(&mut self) -> Result<Option<HttpResponse>, HttpCodecError> {
        if self.pending.is_none() {
            let Some(head_end) = find(&self.buffer, b"\r\n\r\n") else {
                return Ok(None);
            };

            let head = String::from_utf8_lossy(&self.buffer[..head_end]).into_owned();
            self.buffer.advance(head_end + 4);
            self.pending = Some(Self::parse_head(&head, self.max_size)?);
        }

        let buffered = self.buffer.len();
        if !self
            .pending
            .as_ref()
            .is_some_and(|head| buffered >= head.content_length)
        {
            return Ok(None);
        }
        let Some(head) = self.pending.take() else {
            return Ok(None);
        };
        let body = self.buffer.split_to(head.content_length).to_vec();

        Ok(Some(HttpResponse {
            version: head.version,
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body,
        }))
    }

    /// Bytes received past the last complete response
    ///
    /// After a protocol switch these belong to the new protocol.
    #[must_use]
    pub fn take_remaining(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    /// Clear the codec buffer and reset state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending = None;
    }

    /// Get current buffer length
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn parse_head(head: &str, max_size: usize) -> Result<Head, HttpCodecError> {
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();

        // "HTTP/1.1 200 OK"; the reason phrase may be absent
        let invalid = || HttpCodecError::InvalidStatusLine(status_line.to_string());
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().filter(|v| v.starts_with("HTTP/")).ok_or_else(invalid)?;
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(invalid)?;
        let reason = parts.next().unwrap_or_default();

        let headers = Headers::parse_lines(lines)
            .map_err(|line| HttpCodecError::InvalidHeader(line.to_string()))?;

        let content_length = match headers.get(super::headers::names::CONTENT_LENGTH) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpCodecError::InvalidContentLength)?,
            None => 0,
        };
        if content_length > max_size {
            return Err(HttpCodecError::ResponseTooLarge {
                size: content_length,
            });
        }

        Ok(Head {
            version: version.to_string(),
            status: StatusCode(status),
            reason: reason.to_string(),
            headers,
            content_length,
        })
    }
}

impl Default for HttpCodec {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
