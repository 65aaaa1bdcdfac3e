//! Sans-IO HTTP/1.1 framing for the `AirPlay` control protocol
//!
//! The control connection and the reverse event channel both carry plain
//! HTTP/1.1 messages delimited by `Content-Length`. Outbound requests are
//! encoded with [`HttpRequest::encode`] and their answers parsed with
//! [`HttpCodec`]; once a connection has been reversed, the device's pushes
//! are parsed with [`ServerCodec`] and answered with [`ResponseBuilder`].

pub mod codec;
pub mod headers;
pub mod request;
pub mod response;
pub mod server_codec;


use std::fmt;
use std::str::FromStr;

pub use codec::{HttpCodec, HttpCodecError};
pub use headers::Headers;
pub use request::{HttpRequest, HttpRequestBuilder};
pub use response::{HttpResponse, StatusCode};
pub use server_codec::{ParseError, ResponseBuilder, ServerCodec};

/// HTTP protocol version written on every outbound message
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// HTTP methods understood on either side of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read-only queries (`/server-info`, `/playback-info`, `/scrub`)
    Get,
    /// Commands, property reads, reverse-channel setup and device events
    Post,
    /// Property writes
    Put,
    /// Not used by the device, accepted so it can be rejected cleanly
    Delete,
    /// Not used by the device, accepted so it can be rejected cleanly
    Head,
    /// Not used by the device, accepted so it can be rejected cleanly
    Options,
}

impl Method {
    /// Wire form of the method
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
