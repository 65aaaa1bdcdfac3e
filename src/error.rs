use std::io;

use thiserror::Error;

use crate::protocol::http::{HttpCodecError, ParseError};
use crate::protocol::plist::{PlistDecodeError, PlistEncodeError, XmlPlistError};

/// Errors that can occur while driving an `AirPlay` receiver
#[derive(Debug, Error)]
pub enum AirPlayError {
    // ===== Connection Errors =====
    /// Failed to establish a connection to the device
    #[error("connection failed to {address}: {message}")]
    ConnectionFailed {
        /// `host:port` that was dialled
        address: String,
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection was closed by the device
    #[error("device disconnected: {address}")]
    Disconnected {
        /// `host:port` of the device
        address: String,
    },

    /// Network I/O error
    #[error("network error: {0}")]
    NetworkError(#[from] io::Error),

    // ===== Protocol Errors =====
    /// The device answered with something other than `200 OK`
    ///
    /// Carried in [`Reply::error`](crate::connection::Reply) alongside the
    /// decoded body rather than returned in its place.
    #[error("unexpected status {status} for {path}")]
    UnexpectedStatus {
        /// Status code returned by the device
        status: u16,
        /// Request path, including query string
        path: String,
    },

    /// The device refused to reverse the event connection
    #[error("reverse channel rejected with status {status}")]
    UpgradeRejected {
        /// Status code returned instead of `101`
        status: u16,
    },

    /// Message framing or body encoding failed
    #[error("codec error: {message}")]
    CodecError {
        /// Description of the error
        message: String,
    },

    // ===== State Errors =====
    /// The client has been destroyed, explicitly or by a `stopped` event
    #[error("client destroyed")]
    ClientDestroyed,

    /// Invalid parameter provided
    #[error("invalid parameter: {name} - {message}")]
    InvalidParameter {
        /// The name of the parameter
        name: String,
        /// Description of the error
        message: String,
    },
}

impl AirPlayError {
    /// Check if this error is recoverable by retrying
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::Disconnected { .. } | Self::UnexpectedStatus { .. }
        )
    }

    /// Check if this error indicates connection loss
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::ConnectionFailed { .. }
        )
    }

    /// Status code of an [`AirPlayError::UnexpectedStatus`]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } | Self::UpgradeRejected { status } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<HttpCodecError> for AirPlayError {
    fn from(e: HttpCodecError) -> Self {
        Self::CodecError {
            message: e.to_string(),
        }
    }
}

impl From<ParseError> for AirPlayError {
    fn from(e: ParseError) -> Self {
        Self::CodecError {
            message: e.to_string(),
        }
    }
}

impl From<PlistEncodeError> for AirPlayError {
    fn from(e: PlistEncodeError) -> Self {
        Self::CodecError {
            message: format!("plist encode: {e}"),
        }
    }
}

impl From<PlistDecodeError> for AirPlayError {
    fn from(e: PlistDecodeError) -> Self {
        Self::CodecError {
            message: format!("plist decode: {e}"),
        }
    }
}

impl From<XmlPlistError> for AirPlayError {
    fn from(e: XmlPlistError) -> Self {
        Self::CodecError {
            message: format!("xml plist: {e}"),
        }
    }
}

/// Result type alias for `AirPlay` operations
pub type Result<T> = std::result::Result<T, AirPlayError>;
