//! Request templates for the control operations
//!
//! | Command | Method | Path | Body |
//! |---|---|---|---|
//! | `ServerInfo` | GET | `/server-info` | |
//! | `Play` | POST | `/play` | `{Content-Location, Start-Position}` |
//! | `Scrub(None)` | GET | `/scrub` | |
//! | `Scrub(Some(p))` | POST | `/scrub?position=p` | |
//! | `Rate(v)` | POST | `/rate?value=v` | |
//! | `Stop` | POST | `/stop` | |
//! | `PlaybackInfo` | GET | `/playback-info` | |
//! | `GetProperty(n)` | POST | `/getProperty?n` | |
//! | `SetProperty(n, v)` | PUT | `/setProperty?n` | `v` |
//!
//! Reading a property is a POST and writing one a PUT; the device expects
//! exactly this pairing.

use crate::error::AirPlayError;
use crate::protocol::body::{RequestBody, format_number};
use crate::protocol::http::Method;
use crate::protocol::plist::{DictBuilder, PlistValue};

/// A control operation, ready to be turned into one request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Device capabilities and identity
    ServerInfo,
    /// Start playing `url` at `position` seconds
    Play {
        /// Media URL the device will fetch
        url: String,
        /// Start offset in seconds
        position: f64,
    },
    /// Read the position (`None`) or seek to it (`Some`)
    Scrub(Option<f64>),
    /// Set the playback rate; `0` pauses, `1` plays
    Rate(f64),
    /// Stop playback
    Stop,
    /// Position, duration, rate and buffering state
    PlaybackInfo,
    /// Read a named property
    GetProperty(String),
    /// Write a named property
    SetProperty(String, RequestBody),
}

impl Command {
    /// `Play` starting at the beginning
    pub fn play(url: impl Into<String>) -> Self {
        Command::Play {
            url: url.into(),
            position: 0.0,
        }
    }

    /// `GetProperty` when `value` is `None`, otherwise `SetProperty`
    pub fn property(name: impl Into<String>, value: Option<RequestBody>) -> Self {
        match value {
            None => Command::GetProperty(name.into()),
            Some(value) => Command::SetProperty(name.into(), value),
        }
    }

    /// HTTP method of the request
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Command::ServerInfo | Command::PlaybackInfo | Command::Scrub(None) => Method::Get,
            Command::Play { .. }
            | Command::Scrub(Some(_))
            | Command::Rate(_)
            | Command::Stop
            | Command::GetProperty(_) => Method::Post,
            Command::SetProperty(..) => Method::Put,
        }
    }

    /// Request path including query string
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Command::ServerInfo => "/server-info".to_string(),
            Command::Play { .. } => "/play".to_string(),
            Command::Scrub(None) => "/scrub".to_string(),
            Command::Scrub(Some(position)) => {
                format!("/scrub?position={}", format_number(*position))
            }
            Command::Rate(value) => format!("/rate?value={}", format_number(*value)),
            Command::Stop => "/stop".to_string(),
            Command::PlaybackInfo => "/playback-info".to_string(),
            Command::GetProperty(name) => format!("/getProperty?{name}"),
            Command::SetProperty(name, _) => format!("/setProperty?{name}"),
        }
    }

    /// Whether the reverse event channel must be (re)started first
    #[must_use]
    pub fn starts_reverse_channel(&self) -> bool {
        matches!(self, Command::Play { .. })
    }

    /// Split into method, path and body
    #[must_use]
    pub fn into_request(self) -> (Method, String, RequestBody) {
        let method = self.method();
        let path = self.path();
        let body = match self {
            Command::Play { url, position } => RequestBody::Document(
                DictBuilder::new()
                    .insert("Content-Location", url)
                    .insert("Start-Position", start_position(position))
                    .into_map(),
            ),
            Command::SetProperty(_, value) => value,
            _ => RequestBody::Empty,
        };
        (method, path, body)
    }
}

/// Whole seconds go out as an integer, anything else as a real
fn start_position(position: f64) -> PlistValue {
    if position.fract() == 0.0 && position.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        PlistValue::Integer(position as i64)
    } else {
        PlistValue::Real(position)
    }
}

/// Reject property names that would change the shape of the request path
///
/// # Errors
///
/// Returns `InvalidParameter` for an empty name, or one holding whitespace
/// or any of `?&#/`.
pub fn validate_property_name(name: &str) -> Result<(), AirPlayError> {
    let message = if name.is_empty() {
        "property name is empty".to_string()
    } else if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '?' | '&' | '#' | '/'))
    {
        format!("property name {name:?} contains {c:?}")
    } else {
        return Ok(());
    };

    Err(AirPlayError::InvalidParameter {
        name: "name".to_string(),
        message,
    })
}
