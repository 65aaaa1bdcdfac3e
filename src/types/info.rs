//! Typed views over the device's info documents

use std::collections::HashMap;

use crate::protocol::plist::PlistValue;

/// A loaded or seekable span of the media timeline, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    /// Offset of the span
    pub start: f64,
    /// Length of the span
    pub duration: f64,
}

impl TimeRange {
    fn from_plist(value: &PlistValue) -> Option<Self> {
        Some(Self {
            start: value.get("start")?.as_f64()?,
            duration: value.get("duration")?.as_f64()?,
        })
    }

    /// End of the span
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Answer to `GET /playback-info`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackInfo {
    /// Media duration in seconds
    pub duration: Option<f64>,
    /// Current position in seconds
    pub position: Option<f64>,
    /// Playback rate, `0` when paused
    pub rate: Option<f64>,
    /// Media is loaded and playable
    pub ready_to_play: Option<bool>,
    /// Playback stalled on an empty buffer
    pub buffer_empty: Option<bool>,
    /// Buffer cannot hold more data
    pub buffer_full: Option<bool>,
    /// Buffering is expected to keep up with playback
    pub likely_to_keep_up: Option<bool>,
    /// Spans already buffered
    pub loaded_time_ranges: Vec<TimeRange>,
    /// Spans the device can seek into
    pub seekable_time_ranges: Vec<TimeRange>,
}

impl PlaybackInfo {
    /// Read the well-known fields of a playback-info document
    ///
    /// Returns `None` if `value` is not a dictionary. An empty dictionary
    /// is what the device answers when nothing is loaded.
    #[must_use]
    pub fn from_plist(value: &PlistValue) -> Option<Self> {
        value.as_dict()?;

        Some(Self {
            duration: value.get("duration").and_then(PlistValue::as_f64),
            position: value.get("position").and_then(PlistValue::as_f64),
            rate: value.get("rate").and_then(PlistValue::as_f64),
            ready_to_play: flag(value, "readyToPlay"),
            buffer_empty: flag(value, "playbackBufferEmpty"),
            buffer_full: flag(value, "playbackBufferFull"),
            likely_to_keep_up: flag(value, "playbackLikelyToKeepUp"),
            loaded_time_ranges: ranges(value, "loadedTimeRanges"),
            seekable_time_ranges: ranges(value, "seekableTimeRanges"),
        })
    }

    /// Whether media is loaded and advancing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.rate.is_some_and(|r| r > 0.0)
    }
}

/// Some devices send flags as `0`/`1` integers
fn flag(value: &PlistValue, key: &str) -> Option<bool> {
    let field = value.get(key)?;
    field.as_bool().or_else(|| field.as_i64().map(|i| i != 0))
}

fn ranges(value: &PlistValue, key: &str) -> Vec<TimeRange> {
    value
        .get(key)
        .and_then(PlistValue::as_array)
        .map(|items| items.iter().filter_map(TimeRange::from_plist).collect())
        .unwrap_or_default()
}

/// Answer to `GET /server-info`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Device identifier (`deviceid`), usually its MAC address
    pub device_id: Option<String>,
    /// Feature bitmask
    pub features: Option<u64>,
    /// Hardware model, e.g. `AppleTV3,2`
    pub model: Option<String>,
    /// Protocol version
    pub protocol_version: Option<String>,
    /// Server software version
    pub source_version: Option<String>,
    /// Network interface address
    pub mac_address: Option<String>,
}

impl ServerInfo {
    /// Read the well-known fields of a server-info document
    #[must_use]
    pub fn from_plist(value: &PlistValue) -> Option<Self> {
        value.as_dict()?;

        let text = |key: &str| value.get(key).and_then(PlistValue::as_str).map(str::to_string);
        let features = value.get("features").and_then(|f| match f {
            PlistValue::Integer(i) => u64::try_from(*i).ok(),
            PlistValue::UnsignedInteger(u) => Some(*u),
            _ => None,
        });

        Some(Self {
            device_id: text("deviceid"),
            features,
            model: text("model"),
            protocol_version: text("protovers"),
            source_version: text("srcvers"),
            mac_address: text("macAddress"),
        })
    }

    /// Whether feature bit `bit` is advertised
    #[must_use]
    pub fn has_feature(&self, bit: u32) -> bool {
        bit < 64 && self.features.is_some_and(|f| f & (1 << bit) != 0)
    }
}

/// Answer to `GET /scrub`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrubPosition {
    /// Media duration in seconds
    pub duration: Option<f64>,
    /// Current position in seconds
    pub position: Option<f64>,
}

impl ScrubPosition {
    /// Read `duration` and `position` from a `text/parameters` body
    #[must_use]
    pub fn from_parameters(params: &HashMap<String, f64>) -> Self {
        Self {
            duration: params.get("duration").copied(),
            position: params.get("position").copied(),
        }
    }
}
