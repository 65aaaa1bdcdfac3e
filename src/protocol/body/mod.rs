//! Request and response body codec
//!
//! Control requests carry one of three body shapes, chosen at the call site.
//! Response and event bodies are decoded purely by their declared media
//! type; anything unrecognized is handed back untouched.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use tracing::warn;

use super::plist::{self, Dictionary, PlistEncodeError, PlistValue};

/// Media types seen on the wire
pub mod content_type {
    /// Binary property list
    pub const BINARY_PLIST: &str = "application/x-apple-binary-plist";
    /// XML property list, used in control responses
    pub const XML_PLIST: &str = "text/x-apple-plist+xml";
    /// XML property list as labelled on some device events
    pub const APPLE_PLIST: &str = "application/x-apple-plist";
    /// Newline-delimited `key: value` lines
    pub const TEXT_PARAMETERS: &str = "text/parameters";
}

/// Body of an outbound control request
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No body; sent with `Content-Length: 0`
    #[default]
    Empty,
    /// Keyed document, sent as a binary property list
    Document(Dictionary),
    /// Pre-formatted `key: value` lines, sent verbatim
    TextParams(String),
}

impl RequestBody {
    /// Wrap a scalar as the single-entry document `{ "value": scalar }`
    ///
    /// String scalars must come through here; `From<&str>` builds text
    /// parameters instead.
    pub fn value(scalar: impl Into<PlistValue>) -> Self {
        let mut map = Dictionary::new();
        map.insert("value".to_string(), scalar.into());
        RequestBody::Document(map)
    }

    /// Text parameters body
    pub fn text(params: impl Into<String>) -> Self {
        RequestBody::TextParams(params.into())
    }

    /// Whether this is the empty body
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

impl From<Dictionary> for RequestBody {
    fn from(map: Dictionary) -> Self {
        RequestBody::Document(map)
    }
}

impl From<f64> for RequestBody {
    fn from(v: f64) -> Self {
        RequestBody::value(v)
    }
}

impl From<i64> for RequestBody {
    fn from(v: i64) -> Self {
        RequestBody::value(v)
    }
}

impl From<bool> for RequestBody {
    fn from(v: bool) -> Self {
        RequestBody::value(v)
    }
}

/// Strings are taken as ready-made `key: value` lines
impl From<&str> for RequestBody {
    fn from(v: &str) -> Self {
        RequestBody::text(v)
    }
}

impl From<String> for RequestBody {
    fn from(v: String) -> Self {
        RequestBody::text(v)
    }
}

/// Wire form of a [`RequestBody`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedBody {
    /// Bytes to send; empty for [`RequestBody::Empty`]
    pub bytes: Vec<u8>,
    /// `Content-Type` to declare, if any
    pub content_type: Option<&'static str>,
}

/// Encode a request body
///
/// # Errors
///
/// Returns `PlistEncodeError` if a document cannot be serialized.
pub fn encode(body: RequestBody) -> Result<EncodedBody, PlistEncodeError> {
    match body {
        RequestBody::Empty => Ok(EncodedBody::default()),
        RequestBody::Document(map) => Ok(EncodedBody {
            bytes: plist::encode(&PlistValue::Dictionary(map))?,
            content_type: Some(content_type::BINARY_PLIST),
        }),
        RequestBody::TextParams(text) => Ok(EncodedBody {
            bytes: text.into_bytes(),
            content_type: Some(content_type::TEXT_PARAMETERS),
        }),
    }
}

/// A response or event body after content-type dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    /// Property-list document (binary or XML)
    Document(PlistValue),
    /// `text/parameters` lines; unparsable values are NaN
    Parameters(HashMap<String, f64>),
    /// Unrecognized media type, or a body that failed to parse
    Raw(Vec<u8>),
}

impl DecodedBody {
    /// The document, if this body decoded to one
    #[must_use]
    pub fn as_document(&self) -> Option<&PlistValue> {
        match self {
            DecodedBody::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// The parameter map, if this was a `text/parameters` body
    #[must_use]
    pub fn as_parameters(&self) -> Option<&HashMap<String, f64>> {
        match self {
            DecodedBody::Parameters(params) => Some(params),
            _ => None,
        }
    }

    /// The untouched bytes, if the body was passed through
    #[must_use]
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            DecodedBody::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Look up a field of a document body
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        self.as_document()?.get(key)
    }
}

/// Decode a control response body by its declared media type
///
/// Never fails: an unknown media type, or a body that does not parse as
/// the type it claims, comes back as [`DecodedBody::Raw`].
#[must_use]
pub fn decode(bytes: &[u8], content_type: Option<&str>) -> DecodedBody {
    match content_type {
        Some(content_type::BINARY_PLIST) => match plist::decode(bytes) {
            Ok(doc) => DecodedBody::Document(doc),
            Err(e) => {
                warn!("Undecodable binary plist body ({} bytes): {}", bytes.len(), e);
                DecodedBody::Raw(bytes.to_vec())
            }
        },
        Some(content_type::XML_PLIST) => decode_xml_or_raw(bytes),
        Some(content_type::TEXT_PARAMETERS) => DecodedBody::Parameters(parse_parameters(
            &String::from_utf8_lossy(bytes),
        )),
        _ => DecodedBody::Raw(bytes.to_vec()),
    }
}

/// Decode a body pushed over the reverse channel
///
/// Only the two XML property-list labels are decoded; every other media
/// type, binary plists included, is passed through.
#[must_use]
pub fn decode_event(bytes: &[u8], content_type: Option<&str>) -> DecodedBody {
    match content_type {
        Some(content_type::XML_PLIST | content_type::APPLE_PLIST) => decode_xml_or_raw(bytes),
        _ => DecodedBody::Raw(bytes.to_vec()),
    }
}

fn decode_xml_or_raw(bytes: &[u8]) -> DecodedBody {
    match plist::decode_xml(bytes) {
        Ok(doc) => DecodedBody::Document(doc),
        Err(e) => {
            warn!("Undecodable XML plist body ({} bytes): {}", bytes.len(), e);
            DecodedBody::Raw(bytes.to_vec())
        }
    }
}

/// Parse `key: value` lines into a numeric map
///
/// Blank lines are skipped. A line without `": "` maps its whole text to
/// NaN, as does a value with no numeric prefix.
#[must_use]
pub fn parse_parameters(text: &str) -> HashMap<String, f64> {
    text.trim()
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(": ") {
            Some((key, value)) => (key.to_string(), parse_leading_float(value)),
            None => (line.to_string(), f64::NAN),
        })
        .collect()
}

/// Longest numeric prefix of `s`, after leading whitespace, or NaN
fn parse_leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    // Only the exact spelling `Infinity` names an infinite value
    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return f64::NAN;
    }
    // "1e5px" keeps its exponent only when digits follow the marker
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

/// Render a number the way it appears in a query string: `10`, `10.5`
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let int = value as i64;
        int.to_string()
    } else {
        value.to_string()
    }
}
