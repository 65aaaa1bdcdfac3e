//! Property-list codec used for keyed documents on the wire
//!
//! The device speaks two encodings of the same document model:
//!
//! - binary (`bplist00`), used for request bodies and most responses
//! - XML, used for `/server-info`-style answers and for reverse-channel events
//!
//! Only the binary form is ever produced; both forms are decoded.

mod binary_decode;
mod binary_encode;
mod xml;


pub use binary_decode::{PlistDecodeError, decode};
pub use binary_encode::{PlistEncodeError, encode};
pub use xml::{XmlPlistError, decode_xml};

use std::collections::HashMap;

/// A keyed document
pub type Dictionary = HashMap<String, PlistValue>;

/// A property list value
#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    /// Boolean value
    Boolean(bool),

    /// Signed integer
    Integer(i64),

    /// Unsigned integer too large for `i64`
    UnsignedInteger(u64),

    /// Floating point number
    Real(f64),

    /// UTF-8 string
    String(String),

    /// Binary data
    Data(Vec<u8>),

    /// Date as seconds since 2001-01-01 00:00:00 UTC
    Date(f64),

    /// Array of values
    Array(Vec<PlistValue>),

    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
}

impl PlistValue {
    /// Try to get as boolean
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PlistValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PlistValue::Integer(i) => Some(*i),
            PlistValue::UnsignedInteger(u) => (*u).try_into().ok(),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PlistValue::Real(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            PlistValue::Integer(i) => Some(*i as f64),
            #[allow(clippy::cast_precision_loss)]
            PlistValue::UnsignedInteger(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Try to get as string reference
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlistValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as byte slice
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PlistValue::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Try to get as array reference
    #[must_use]
    pub fn as_array(&self) -> Option<&[PlistValue]> {
        match self {
            PlistValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as dictionary reference
    #[must_use]
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            PlistValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        self.as_dict()?.get(key)
    }
}

impl From<bool> for PlistValue {
    fn from(v: bool) -> Self {
        PlistValue::Boolean(v)
    }
}

impl From<i32> for PlistValue {
    fn from(v: i32) -> Self {
        PlistValue::Integer(i64::from(v))
    }
}

impl From<i64> for PlistValue {
    fn from(v: i64) -> Self {
        PlistValue::Integer(v)
    }
}

impl From<u64> for PlistValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => PlistValue::Integer(i),
            Err(_) => PlistValue::UnsignedInteger(v),
        }
    }
}

impl From<f64> for PlistValue {
    fn from(v: f64) -> Self {
        PlistValue::Real(v)
    }
}

impl From<String> for PlistValue {
    fn from(v: String) -> Self {
        PlistValue::String(v)
    }
}

impl From<&str> for PlistValue {
    fn from(v: &str) -> Self {
        PlistValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for PlistValue {
    fn from(v: Vec<u8>) -> Self {
        PlistValue::Data(v)
    }
}

impl From<Dictionary> for PlistValue {
    fn from(v: Dictionary) -> Self {
        PlistValue::Dictionary(v)
    }
}

impl<K: Into<String>, V: Into<PlistValue>> FromIterator<(K, V)> for PlistValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        PlistValue::Dictionary(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Builder for keyed documents
#[derive(Debug, Default)]
pub struct DictBuilder {
    map: Dictionary,
}

impl DictBuilder {
    /// Create a new dictionary builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key-value pair
    #[must_use]
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<PlistValue>) -> Self {
        self.map.insert(key.into(), value.into());
        self
    }

    /// Insert if value is Some
    #[must_use]
    pub fn insert_opt<V: Into<PlistValue>>(
        mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        if let Some(v) = value {
            self.map.insert(key.into(), v.into());
        }
        self
    }

    /// Finish as a bare map
    #[must_use]
    pub fn into_map(self) -> Dictionary {
        self.map
    }

    /// Build the dictionary value
    #[must_use]
    pub fn build(self) -> PlistValue {
        PlistValue::Dictionary(self.map)
    }
}

/// Convenience macro for creating keyed documents
#[macro_export]
macro_rules! plist_dict {
    ($($key:expr => $value:expr),* $(,)?) => {
        $crate::protocol::plist::DictBuilder::new()
            $(.insert($key, $value))*
            .build()
    };
}
