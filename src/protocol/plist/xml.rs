//! XML property-list reader
//!
//! Builds a [`PlistValue`] from the `<plist>` document form. Writing XML is
//! never needed: requests always go out as binary plists.

use base64::Engine;
use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

use super::{Dictionary, PlistValue};

/// Errors that can occur while reading an XML plist
#[derive(Debug, Error)]
pub enum XmlPlistError {
    #[error("document is not valid UTF-8")]
    InvalidUtf8,

    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("malformed plist: {0}")]
    Malformed(String),

    #[error("invalid <{element}> content: {text:?}")]
    InvalidScalar { element: &'static str, text: String },

    #[error("document has no root value")]
    Empty,
}

/// Decode an XML property list into its root value
///
/// # Errors
///
/// Returns `XmlPlistError` if the document is not well-formed XML or does not
/// follow the plist element structure.
pub fn decode_xml(data: &[u8]) -> Result<PlistValue, XmlPlistError> {
    let text = std::str::from_utf8(data).map_err(|_| XmlPlistError::InvalidUtf8)?;

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut tree = Tree::default();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = start.name();
                match name.as_ref() {
                    b"plist" => {}
                    b"dict" => tree.open(Frame::Dict(Dictionary::new(), None)),
                    b"array" => tree.open(Frame::Array(Vec::new())),
                    b"true" | b"false" => {
                        reader.read_text(name)?;
                        tree.attach(PlistValue::Boolean(name.as_ref() == b"true"))?;
                    }
                    element => {
                        let raw = reader.read_text(name)?;
                        let content = quick_xml::escape::unescape(&raw)
                            .map_err(|e| XmlPlistError::Malformed(e.to_string()))?;
                        if element == b"key" {
                            tree.key(content.into_owned())?;
                        } else {
                            tree.attach(scalar(element, &content)?)?;
                        }
                    }
                }
            }
            Event::Empty(empty) => match empty.name().as_ref() {
                b"true" => tree.attach(PlistValue::Boolean(true))?,
                b"false" => tree.attach(PlistValue::Boolean(false))?,
                b"dict" => tree.attach(PlistValue::Dictionary(Dictionary::new()))?,
                b"array" => tree.attach(PlistValue::Array(Vec::new()))?,
                b"key" => tree.key(String::new())?,
                b"plist" => {}
                element => tree.attach(scalar(element, "")?)?,
            },
            Event::End(end) => match end.name().as_ref() {
                b"dict" | b"array" => tree.close()?,
                _ => {}
            },
            Event::Eof => break,
            // declaration, doctype, comments and stray whitespace
            _ => {}
        }
    }

    tree.finish()
}

enum Frame {
    Array(Vec<PlistValue>),
    Dict(Dictionary, Option<String>),
}

#[derive(Default)]
struct Tree {
    stack: Vec<Frame>,
    root: Option<PlistValue>,
}

impl Tree {
    fn open(&mut self, frame: Frame) {
        self.stack.push(frame);
    }

    fn close(&mut self) -> Result<(), XmlPlistError> {
        let value = match self.stack.pop() {
            Some(Frame::Array(items)) => PlistValue::Array(items),
            Some(Frame::Dict(dict, None)) => PlistValue::Dictionary(dict),
            Some(Frame::Dict(_, Some(key))) => {
                return Err(XmlPlistError::Malformed(format!("key {key:?} has no value")));
            }
            None => return Err(XmlPlistError::Malformed("unbalanced close tag".into())),
        };
        self.attach(value)
    }

    fn key(&mut self, key: String) -> Result<(), XmlPlistError> {
        match self.stack.last_mut() {
            Some(Frame::Dict(_, pending @ None)) => {
                *pending = Some(key);
                Ok(())
            }
            _ => Err(XmlPlistError::Malformed(format!(
                "unexpected <key>{key}</key>"
            ))),
        }
    }

    fn attach(&mut self, value: PlistValue) -> Result<(), XmlPlistError> {
        match self.stack.last_mut() {
            Some(Frame::Array(items)) => items.push(value),
            Some(Frame::Dict(dict, pending)) => {
                let key = pending
                    .take()
                    .ok_or_else(|| XmlPlistError::Malformed("dictionary value without key".into()))?;
                dict.insert(key, value);
            }
            None if self.root.is_none() => self.root = Some(value),
            None => return Err(XmlPlistError::Malformed("multiple root values".into())),
        }
        Ok(())
    }

    fn finish(self) -> Result<PlistValue, XmlPlistError> {
        if !self.stack.is_empty() {
            return Err(XmlPlistError::Malformed("unterminated container".into()));
        }
        self.root.ok_or(XmlPlistError::Empty)
    }
}

fn scalar(element: &[u8], text: &str) -> Result<PlistValue, XmlPlistError> {
    let invalid = |element: &'static str| XmlPlistError::InvalidScalar {
        element,
        text: text.to_string(),
    };

    match element {
        b"string" => Ok(PlistValue::String(text.to_string())),
        b"integer" => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .map(PlistValue::Integer)
                .or_else(|_| trimmed.parse::<u64>().map(PlistValue::from))
                .map_err(|_| invalid("integer"))
        }
        b"real" => text
            .trim()
            .parse::<f64>()
            .map(PlistValue::Real)
            .map_err(|_| invalid("real")),
        b"data" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map(PlistValue::Data)
                .map_err(|_| invalid("data"))
        }
        b"date" => parse_date(text.trim())
            .map(PlistValue::Date)
            .ok_or_else(|| invalid("date")),
        other => Err(XmlPlistError::Malformed(format!(
            "unknown element <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Seconds between 1970-01-01 and the plist epoch 2001-01-01
const PLIST_EPOCH_UNIX: i64 = 978_307_200;

/// Parses `YYYY-MM-DDTHH:MM:SSZ` into seconds since 2001-01-01 UTC
fn parse_date(text: &str) -> Option<f64> {
    let (date, time) = text.strip_suffix('Z')?.split_once('T')?;

    let mut ymd = date.splitn(3, '-').map(str::parse::<i64>);
    let (year, month, day) = (ymd.next()?.ok()?, ymd.next()?.ok()?, ymd.next()?.ok()?);

    let mut hms = time.splitn(3, ':').map(str::parse::<i64>);
    let (hour, minute, second) = (hms.next()?.ok()?, hms.next()?.ok()?, hms.next()?.ok()?);

    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || !(0..=23).contains(&hour)
        || !(0..=59).contains(&minute)
        || !(0..=60).contains(&second)
    {
        return None;
    }

    let seconds = days_from_civil(year, month, day)?
        .checked_mul(86_400)?
        .checked_add(hour * 3600 + minute * 60 + second)?
        .checked_sub(PLIST_EPOCH_UNIX)?;

    #[allow(clippy::cast_precision_loss)]
    Some(seconds as f64)
}

/// Days since 1970-01-01 for a proleptic Gregorian date
///
/// `None` when the year is too large to count in days.
fn days_from_civil(year: i64, month: i64, day: i64) -> Option<i64> {
    let y = if month <= 2 { year.checked_sub(1)? } else { year };
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era.checked_mul(146_097)?.checked_add(doe - 719_468)
}
