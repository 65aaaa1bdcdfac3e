use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};
use thiserror::Error;

use super::PlistValue;

/// Errors that can occur during binary plist encoding
#[derive(Debug, Error)]
pub enum PlistEncodeError {
    #[error("too many objects: {0}")]
    TooManyObjects(usize),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a value as a `bplist00` document
///
/// Scalars that repeat (keys, strings, numbers) are written once and shared.
///
/// # Errors
///
/// Returns `PlistEncodeError::TooManyObjects` if the document needs more than
/// 65535 objects.
pub fn encode(value: &PlistValue) -> Result<Vec<u8>, PlistEncodeError> {
    let mut writer = Writer::default();
    let root = writer.push(value)?;
    writer.finish(root)
}

/// Object references are always two bytes wide
const REF_SIZE: u8 = 2;

/// Scalars eligible for sharing
#[derive(Hash, Eq, PartialEq)]
enum Shared {
    String(String),
    Data(Vec<u8>),
    Integer(i64),
    Unsigned(u64),
    Real(u64),
    Date(u64),
}

impl Shared {
    fn of(value: &PlistValue) -> Option<Self> {
        match value {
            PlistValue::String(s) => Some(Self::String(s.clone())),
            PlistValue::Data(d) => Some(Self::Data(d.clone())),
            PlistValue::Integer(i) => Some(Self::Integer(*i)),
            PlistValue::UnsignedInteger(u) => Some(Self::Unsigned(*u)),
            PlistValue::Real(f) => Some(Self::Real(f.to_bits())),
            PlistValue::Date(d) => Some(Self::Date(d.to_bits())),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Writer {
    objects: Vec<u8>,
    offsets: Vec<usize>,
    shared: HashMap<Shared, usize>,
}

impl Writer {
    /// Appends `value` (children first) and returns its object index
    fn push(&mut self, value: &PlistValue) -> Result<usize, PlistEncodeError> {
        let key = Shared::of(value);
        if let Some(index) = key.as_ref().and_then(|k| self.shared.get(k)) {
            return Ok(*index);
        }

        let mut object = Vec::new();
        match value {
            PlistValue::Boolean(b) => object.push(if *b { 0x09 } else { 0x08 }),
            PlistValue::Integer(i) => write_integer(&mut object, *i)?,
            PlistValue::UnsignedInteger(u) => match i64::try_from(*u) {
                Ok(i) => write_integer(&mut object, i)?,
                Err(_) => {
                    // 16-byte form so values above i64::MAX stay positive
                    object.push(0x14);
                    object.write_u128::<BigEndian>(u128::from(*u))?;
                }
            },
            PlistValue::Real(f) => {
                object.push(0x23);
                object.write_f64::<BigEndian>(*f)?;
            }
            PlistValue::Date(d) => {
                object.push(0x33);
                object.write_f64::<BigEndian>(*d)?;
            }
            PlistValue::Data(d) => {
                write_marker(&mut object, 0x4, d.len())?;
                object.extend_from_slice(d);
            }
            PlistValue::String(s) if s.is_ascii() => {
                write_marker(&mut object, 0x5, s.len())?;
                object.extend_from_slice(s.as_bytes());
            }
            PlistValue::String(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                write_marker(&mut object, 0x6, units.len())?;
                for unit in units {
                    object.write_u16::<BigEndian>(unit)?;
                }
            }
            PlistValue::Array(items) => {
                let mut refs = Vec::with_capacity(items.len());
                for item in items {
                    refs.push(self.push(item)?);
                }
                write_marker(&mut object, 0xA, items.len())?;
                write_refs(&mut object, &refs)?;
            }
            PlistValue::Dictionary(dict) => {
                let mut keys: Vec<&String> = dict.keys().collect();
                keys.sort();

                let mut refs = Vec::with_capacity(dict.len() * 2);
                for key in &keys {
                    refs.push(self.push(&PlistValue::String((*key).clone()))?);
                }
                for key in &keys {
                    refs.push(self.push(&dict[*key])?);
                }
                write_marker(&mut object, 0xD, dict.len())?;
                write_refs(&mut object, &refs)?;
            }
        }

        let index = self.offsets.len();
        if index > usize::from(u16::MAX) {
            return Err(PlistEncodeError::TooManyObjects(index + 1));
        }
        self.offsets.push(self.objects.len());
        self.objects.extend_from_slice(&object);

        if let Some(key) = key {
            self.shared.insert(key, index);
        }
        Ok(index)
    }

    fn finish(self, root: usize) -> Result<Vec<u8>, PlistEncodeError> {
        let header_len = 8;
        let table_start = header_len + self.objects.len();
        let offset_size = uint_width(table_start as u64);

        let mut out = Vec::with_capacity(table_start + self.offsets.len() * 8 + 32);
        out.extend_from_slice(b"bplist00");
        out.extend_from_slice(&self.objects);

        for offset in &self.offsets {
            out.write_uint::<BigEndian>((header_len + offset) as u64, usize::from(offset_size))?;
        }

        // trailer: 5 unused bytes, sort version, then sizes and counts
        out.extend_from_slice(&[0; 6]);
        out.push(offset_size);
        out.push(REF_SIZE);
        out.write_u64::<BigEndian>(self.offsets.len() as u64)?;
        out.write_u64::<BigEndian>(root as u64)?;
        out.write_u64::<BigEndian>(table_start as u64)?;

        Ok(out)
    }
}

/// Integers up to `u32::MAX` use the narrowest unsigned width, everything
/// else (including negatives) the 8-byte signed form.
fn write_integer(out: &mut Vec<u8>, value: i64) -> std::io::Result<()> {
    match u32::try_from(value) {
        Ok(v) => {
            let width = uint_width(u64::from(v));
            out.push(0x10 | width.trailing_zeros() as u8);
            out.write_uint::<BigEndian>(u64::from(v), usize::from(width))
        }
        Err(_) => {
            out.push(0x13);
            out.write_i64::<BigEndian>(value)
        }
    }
}

fn write_marker(out: &mut Vec<u8>, kind: u8, len: usize) -> std::io::Result<()> {
    if len < 0xF {
        #[allow(clippy::cast_possible_truncation, reason = "len checked to be < 15")]
        out.push((kind << 4) | len as u8);
        return Ok(());
    }

    out.push((kind << 4) | 0xF);
    let width = uint_width(len as u64);
    out.push(0x10 | width.trailing_zeros() as u8);
    out.write_uint::<BigEndian>(len as u64, usize::from(width))
}

fn write_refs(out: &mut Vec<u8>, refs: &[usize]) -> Result<(), PlistEncodeError> {
    for &r in refs {
        let r = u16::try_from(r).map_err(|_| PlistEncodeError::TooManyObjects(r))?;
        out.write_u16::<BigEndian>(r)?;
    }
    Ok(())
}

fn uint_width(value: u64) -> u8 {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}
