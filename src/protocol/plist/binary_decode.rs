use std::collections::HashSet;

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use super::{Dictionary, PlistValue};

const MAGIC: &[u8; 8] = b"bplist00";
const TRAILER_LEN: usize = 32;

/// Errors that can occur during binary plist decoding
#[derive(Debug, Error)]
pub enum PlistDecodeError {
    #[error("invalid magic: expected 'bplist00', got {0:?}")]
    InvalidMagic([u8; 8]),

    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("invalid trailer")]
    InvalidTrailer,

    #[error("invalid object type marker: 0x{0:02x}")]
    InvalidObjectMarker(u8),

    #[error("invalid object reference: {0}")]
    InvalidReference(u64),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unsupported object: {0}")]
    Unsupported(&'static str),

    #[error("circular reference detected")]
    CircularReference,

    #[error("integer overflow")]
    IntegerOverflow,
}

/// Fields of the 32-byte trailer that the decoder needs
#[derive(Debug, Clone, Copy)]
struct Trailer {
    offset_size: usize,
    ref_size: usize,
    object_count: usize,
    root: u64,
    offset_table: usize,
}

impl Trailer {
    fn read(data: &[u8]) -> Result<Self, PlistDecodeError> {
        let t = &data[data.len() - TRAILER_LEN..];

        let to_usize = |v: u64| usize::try_from(v).map_err(|_| PlistDecodeError::InvalidTrailer);

        let trailer = Self {
            offset_size: usize::from(t[6]),
            ref_size: usize::from(t[7]),
            object_count: to_usize(BigEndian::read_u64(&t[8..16]))?,
            root: BigEndian::read_u64(&t[16..24]),
            offset_table: to_usize(BigEndian::read_u64(&t[24..32]))?,
        };

        if !matches!(trailer.offset_size, 1 | 2 | 4 | 8) || !matches!(trailer.ref_size, 1 | 2 | 4 | 8)
        {
            return Err(PlistDecodeError::InvalidTrailer);
        }

        Ok(trailer)
    }
}

/// Decode a binary property list into its root value
///
/// # Errors
///
/// Returns `PlistDecodeError` if the buffer is not a well-formed `bplist00` document.
pub fn decode(data: &[u8]) -> Result<PlistValue, PlistDecodeError> {
    if data.len() < MAGIC.len() {
        return Err(PlistDecodeError::BufferTooSmall {
            needed: MAGIC.len(),
            have: data.len(),
        });
    }

    if &data[..MAGIC.len()] != MAGIC {
        let mut found = [0u8; 8];
        found.copy_from_slice(&data[..MAGIC.len()]);
        return Err(PlistDecodeError::InvalidMagic(found));
    }

    if data.len() < MAGIC.len() + TRAILER_LEN {
        return Err(PlistDecodeError::BufferTooSmall {
            needed: MAGIC.len() + TRAILER_LEN,
            have: data.len(),
        });
    }

    let trailer = Trailer::read(data)?;
    let reader = Reader::new(data, trailer)?;
    reader.object(trailer.root, &mut HashSet::new())
}

/// Walks the object table of one document
struct Reader<'a> {
    data: &'a [u8],
    offsets: Vec<usize>,
    ref_size: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], trailer: Trailer) -> Result<Self, PlistDecodeError> {
        let table_len = trailer
            .object_count
            .checked_mul(trailer.offset_size)
            .ok_or(PlistDecodeError::InvalidTrailer)?;

        let mut reader = Self {
            data,
            offsets: Vec::new(),
            ref_size: trailer.ref_size,
        };

        // The table must be in bounds before the object count is trusted
        let table = reader.slice(trailer.offset_table, table_len)?;
        reader.offsets = table
            .chunks_exact(trailer.offset_size)
            .map(|entry| {
                usize::try_from(read_uint(entry)).map_err(|_| PlistDecodeError::IntegerOverflow)
            })
            .collect::<Result<_, _>>()?;

        Ok(reader)
    }

    /// Bounds-checked view into the document
    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8], PlistDecodeError> {
        let end = start
            .checked_add(len)
            .ok_or(PlistDecodeError::IntegerOverflow)?;
        self.data
            .get(start..end)
            .ok_or(PlistDecodeError::BufferTooSmall {
                needed: end,
                have: self.data.len(),
            })
    }

    fn object(&self, index: u64, seen: &mut HashSet<u64>) -> Result<PlistValue, PlistDecodeError> {
        if !seen.insert(index) {
            return Err(PlistDecodeError::CircularReference);
        }

        let offset = usize::try_from(index)
            .ok()
            .and_then(|i| self.offsets.get(i).copied())
            .ok_or(PlistDecodeError::InvalidReference(index))?;

        let marker = self.slice(offset, 1)?[0];
        let value = self.value(marker, offset + 1, seen)?;

        seen.remove(&index);
        Ok(value)
    }

    fn value(
        &self,
        marker: u8,
        pos: usize,
        seen: &mut HashSet<u64>,
    ) -> Result<PlistValue, PlistDecodeError> {
        let low = marker & 0x0F;

        match marker >> 4 {
            0x0 => match low {
                0x8 => Ok(PlistValue::Boolean(false)),
                0x9 => Ok(PlistValue::Boolean(true)),
                // null and fill bytes carry no value of their own
                0x0 | 0xF => Ok(PlistValue::Data(Vec::new())),
                _ => Err(PlistDecodeError::InvalidObjectMarker(marker)),
            },
            0x1 => self.integer(pos, low),
            0x2 => self.real(pos, low),
            0x3 => Ok(PlistValue::Date(BigEndian::read_f64(self.slice(pos, 8)?))),
            0x4 => {
                let (len, start) = self.length(pos, low)?;
                Ok(PlistValue::Data(self.slice(start, len)?.to_vec()))
            }
            0x5 => {
                let (len, start) = self.length(pos, low)?;
                let text = std::str::from_utf8(self.slice(start, len)?)
                    .map_err(|_| PlistDecodeError::InvalidUtf8)?;
                Ok(PlistValue::String(text.to_string()))
            }
            0x6 => {
                let (len, start) = self.length(pos, low)?;
                let bytes = self.slice(start, len.checked_mul(2).ok_or(PlistDecodeError::IntegerOverflow)?)?;
                let units: Vec<u16> = bytes.chunks_exact(2).map(BigEndian::read_u16).collect();
                String::from_utf16(&units)
                    .map(PlistValue::String)
                    .map_err(|_| PlistDecodeError::InvalidUtf8)
            }
            0x8 => Err(PlistDecodeError::Unsupported("UID")),
            0xA => {
                let (count, start) = self.length(pos, low)?;
                let refs = self.refs(start, count)?;
                let mut items = Vec::with_capacity(count);
                for r in refs {
                    items.push(self.object(r, seen)?);
                }
                Ok(PlistValue::Array(items))
            }
            0xD => {
                let (count, start) = self.length(pos, low)?;
                let refs = self.refs(start, count.checked_mul(2).ok_or(PlistDecodeError::IntegerOverflow)?)?;
                let (keys, values) = refs.split_at(count);

                let mut dict = Dictionary::with_capacity(count);
                for (&k, &v) in keys.iter().zip(values) {
                    let PlistValue::String(key) = self.object(k, seen)? else {
                        return Err(PlistDecodeError::Unsupported("non-string dictionary key"));
                    };
                    dict.insert(key, self.object(v, seen)?);
                }
                Ok(PlistValue::Dictionary(dict))
            }
            _ => Err(PlistDecodeError::InvalidObjectMarker(marker)),
        }
    }

    fn integer(&self, pos: usize, size_exp: u8) -> Result<PlistValue, PlistDecodeError> {
        let len = 1usize
            .checked_shl(u32::from(size_exp))
            .ok_or(PlistDecodeError::IntegerOverflow)?;
        let bytes = self.slice(pos, len)?;

        match len {
            1 => Ok(PlistValue::Integer(i64::from(bytes[0]))),
            2 => Ok(PlistValue::Integer(i64::from(BigEndian::read_u16(bytes)))),
            4 => Ok(PlistValue::Integer(i64::from(BigEndian::read_u32(bytes)))),
            8 => Ok(PlistValue::Integer(BigEndian::read_i64(bytes))),
            16 => {
                let wide = BigEndian::read_u128(bytes);
                u64::try_from(wide)
                    .map(PlistValue::from)
                    .map_err(|_| PlistDecodeError::IntegerOverflow)
            }
            _ => Err(PlistDecodeError::IntegerOverflow),
        }
    }

    fn real(&self, pos: usize, size_exp: u8) -> Result<PlistValue, PlistDecodeError> {
        match size_exp {
            2 => Ok(PlistValue::Real(f64::from(BigEndian::read_f32(
                self.slice(pos, 4)?,
            )))),
            3 => Ok(PlistValue::Real(BigEndian::read_f64(self.slice(pos, 8)?))),
            _ => Err(PlistDecodeError::Unsupported("real of unusual width")),
        }
    }

    /// Reads an object length, following the 0xF extended-length form.
    ///
    /// Returns the length and the position right after it.
    fn length(&self, pos: usize, nibble: u8) -> Result<(usize, usize), PlistDecodeError> {
        if nibble != 0xF {
            return Ok((usize::from(nibble), pos));
        }

        let marker = self.slice(pos, 1)?[0];
        if marker >> 4 != 0x1 {
            return Err(PlistDecodeError::InvalidObjectMarker(marker));
        }

        let width = 1usize
            .checked_shl(u32::from(marker & 0x0F))
            .filter(|w| *w <= 8)
            .ok_or(PlistDecodeError::IntegerOverflow)?;
        let len = usize::try_from(read_uint(self.slice(pos + 1, width)?))
            .map_err(|_| PlistDecodeError::IntegerOverflow)?;

        Ok((len, pos + 1 + width))
    }

    fn refs(&self, start: usize, count: usize) -> Result<Vec<u64>, PlistDecodeError> {
        let len = count
            .checked_mul(self.ref_size)
            .ok_or(PlistDecodeError::IntegerOverflow)?;
        Ok(self
            .slice(start, len)?
            .chunks_exact(self.ref_size)
            .map(read_uint)
            .collect())
    }
}

/// Big-endian unsigned integer of 1, 2, 4 or 8 bytes
fn read_uint(bytes: &[u8]) -> u64 {
    BigEndian::read_uint(bytes, bytes.len())
}
