//! Recursive-descent CBOR decoder
//!
//! The decoder works directly over a byte slice and never trusts a length
//! field: every declared length is checked against the remaining input
//! before anything is allocated, and nesting of arrays, maps and tags is
//! bounded by [`DecodeLimits::max_depth`].

use crate::error::{CborError, Result};
use crate::value::CborValue;

/// Default maximum nesting of arrays, maps and tags
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Default maximum input size in bytes
pub const DEFAULT_MAX_BYTES: usize = 8192;

const BREAK: u8 = 0xff;

/// Bounds applied while decoding untrusted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum nesting of arrays, maps and tags. Scalars do not add depth.
    pub max_depth: usize,
    /// Maximum number of input bytes accepted
    pub max_bytes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Decode a single top-level CBOR item using [`DecodeLimits::default`].
///
/// # Example
///
/// ```
/// use coapum_cbor::{decode, CborValue};
///
/// // {"foo": "bar"}
/// let value = decode(&[0xA1, 0x63, 0x66, 0x6F, 0x6F, 0x63, 0x62, 0x61, 0x72]).unwrap();
/// assert_eq!(value.get("foo"), Some(&CborValue::from("bar")));
/// ```
pub fn decode(input: &[u8]) -> Result<CborValue> {
    decode_with_limits(input, DecodeLimits::default())
}

/// Decode a single top-level CBOR item, rejecting trailing bytes.
pub fn decode_with_limits(input: &[u8], limits: DecodeLimits) -> Result<CborValue> {
    if input.len() > limits.max_bytes {
        return Err(CborError::InputTooLarge {
            len: input.len(),
            max: limits.max_bytes,
        });
    }

    let mut decoder = Decoder::new(input, limits);
    let value = decoder.decode_item(0)?;

    if decoder.pos < input.len() {
        return Err(CborError::TrailingData {
            offset: decoder.pos,
        });
    }

    Ok(value)
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    limits: DecodeLimits,
}

impl<'a> Decoder<'a> {
    fn new(input: &'a [u8], limits: DecodeLimits) -> Self {
        Self {
            input,
            pos: 0,
            limits,
        }
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn take(&mut self, len: u64) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining as u64 {
            return Err(CborError::TruncatedInput {
                offset: self.pos,
                needed: len,
                remaining,
            });
        }

        let start = self.pos;
        self.pos += len as usize;
        Ok(&self.input[start..self.pos])
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn peek(&self) -> Result<u8> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(CborError::TruncatedInput {
                offset: self.pos,
                needed: 1,
                remaining: 0,
            })
    }

    /// Read the argument following an initial byte. `None` means indefinite length.
    fn read_argument(&mut self, initial: u8, offset: usize) -> Result<Option<u64>> {
        let info = initial & 0x1f;
        let value = match info {
            0..=23 => u64::from(info),
            24 => u64::from(self.read_u8()?),
            25 => {
                let b = self.take(2)?;
                u64::from(u16::from_be_bytes([b[0], b[1]]))
            }
            26 => {
                let b = self.take(4)?;
                u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            27 => {
                let b = self.take(8)?;
                u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
            31 => return Ok(None),
            _ => {
                return Err(CborError::UnsupportedType {
                    offset,
                    initial_byte: initial,
                })
            }
        };
        Ok(Some(value))
    }

    fn read_definite(&mut self, initial: u8, offset: usize) -> Result<u64> {
        self.read_argument(initial, offset)?
            .ok_or(CborError::UnsupportedType {
                offset,
                initial_byte: initial,
            })
    }

    fn enter(&self, depth: usize) -> Result<usize> {
        let depth = depth + 1;
        if depth > self.limits.max_depth {
            return Err(CborError::DepthExceeded {
                max: self.limits.max_depth,
            });
        }
        Ok(depth)
    }

    /// Every item occupies at least one byte, so a count larger than the
    /// remaining input can never be satisfied.
    fn check_count(&self, count: u64, bytes_per_item: u64) -> Result<usize> {
        let needed = count.saturating_mul(bytes_per_item);
        let remaining = self.remaining();
        if needed > remaining as u64 {
            return Err(CborError::TruncatedInput {
                offset: self.pos,
                needed,
                remaining,
            });
        }
        Ok(count as usize)
    }

    fn decode_item(&mut self, depth: usize) -> Result<CborValue> {
        let offset = self.pos;
        let initial = self.read_u8()?;

        match initial >> 5 {
            0 => Ok(CborValue::Unsigned(self.read_definite(initial, offset)?)),
            1 => Ok(CborValue::Negative(self.read_definite(initial, offset)?)),
            2 => {
                let bytes = match self.read_argument(initial, offset)? {
                    Some(len) => self.take(len)?.to_vec(),
                    None => self.read_chunks(2)?,
                };
                Ok(CborValue::ByteString(bytes))
            }
            3 => {
                let bytes = match self.read_argument(initial, offset)? {
                    Some(len) => self.take(len)?.to_vec(),
                    None => self.read_chunks(3)?,
                };
                String::from_utf8(bytes)
                    .map(CborValue::TextString)
                    .map_err(|_| CborError::InvalidUtf8 { offset })
            }
            4 => {
                let depth = self.enter(depth)?;
                match self.read_argument(initial, offset)? {
                    Some(len) => {
                        let len = self.check_count(len, 1)?;
                        let mut items = Vec::with_capacity(len);
                        for _ in 0..len {
                            items.push(self.decode_item(depth)?);
                        }
                        Ok(CborValue::Array(items))
                    }
                    None => {
                        let mut items = Vec::new();
                        while self.peek()? != BREAK {
                            items.push(self.decode_item(depth)?);
                        }
                        self.pos += 1;
                        Ok(CborValue::Array(items))
                    }
                }
            }
            5 => {
                let depth = self.enter(depth)?;
                match self.read_argument(initial, offset)? {
                    Some(len) => {
                        let len = self.check_count(len, 2)?;
                        let mut entries = Vec::with_capacity(len);
                        for _ in 0..len {
                            let key = self.decode_item(depth)?;
                            let value = self.decode_item(depth)?;
                            entries.push((key, value));
                        }
                        Ok(CborValue::Map(entries))
                    }
                    None => {
                        let mut entries = Vec::new();
                        while self.peek()? != BREAK {
                            let key = self.decode_item(depth)?;
                            let value = self.decode_item(depth)?;
                            entries.push((key, value));
                        }
                        self.pos += 1;
                        Ok(CborValue::Map(entries))
                    }
                }
            }
            6 => {
                let tag = self.read_definite(initial, offset)?;
                let depth = self.enter(depth)?;
                let inner = self.decode_item(depth)?;
                Ok(CborValue::Tag(tag, Box::new(inner)))
            }
            _ => self.decode_simple(initial, offset),
        }
    }

    /// Concatenate the chunks of an indefinite-length string up to its break.
    fn read_chunks(&mut self, major: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let offset = self.pos;
            let initial = self.read_u8()?;
            if initial == BREAK {
                return Ok(out);
            }
            if initial >> 5 != major {
                return Err(CborError::InvalidChunk { offset });
            }

            let len = self
                .read_argument(initial, offset)?
                .ok_or(CborError::InvalidChunk { offset })?;
            let chunk = self.take(len)?;

            if major == 3 && std::str::from_utf8(chunk).is_err() {
                return Err(CborError::InvalidUtf8 { offset });
            }
            out.extend_from_slice(chunk);
        }
    }

    fn decode_simple(&mut self, initial: u8, offset: usize) -> Result<CborValue> {
        match initial & 0x1f {
            20 => Ok(CborValue::Bool(false)),
            21 => Ok(CborValue::Bool(true)),
            22 => Ok(CborValue::Null),
            23 => Ok(CborValue::Undefined),
            25 => {
                let b = self.take(2)?;
                Ok(CborValue::Float(f16_to_f64(u16::from_be_bytes([b[0], b[1]]))))
            }
            26 => {
                let b = self.take(4)?;
                Ok(CborValue::Float(f64::from(f32::from_be_bytes([
                    b[0], b[1], b[2], b[3],
                ]))))
            }
            27 => {
                let b = self.take(8)?;
                Ok(CborValue::Float(f64::from_be_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ])))
            }
            31 => Err(CborError::UnexpectedBreak { offset }),
            // Unassigned simple values (0..=19, 24) and reserved 28..=30
            _ => Err(CborError::UnsupportedType {
                offset,
                initial_byte: initial,
            }),
        }
    }
}

/// IEEE-754 binary16 to binary64, subnormals included
pub(crate) fn f16_to_f64(bits: u16) -> f64 {
    let exponent = (bits >> 10) & 0x1f;
    let mantissa = f64::from(bits & 0x3ff);

    let magnitude = match exponent {
        0 => mantissa * 2f64.powi(-24),
        31 if mantissa == 0.0 => f64::INFINITY,
        31 => f64::NAN,
        _ => (mantissa + 1024.0) * 2f64.powi(i32::from(exponent) - 25),
    };

    if bits & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
