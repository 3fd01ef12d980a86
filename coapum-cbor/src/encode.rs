//! CBOR encoder
//!
//! Heads are always written with the shortest argument width. Arrays, maps
//! and strings can optionally be written in indefinite-length form, which
//! is how some constrained devices stream their payloads.

use crate::value::CborValue;

const BREAK: u8 = 0xff;

/// Encode a value with definite lengths and minimal-width heads.
pub fn encode(value: &CborValue) -> Vec<u8> {
    Encoder::new().encode(value)
}

/// Configurable CBOR writer.
///
/// # Example
///
/// ```
/// use coapum_cbor::{decode, CborValue, Encoder};
///
/// let value = CborValue::from("streaming");
/// let bytes = Encoder::new().indefinite_length(true).chunk_size(5).encode(&value);
/// assert_eq!(bytes[0], 0x7f);
/// assert_eq!(decode(&bytes).unwrap(), value);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    indefinite: bool,
    chunk_size: usize,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write arrays, maps and strings in indefinite-length form
    pub fn indefinite_length(mut self, indefinite: bool) -> Self {
        self.indefinite = indefinite;
        self
    }

    /// Maximum chunk size in bytes for indefinite-length strings.
    /// Zero writes each non-empty string as a single chunk.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn encode(&self, value: &CborValue) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(value, &mut out);
        out
    }

    pub fn encode_into(&self, value: &CborValue, out: &mut Vec<u8>) {
        match value {
            CborValue::Unsigned(n) => write_head(out, 0, *n),
            CborValue::Negative(n) => write_head(out, 1, *n),
            CborValue::ByteString(bytes) => {
                if self.indefinite {
                    out.push(2 << 5 | 31);
                    for chunk in self.byte_chunks(bytes) {
                        write_head(out, 2, chunk.len() as u64);
                        out.extend_from_slice(chunk);
                    }
                    out.push(BREAK);
                } else {
                    write_head(out, 2, bytes.len() as u64);
                    out.extend_from_slice(bytes);
                }
            }
            CborValue::TextString(text) => {
                if self.indefinite {
                    out.push(3 << 5 | 31);
                    for chunk in self.text_chunks(text) {
                        write_head(out, 3, chunk.len() as u64);
                        out.extend_from_slice(chunk.as_bytes());
                    }
                    out.push(BREAK);
                } else {
                    write_head(out, 3, text.len() as u64);
                    out.extend_from_slice(text.as_bytes());
                }
            }
            CborValue::Array(items) => {
                self.write_container_head(out, 4, items.len());
                for item in items {
                    self.encode_into(item, out);
                }
                if self.indefinite {
                    out.push(BREAK);
                }
            }
            CborValue::Map(entries) => {
                self.write_container_head(out, 5, entries.len());
                for (key, value) in entries {
                    self.encode_into(key, out);
                    self.encode_into(value, out);
                }
                if self.indefinite {
                    out.push(BREAK);
                }
            }
            CborValue::Tag(tag, inner) => {
                write_head(out, 6, *tag);
                self.encode_into(inner, out);
            }
            CborValue::Bool(false) => out.push(0xf4),
            CborValue::Bool(true) => out.push(0xf5),
            CborValue::Null => out.push(0xf6),
            CborValue::Undefined => out.push(0xf7),
            CborValue::Float(f) => write_float(out, *f),
        }
    }

    fn write_container_head(&self, out: &mut Vec<u8>, major: u8, len: usize) {
        if self.indefinite {
            out.push(major << 5 | 31);
        } else {
            write_head(out, major, len as u64);
        }
    }

    fn byte_chunks<'a>(&self, bytes: &'a [u8]) -> Vec<&'a [u8]> {
        if bytes.is_empty() {
            return Vec::new();
        }
        if self.chunk_size == 0 {
            return vec![bytes];
        }
        bytes.chunks(self.chunk_size).collect()
    }

    /// Split on character boundaries so every chunk is valid UTF-8 on its own.
    fn text_chunks<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if text.is_empty() {
            return Vec::new();
        }
        if self.chunk_size == 0 {
            return vec![text];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        for (index, ch) in text.char_indices() {
            let end = index + ch.len_utf8();
            if end - start > self.chunk_size && index > start {
                chunks.push(&text[start..index]);
                start = index;
            }
        }
        chunks.push(&text[start..]);
        chunks
    }
}

fn write_head(out: &mut Vec<u8>, major: u8, argument: u64) {
    let major = major << 5;
    if argument < 24 {
        out.push(major | argument as u8);
    } else if let Ok(n) = u8::try_from(argument) {
        out.extend_from_slice(&[major | 24, n]);
    } else if let Ok(n) = u16::try_from(argument) {
        out.push(major | 25);
        out.extend_from_slice(&n.to_be_bytes());
    } else if let Ok(n) = u32::try_from(argument) {
        out.push(major | 26);
        out.extend_from_slice(&n.to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&argument.to_be_bytes());
    }
}

fn write_float(out: &mut Vec<u8>, value: f64) {
    if value.is_nan() {
        out.extend_from_slice(&[0xf9, 0x7e, 0x00]);
    } else if f64::from(value as f32) == value {
        out.push(0xfa);
        out.extend_from_slice(&(value as f32).to_be_bytes());
    } else {
        out.push(0xfb);
        out.extend_from_slice(&value.to_be_bytes());
    }
}
