//! CoAP message framing
//!
//! Pure parse/serialize pair over byte slices for the RFC 7252 message
//! layout: a 4 byte header (version, type, token length, code, message ID),
//! the token, delta-encoded options and an optional payload behind a 0xFF
//! marker. Header fields are extracted explicitly so the codec does not
//! depend on platform endianness or alignment.

use crate::error::MessageError;

mod code;
pub mod option;

pub use code::MessageCode;
pub use option::CoapOption;

/// The only protocol version defined by RFC 7252
pub const VERSION: u8 = 1;

pub const MAX_TOKEN_LENGTH: usize = 8;

const HEADER_LENGTH: usize = 4;
const PAYLOAD_MARKER: u8 = 0xff;

/// Largest delta or length expressible with the 16-bit extended form
const MAX_EXTENDED: usize = 65535 + 269;

/// Message reliability class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }
}

/// A decoded CoAP message.
///
/// An empty payload means no payload; the marker is only written for a
/// non-empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage {
    pub version: u8,
    pub message_type: MessageType,
    pub code: MessageCode,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl CoapMessage {
    pub fn new(message_type: MessageType, code: MessageCode, message_id: u16) -> Self {
        Self {
            version: VERSION,
            message_type,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Parse a single datagram.
    ///
    /// # Example
    ///
    /// ```
    /// use coapum_ingest::message::{CoapMessage, MessageCode, MessageType};
    ///
    /// // CON POST, message ID 0x1234, no token, Uri-Path "a", payload [0x01]
    /// let bytes = [0x40, 0x02, 0x12, 0x34, 0xb1, b'a', 0xff, 0x01];
    /// let message = CoapMessage::decode(&bytes).unwrap();
    /// assert_eq!(message.message_type, MessageType::Confirmable);
    /// assert_eq!(message.code, MessageCode::POST);
    /// assert_eq!(message.uri_path(), vec![&b"a"[..]]);
    /// assert_eq!(message.payload, vec![0x01]);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(MessageError::TruncatedHeader { len: bytes.len() });
        }

        let version = bytes[0] >> 6;
        if version != VERSION {
            return Err(MessageError::UnsupportedVersion(version));
        }

        let message_type = MessageType::from_bits(bytes[0] >> 4);
        let token_length = bytes[0] & 0x0f;
        if usize::from(token_length) > MAX_TOKEN_LENGTH {
            return Err(MessageError::InvalidTokenLength(token_length));
        }

        let code = MessageCode(bytes[1]);
        let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);

        let mut pos = HEADER_LENGTH;
        let token = bytes
            .get(pos..pos + usize::from(token_length))
            .ok_or(MessageError::TruncatedToken)?
            .to_vec();
        pos += token.len();

        let mut message = Self {
            version,
            message_type,
            code,
            message_id,
            token,
            options: Vec::new(),
            payload: Vec::new(),
        };

        if code.is_empty() {
            if bytes.len() != HEADER_LENGTH {
                return Err(MessageError::NonEmptyEmptyMessage);
            }
            return Ok(message);
        }

        let mut number: u32 = 0;
        while pos < bytes.len() {
            let offset = pos;
            let head = bytes[pos];
            pos += 1;

            if head == PAYLOAD_MARKER {
                if pos == bytes.len() {
                    return Err(MessageError::EmptyPayload);
                }
                message.payload = bytes[pos..].to_vec();
                break;
            }

            // Delta extension bytes come before length extension bytes
            let delta = read_extended(head >> 4, bytes, &mut pos, offset)?;
            let length = read_extended(head & 0x0f, bytes, &mut pos, offset)?;

            number += delta;
            let option_number = u16::try_from(number)
                .map_err(|_| MessageError::OptionNumberOverflow { number })?;

            let value = bytes
                .get(pos..pos + length as usize)
                .ok_or(MessageError::OptionOverrun { offset })?;
            pos += value.len();

            message
                .options
                .push(CoapOption::new(option_number, value.to_vec()));
        }

        Ok(message)
    }

    /// Serialize to a datagram. Options are written in ascending number
    /// order, repeated options keeping their relative order.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        if self.token.len() > MAX_TOKEN_LENGTH {
            return Err(MessageError::InvalidTokenLength(self.token.len() as u8));
        }

        let mut out = Vec::with_capacity(
            HEADER_LENGTH
                + self.token.len()
                + self.options.iter().map(|o| o.value.len() + 5).sum::<usize>()
                + self.payload.len()
                + 1,
        );

        out.push(
            ((self.version & 0b11) << 6)
                | (self.message_type.bits() << 4)
                | self.token.len() as u8,
        );
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut options: Vec<&CoapOption> = self.options.iter().collect();
        options.sort_by_key(|o| o.number);

        let mut previous = 0u16;
        for option in options {
            if option.value.len() > MAX_EXTENDED {
                return Err(MessageError::OptionTooLong {
                    number: option.number,
                    len: option.value.len(),
                });
            }

            let (delta_nibble, delta_ext) = split_extended(usize::from(option.number - previous));
            let (length_nibble, length_ext) = split_extended(option.value.len());

            out.push((delta_nibble << 4) | length_nibble);
            out.extend_from_slice(delta_ext.as_slice());
            out.extend_from_slice(length_ext.as_slice());
            out.extend_from_slice(&option.value);

            previous = option.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }

        Ok(out)
    }

    pub fn add_option(&mut self, number: u16, value: impl Into<Vec<u8>>) {
        self.options.push(CoapOption::new(number, value));
    }

    /// Value of the first option with this number
    pub fn option(&self, number: u16) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|o| o.number == number)
            .map(|o| o.value.as_slice())
    }

    /// Uri-Path segments in order
    pub fn uri_path(&self) -> Vec<&[u8]> {
        self.options
            .iter()
            .filter(|o| o.number == option::URI_PATH)
            .map(|o| o.value.as_slice())
            .collect()
    }

    /// Replace the Uri-Path options with the segments of `path`
    pub fn set_uri_path(&mut self, path: &str) {
        self.options.retain(|o| o.number != option::URI_PATH);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.add_option(option::URI_PATH, segment.as_bytes());
        }
    }

    pub fn set_content_format(&mut self, format: u16) {
        self.options.retain(|o| o.number != option::CONTENT_FORMAT);
        self.options
            .push(CoapOption::uint(option::CONTENT_FORMAT, u32::from(format)));
    }

    /// Content-Format option: `None` when absent, `Some(None)` when the value
    /// is too long to be a uint.
    pub fn content_format(&self) -> Option<Option<u32>> {
        self.option(option::CONTENT_FORMAT).map(option::decode_uint)
    }

    pub fn token_hex(&self) -> String {
        self.token.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Decode a 4-bit delta/length field with its extension bytes
fn read_extended(
    nibble: u8,
    bytes: &[u8],
    pos: &mut usize,
    offset: usize,
) -> Result<u32, MessageError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            let b = *bytes.get(*pos).ok_or(MessageError::OptionOverrun { offset })?;
            *pos += 1;
            Ok(u32::from(b) + 13)
        }
        14 => {
            let b = bytes
                .get(*pos..*pos + 2)
                .ok_or(MessageError::OptionOverrun { offset })?;
            *pos += 2;
            Ok(u32::from(u16::from_be_bytes([b[0], b[1]])) + 269)
        }
        _ => Err(MessageError::ReservedOptionNibble { offset }),
    }
}

/// Shortest nibble plus extension bytes for a delta or length
fn split_extended(value: usize) -> (u8, ExtendedBytes) {
    if value < 13 {
        (value as u8, ExtendedBytes::None)
    } else if value < 269 {
        (13, ExtendedBytes::One([(value - 13) as u8]))
    } else {
        (14, ExtendedBytes::Two(((value - 269) as u16).to_be_bytes()))
    }
}

enum ExtendedBytes {
    None,
    One([u8; 1]),
    Two([u8; 2]),
}

impl ExtendedBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::None => &[],
            Self::One(b) => b,
            Self::Two(b) => b,
        }
    }
}
