//! Error types for CBOR decoding

use thiserror::Error;

/// Result type alias for CBOR operations
pub type Result<T> = std::result::Result<T, CborError>;

/// Errors that can occur while decoding a CBOR item.
///
/// Offsets are byte positions into the decoded input so a failure can be
/// diagnosed without echoing the payload itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CborError {
    /// A head or length field demands more bytes than remain
    #[error("Truncated input at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        offset: usize,
        needed: u64,
        remaining: usize,
    },

    /// Arrays, maps and tags nested deeper than the configured maximum
    #[error("Nesting depth exceeds maximum of {max}")]
    DepthExceeded { max: usize },

    /// Reserved or unassigned initial byte
    #[error("Unsupported initial byte 0x{initial_byte:02x} at offset {offset}")]
    UnsupportedType { offset: usize, initial_byte: u8 },

    /// Input is larger than the configured byte budget
    #[error("Input of {len} bytes exceeds maximum of {max}")]
    InputTooLarge { len: usize, max: usize },

    /// Text string is not valid UTF-8
    #[error("Invalid UTF-8 in text string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Break byte outside of an indefinite-length item
    #[error("Unexpected break at offset {offset}")]
    UnexpectedBreak { offset: usize },

    /// Indefinite-length string chunk is not a definite string of the same major type
    #[error("Invalid indefinite-length string chunk at offset {offset}")]
    InvalidChunk { offset: usize },

    /// Bytes remain after the top-level item
    #[error("Trailing data after top-level item at offset {offset}")]
    TrailingData { offset: usize },
}

impl CborError {
    /// Offset at which decoding stopped, when the error carries one
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::TruncatedInput { offset, .. }
            | Self::UnsupportedType { offset, .. }
            | Self::InvalidUtf8 { offset }
            | Self::UnexpectedBreak { offset }
            | Self::InvalidChunk { offset }
            | Self::TrailingData { offset } => Some(*offset),
            Self::DepthExceeded { .. } | Self::InputTooLarge { .. } => None,
        }
    }
}
