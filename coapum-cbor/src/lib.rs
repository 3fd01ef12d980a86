//! # CoAPum CBOR - bounded CBOR decoding for sensor payloads
//!
//! A small implementation of the [RFC 8949](https://www.rfc-editor.org/rfc/rfc8949)
//! core data model aimed at untrusted input arriving from constrained devices.
//!
//! ## Features
//!
//! - **Generic value tree**: [`CborValue`] covers every major type, with tags kept opaque
//! - **Bounded decoding**: nesting depth and input size limits via [`DecodeLimits`]
//! - **No blind allocation**: declared lengths are checked against the remaining input
//! - **Indefinite lengths**: chunked strings are concatenated, streamed arrays and maps supported
//! - **Encoder**: minimal-width heads, optional indefinite-length output
//!
//! ## Quick Start
//!
//! ```rust
//! use coapum_cbor::{decode_with_limits, encode, CborValue, DecodeLimits};
//!
//! let value = CborValue::Map(vec![("temperature".into(), CborValue::Float(21.5))]);
//! let bytes = encode(&value);
//!
//! let limits = DecodeLimits { max_depth: 4, max_bytes: 1024 };
//! assert_eq!(decode_with_limits(&bytes, limits).unwrap(), value);
//! ```

pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

pub use decode::{decode, decode_with_limits, DecodeLimits, DEFAULT_MAX_BYTES, DEFAULT_MAX_DEPTH};
pub use encode::{encode, Encoder};
pub use error::{CborError, Result};
pub use value::CborValue;

/// CoAP Content-Format identifier registered for `application/cbor`
pub const CONTENT_FORMAT_CBOR: u16 = 60;
