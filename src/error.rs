//! Error types for the listener
//!
//! Per-datagram failures never escape the listener loop: each kind maps to
//! a response code (or to a silent drop) through [`RequestError::response_code`].
//! Only [`ListenerError`] is ever returned to the caller of the loop.

use std::{io, net::SocketAddr, path::PathBuf};

use coapum_cbor::CborError;
use thiserror::Error;

use crate::message::MessageCode;
use crate::router::Rejection;

/// A datagram that cannot be parsed as a CoAP message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Message shorter than the 4 byte header ({len} bytes)")]
    TruncatedHeader { len: usize },

    #[error("Unsupported CoAP version {0}")]
    UnsupportedVersion(u8),

    #[error("Token length {0} exceeds 8")]
    InvalidTokenLength(u8),

    #[error("Token runs past the end of the message")]
    TruncatedToken,

    #[error("Reserved option nibble 15 at offset {offset}")]
    ReservedOptionNibble { offset: usize },

    #[error("Option at offset {offset} overruns the message")]
    OptionOverrun { offset: usize },

    #[error("Option number {number} exceeds 65535")]
    OptionNumberOverflow { number: u32 },

    #[error("Payload marker not followed by a payload")]
    EmptyPayload,

    #[error("Empty message carries token, options or payload")]
    NonEmptyEmptyMessage,

    #[error("Option {number} value of {len} bytes is too long to encode")]
    OptionTooLong { number: u16, len: usize },
}

/// The decoded payload does not have the expected reading structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Schema mismatch: payload root must be a map, got {found}")]
    RootNotMap { found: &'static str },

    #[error("Schema mismatch: asset names must be text strings, got {found}")]
    AssetNameNotText { found: &'static str },

    /// `index` is the asset's position in the root map. The name itself is
    /// device-supplied and stays out of the message.
    #[error("Schema mismatch: value of asset #{index} must be a map, got {found}")]
    AssetNotMap { index: usize, found: &'static str },

    #[error("Schema mismatch: missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Schema mismatch: field '{field}' must be a {expected}, got {found}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Schema mismatch: datapoint keys must be text or integers, got {found}")]
    InvalidDatapointKey { found: &'static str },
}

/// The ingestion collaborator cannot take the readings right now
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestError {
    #[error("Ingestion queue is full")]
    QueueFull,

    #[error("Ingestion queue is closed")]
    Closed,
}

/// Every way a well-formed request can fail
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Protocol violation: {0}")]
    Protocol(#[from] Rejection),

    #[error("Decode failure: {0}")]
    Decode(#[from] CborError),

    #[error(transparent)]
    Schema(#[from] MappingError),

    #[error("Backpressure: {0}")]
    Backpressure(#[from] IngestError),
}

impl RequestError {
    /// Response code sent back to the device for this failure
    pub fn response_code(&self) -> MessageCode {
        match self {
            Self::Protocol(rejection) => rejection.response_code(),
            Self::Decode(_) | Self::Schema(_) => MessageCode::BAD_REQUEST,
            Self::Backpressure(_) => MessageCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Invalid listener configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Fatal listener errors, reported to whoever manages the service lifecycle
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Unable to bind CoAP listener to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Listener I/O error: {0}")]
    Io(#[from] io::Error),
}
