//! Request validation
//!
//! Only one resource is served: POST to the configured path, carrying CBOR.
//! Everything else is rejected with the matching 4.xx code before the
//! payload is looked at.

use coapum_cbor::CONTENT_FORMAT_CBOR;
use thiserror::Error;

use crate::config::ListenerConfig;
use crate::message::{CoapMessage, MessageCode};

/// Why a well-formed request was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("resource not found")]
    NotFound,

    #[error("unsupported content format")]
    UnsupportedContentFormat,
}

impl Rejection {
    pub fn response_code(self) -> MessageCode {
        match self {
            Self::MethodNotAllowed => MessageCode::METHOD_NOT_ALLOWED,
            Self::NotFound => MessageCode::NOT_FOUND,
            Self::UnsupportedContentFormat => MessageCode::UNSUPPORTED_CONTENT_FORMAT,
        }
    }
}

/// Validates requests against the configured resource
#[derive(Debug, Clone)]
pub struct RequestRouter {
    segments: Vec<String>,
    enforce_content_format: bool,
}

impl RequestRouter {
    pub fn new(config: &ListenerConfig) -> Self {
        Self {
            segments: config.resource_segments(),
            enforce_content_format: config.enforce_content_format,
        }
    }

    /// Check method, path and content format in that order, yielding the
    /// payload of an accepted request.
    pub fn route<'m>(&self, message: &'m CoapMessage) -> Result<&'m [u8], Rejection> {
        if message.code != MessageCode::POST {
            return Err(Rejection::MethodNotAllowed);
        }

        if !self.matches_path(message) {
            return Err(Rejection::NotFound);
        }

        if self.enforce_content_format {
            match message.content_format() {
                // Absent Content-Format is taken as CBOR
                None => {}
                Some(Some(format)) if format == u32::from(CONTENT_FORMAT_CBOR) => {}
                Some(_) => return Err(Rejection::UnsupportedContentFormat),
            }
        }

        Ok(&message.payload)
    }

    /// Exact, case-sensitive, segment by segment
    fn matches_path(&self, message: &CoapMessage) -> bool {
        let path = message.uri_path();
        path.len() == self.segments.len()
            && path
                .iter()
                .zip(&self.segments)
                .all(|(segment, expected)| *segment == expected.as_bytes())
    }
}

/// One-shot form of [`RequestRouter::route`]
pub fn route<'m>(message: &'m CoapMessage, config: &ListenerConfig) -> Result<&'m [u8], Rejection> {
    RequestRouter::new(config).route(message)
}
