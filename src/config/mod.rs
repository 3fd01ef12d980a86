use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
    time::Duration,
};

use coapum_cbor::DecodeLimits;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default CoAP port (RFC 7252)
pub const DEFAULT_PORT: u16 = 5683;

/// Default resource accepting readings
pub const DEFAULT_RESOURCE_PATH: &str = "sensor-values";

/// EXCHANGE_LIFETIME from RFC 7252 section 4.8.2, in seconds
pub const DEFAULT_EXCHANGE_LIFETIME_SECS: u64 = 247;

/// How the decoded payload is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSchema {
    /// `{asset: {datapoint: value, ...}, ...}`, one reading per asset
    #[default]
    AssetMap,
    /// `{"asset": name, "timestamp": t, "readings": {datapoint: value, ...}}`
    Envelope,
}

/// Listener configuration. Immutable once the listener is bound; changing
/// it means binding a new listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Local address to bind
    pub bind_address: IpAddr,

    /// UDP port, 0 picks an ephemeral port
    pub port: u16,

    /// Resource path accepting readings, `/` separated
    pub resource_path: String,

    /// Reject requests whose Content-Format is present and not CBOR
    pub enforce_content_format: bool,

    /// Largest CBOR payload decoded
    pub max_payload_bytes: usize,

    /// Deepest nesting of arrays, maps and tags decoded
    pub max_cbor_depth: usize,

    /// Deduplication window
    pub exchange_lifetime_secs: u64,

    /// Most exchanges remembered at once
    pub max_exchanges: usize,

    /// Readings buffered towards the ingestion side before 5.03 is returned
    pub ingest_queue_capacity: usize,

    pub schema: PayloadSchema,

    /// Reserved key holding an asset's timestamp
    pub timestamp_key: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            resource_path: DEFAULT_RESOURCE_PATH.to_string(),
            enforce_content_format: true,
            max_payload_bytes: coapum_cbor::DEFAULT_MAX_BYTES,
            max_cbor_depth: coapum_cbor::DEFAULT_MAX_DEPTH,
            exchange_lifetime_secs: DEFAULT_EXCHANGE_LIFETIME_SECS,
            max_exchanges: 4096,
            ingest_queue_capacity: 1024,
            schema: PayloadSchema::default(),
            timestamp_key: "timestamp".to_string(),
        }
    }
}

impl ListenerConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_segments().is_empty() {
            return Err(ConfigError::invalid(
                "resource_path",
                "must contain at least one segment",
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::invalid("max_payload_bytes", "must be positive"));
        }
        if self.max_cbor_depth == 0 {
            return Err(ConfigError::invalid("max_cbor_depth", "must be positive"));
        }
        if self.exchange_lifetime_secs == 0 {
            return Err(ConfigError::invalid(
                "exchange_lifetime_secs",
                "must be positive",
            ));
        }
        if self.max_exchanges == 0 {
            return Err(ConfigError::invalid("max_exchanges", "must be positive"));
        }
        if self.ingest_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "ingest_queue_capacity",
                "must be positive",
            ));
        }
        if self.timestamp_key.is_empty() {
            return Err(ConfigError::invalid("timestamp_key", "must not be empty"));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Non-empty segments of the resource path
    pub fn resource_segments(&self) -> Vec<String> {
        self.resource_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn exchange_lifetime(&self) -> Duration {
        Duration::from_secs(self.exchange_lifetime_secs)
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_depth: self.max_cbor_depth,
            max_bytes: self.max_payload_bytes,
        }
    }
}
