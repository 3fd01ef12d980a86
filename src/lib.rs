//! Passive CoAP listener for CBOR sensor telemetry
//!
//! Devices POST a CBOR map of `{asset: {datapoint: value}}` to a single
//! resource. Each request is parsed, checked, decoded and mapped into
//! [`Reading`]s which are handed to an [`Ingest`] implementation, and the
//! device receives a 2.04 or the 4.xx/5.03 code explaining the refusal.
//!
//! ```no_run
//! use coapum_ingest::{serve, IngestQueue, ListenerConfig};
//!
//! # async fn run() -> Result<(), coapum_ingest::ListenerError> {
//! let config = ListenerConfig::default();
//! let (ingest, mut readings) = IngestQueue::new(config.ingest_queue_capacity);
//!
//! tokio::spawn(async move {
//!     while let Some(reading) = readings.recv().await {
//!         println!("{}", reading);
//!     }
//! });
//!
//! serve(config, ingest, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod helper;
pub mod ingest;
pub mod mapper;
pub mod message;
pub mod response;
pub mod router;
pub mod serve;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ListenerConfig, PayloadSchema};
pub use error::{
    ConfigError, IngestError, ListenerError, MappingError, MessageError, RequestError,
};
pub use exchange::{ExchangeKey, ExchangeState, ExchangeTracker, Observation};
pub use handler::{InboundRequest, IngestService};
pub use ingest::{Ingest, IngestQueue, MemoryIngest};
pub use mapper::{map_readings, DatapointValue, Datapoints, MapperOptions, Reading};
pub use message::{CoapMessage, CoapOption, MessageCode, MessageType};
pub use response::ResponseBuilder;
pub use router::{Rejection, RequestRouter};
pub use serve::{serve, Listener};

// Re-export the CBOR decoder
pub use coapum_cbor as cbor;
