//! Request processing
//!
//! [`IngestService`] takes a routed, deduplicated request through the
//! pipeline (validate, decode, map, submit) and yields the response code.
//! It is a [`tower::Service`] so the listener can drive it, and so it can be
//! wrapped with ordinary tower middleware.

use std::{
    convert::Infallible,
    net::SocketAddr,
    task::{Context, Poll},
};

use coapum_cbor::{decode_with_limits, DecodeLimits};
use futures::future::{ready, Ready};
use time::OffsetDateTime;
use tower::Service;
use tracing::{debug, warn};

use crate::config::ListenerConfig;
use crate::error::RequestError;
use crate::ingest::Ingest;
use crate::mapper::{map_readings, MapperOptions};
use crate::message::{CoapMessage, MessageCode};
use crate::router::RequestRouter;

/// A parsed request together with where and when it arrived
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub message: CoapMessage,
    pub source: SocketAddr,
    pub received_at: OffsetDateTime,
}

impl InboundRequest {
    pub fn new(message: CoapMessage, source: SocketAddr) -> Self {
        Self {
            message,
            source,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestService<I> {
    router: RequestRouter,
    limits: DecodeLimits,
    mapper: MapperOptions,
    ingest: I,
}

impl<I: Ingest> IngestService<I> {
    pub fn new(config: &ListenerConfig, ingest: I) -> Self {
        Self {
            router: RequestRouter::new(config),
            limits: config.decode_limits(),
            mapper: MapperOptions::from_config(config),
            ingest,
        }
    }

    pub fn ingest(&self) -> &I {
        &self.ingest
    }

    /// Run the pipeline, returning the number of readings handed over
    pub fn process(&self, request: &InboundRequest) -> Result<usize, RequestError> {
        let payload = self.router.route(&request.message)?;
        let root = decode_with_limits(payload, self.limits)?;
        let readings = map_readings(&root, &self.mapper, request.received_at)?;

        let count = readings.len();
        self.ingest.submit(readings)?;
        Ok(count)
    }

    /// Run the pipeline and turn the outcome into a response code
    pub fn handle(&self, request: &InboundRequest) -> MessageCode {
        match self.process(request) {
            Ok(count) => {
                debug!(
                    "Accepted {} readings from {} (token {})",
                    count,
                    request.source,
                    request.message.token_hex()
                );
                MessageCode::CHANGED
            }
            Err(err) => {
                log_failure(request, &err);
                err.response_code()
            }
        }
    }
}

fn log_failure(request: &InboundRequest, err: &RequestError) {
    let message = &request.message;
    match err {
        RequestError::Protocol(_) => {
            warn!(
                "Rejected {} to a {} segment path from {}: {}",
                message.code,
                message.uri_path().len(),
                request.source,
                err
            );
        }
        RequestError::Decode(decode) => {
            warn!(
                "Undecodable {} byte payload from {} (offset {:?}): {}",
                message.payload.len(),
                request.source,
                decode.offset(),
                err
            );
        }
        RequestError::Schema(_) => {
            warn!(
                "Unexpected {} byte payload from {}: {}",
                message.payload.len(),
                request.source,
                err
            );
        }
        RequestError::Backpressure(_) => {
            warn!("Unable to ingest readings from {}: {}", request.source, err);
        }
    }
}

impl<I: Ingest> Service<InboundRequest> for IngestService<I> {
    type Response = MessageCode;
    /// Failures become 4.xx/5.xx codes, so the service itself never fails
    type Error = Infallible;
    type Future = Ready<Result<MessageCode, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: InboundRequest) -> Self::Future {
        ready(Ok(self.handle(&request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::MemoryIngest;
    use crate::message::{option, MessageType};
    use crate::test_utils::LogCapture;
    use coapum_cbor::{encode, CborValue};
    use tower::ServiceExt;

    fn config() -> ListenerConfig {
        ListenerConfig {
            resource_path: "sensors".to_string(),
            ..Default::default()
        }
    }

    fn request(payload: Vec<u8>) -> InboundRequest {
        let mut message = CoapMessage::new(MessageType::Confirmable, MessageCode::POST, 1);
        message.set_uri_path("sensors");
        message.set_content_format(60);
        message.payload = payload;
        InboundRequest::new(message, "127.0.0.1:5000".parse().unwrap())
    }

    // {"tempSensor": {"temperature": 21.5, "humidity": 55}}
    fn temp_sensor() -> Vec<u8> {
        let mut payload = vec![0xa1, 0x6a];
        payload.extend_from_slice(b"tempSensor");
        payload.extend_from_slice(&[0xa2, 0x6b]);
        payload.extend_from_slice(b"temperature");
        payload.extend_from_slice(&[0xf9, 0x4d, 0x60, 0x68]);
        payload.extend_from_slice(b"humidity");
        payload.extend_from_slice(&[0x18, 0x37]);
        payload
    }

    #[tokio::test]
    async fn test_accepted_payload() {
        let ingest = MemoryIngest::new();
        let service = IngestService::new(&config(), ingest.clone());

        let code = service.oneshot(request(temp_sensor())).await.unwrap();
        assert_eq!(code, MessageCode::CHANGED);

        let readings = ingest.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].asset, "tempSensor");
        assert_eq!(readings[0].datapoints.len(), 2);
    }

    #[test]
    fn test_failure_codes() {
        let service = IngestService::new(&config(), MemoryIngest::new());

        // Truncated map
        assert_eq!(
            service.handle(&request(vec![0xa1, 0x61])),
            MessageCode::BAD_REQUEST
        );
        // Array root
        assert_eq!(
            service.handle(&request(vec![0x81, 0x01])),
            MessageCode::BAD_REQUEST
        );
        // Empty payload
        assert_eq!(service.handle(&request(vec![])), MessageCode::BAD_REQUEST);

        let mut get = request(temp_sensor());
        get.message.code = MessageCode::GET;
        assert_eq!(service.handle(&get), MessageCode::METHOD_NOT_ALLOWED);

        let mut json = request(temp_sensor());
        json.message.options.retain(|o| o.number != option::CONTENT_FORMAT);
        json.message.set_content_format(50);
        assert_eq!(service.handle(&json), MessageCode::UNSUPPORTED_CONTENT_FORMAT);

        assert!(service.ingest().is_empty());
    }

    #[test]
    fn test_backpressure() {
        let service = IngestService::new(&config(), MemoryIngest::with_capacity(0));
        assert_eq!(
            service.process(&request(temp_sensor())),
            Err(RequestError::Backpressure(
                crate::error::IngestError::QueueFull
            ))
        );
        assert_eq!(
            service.handle(&request(temp_sensor())),
            MessageCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_rejections_keep_device_text_out_of_logs() {
        let (logs, _guard) = LogCapture::install();
        let service = IngestService::new(&config(), MemoryIngest::new());
        let forged = "x\nERROR forged log line: admin login ok";

        // Asset whose value is not a map
        let payload = encode(&CborValue::Map(vec![(
            CborValue::from(forged),
            CborValue::from("v"),
        )]));
        assert_eq!(service.handle(&request(payload)), MessageCode::BAD_REQUEST);

        // Unknown path
        let mut elsewhere = request(temp_sensor());
        elsewhere.message.set_uri_path(forged);
        assert_eq!(service.handle(&elsewhere), MessageCode::NOT_FOUND);

        // Unparseable timestamp falls back to receipt time
        let payload = encode(&CborValue::Map(vec![(
            CborValue::from("tempSensor"),
            CborValue::Map(vec![
                (CborValue::from("timestamp"), CborValue::from(forged)),
                (CborValue::from("humidity"), CborValue::Unsigned(55)),
            ]),
        )]));
        assert_eq!(service.handle(&request(payload)), MessageCode::CHANGED);

        let out = logs.contents();
        assert!(out.contains("Schema mismatch"), "{}", out);
        assert!(out.contains("Unusable text string timestamp"), "{}", out);
        assert!(!out.contains("forged log line"), "{}", out);
        assert!(!out.contains("admin login"), "{}", out);
    }

    #[test]
    fn test_empty_map_is_accepted() {
        let service = IngestService::new(&config(), MemoryIngest::new());
        assert_eq!(service.process(&request(vec![0xa0])), Ok(0));
    }
}
