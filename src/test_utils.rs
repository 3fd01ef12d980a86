//! Test utilities for building requests and datagrams
//!
//! Shared by the unit tests, the integration tests and the benchmarks.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{Arc, Mutex, PoisonError},
};

use coapum_cbor::{CborValue, CONTENT_FORMAT_CBOR};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::ListenerConfig;
use crate::handler::InboundRequest;
use crate::message::{CoapMessage, MessageCode, MessageType};

/// Source address used by the request builders
pub fn test_peer() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 49152))
}

/// Config bound to an ephemeral loopback port, serving `path`
pub fn loopback_config(path: &str) -> ListenerConfig {
    ListenerConfig {
        bind_address: Ipv4Addr::LOCALHOST.into(),
        port: 0,
        resource_path: path.to_string(),
        ..Default::default()
    }
}

/// Confirmable request with the given method, path and message ID
pub fn create_test_message(code: MessageCode, path: &str, message_id: u16) -> CoapMessage {
    let mut message = CoapMessage::new(MessageType::Confirmable, code, message_id);
    message.token = message_id.to_be_bytes().to_vec();
    message.set_uri_path(path);
    message
}

/// Confirmable POST carrying a CBOR payload
pub fn create_post(path: &str, message_id: u16, payload: Vec<u8>) -> CoapMessage {
    let mut message = create_test_message(MessageCode::POST, path, message_id);
    message.set_content_format(CONTENT_FORMAT_CBOR);
    message.payload = payload;
    message
}

/// Encoded form of [`create_post`]
pub fn post_datagram(path: &str, message_id: u16, payload: Vec<u8>) -> Vec<u8> {
    create_post(path, message_id, payload)
        .encode()
        .expect("test message encodes")
}

pub fn create_test_request(message: CoapMessage) -> InboundRequest {
    InboundRequest::new(message, test_peer())
}

/// `{"tempSensor": {"temperature": 21.5, "humidity": 55}}`
pub fn temp_sensor_payload() -> Vec<u8> {
    coapum_cbor::encode(&CborValue::Map(vec![(
        CborValue::from("tempSensor"),
        CborValue::Map(vec![
            (CborValue::from("temperature"), CborValue::Float(21.5)),
            (CborValue::from("humidity"), CborValue::Unsigned(55)),
        ]),
    )]))
}

/// `depth` nested single-element arrays around an integer, wrapped in an
/// asset map so only the depth is wrong with it
pub fn nested_payload(depth: usize) -> Vec<u8> {
    let mut payload = vec![0xa1, 0x61, b'a', 0xa1, 0x61, b'v'];
    payload.extend(std::iter::repeat_n(0x81, depth));
    payload.push(0x01);
    payload
}

/// Formatted log output collected in memory
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Capture every event on the current thread until the guard drops.
    /// Async tests must run on a current-thread runtime.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
