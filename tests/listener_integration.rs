//! End-to-end listener tests
//!
//! Each test binds a real listener on an ephemeral loopback port and talks
//! to it over UDP the way a device would.

use std::{net::SocketAddr, time::Duration};

use coapum_ingest::{
    cbor::{encode, CborValue},
    message::option,
    test_utils::{
        create_post, loopback_config, nested_payload, post_datagram, temp_sensor_payload,
    },
    CoapMessage, DatapointValue, IngestQueue, Listener, ListenerConfig, ListenerError,
    MessageCode, MessageType, PayloadSchema, Reading,
};
use tokio::{
    net::UdpSocket,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tracing_subscriber::EnvFilter;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_TIMEOUT: Duration = Duration::from_millis(300);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    client: UdpSocket,
    readings: mpsc::Receiver<Reading>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), ListenerError>>,
}

impl Harness {
    async fn start(config: ListenerConfig) -> Self {
        init_tracing();

        let (ingest, readings) = IngestQueue::new(config.ingest_queue_capacity);
        let listener = Listener::bind(config, ingest).await.unwrap();
        let server: SocketAddr = listener.local_addr().unwrap();

        let (shutdown, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(listener.run(async move {
            let _ = stopped.await;
        }));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.connect(server).await.unwrap();

        Self {
            client,
            readings,
            shutdown,
            task,
        }
    }

    async fn send(&self, datagram: &[u8]) {
        self.client.send(datagram).await.unwrap();
    }

    async fn receive(&self, wait: Duration) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; 1500];
        match timeout(wait, self.client.recv(&mut buf)).await {
            Ok(Ok(len)) => Some(buf[..len].to_vec()),
            Ok(Err(err)) => panic!("receive failed: {}", err),
            Err(_) => None,
        }
    }

    /// Send a message and return the raw response
    async fn exchange_raw(&self, datagram: &[u8]) -> Vec<u8> {
        self.send(datagram).await;
        self.receive(RESPONSE_TIMEOUT)
            .await
            .expect("listener responded")
    }

    async fn exchange(&self, message: &CoapMessage) -> CoapMessage {
        let response = self.exchange_raw(&message.encode().unwrap()).await;
        CoapMessage::decode(&response).unwrap()
    }

    async fn expect_silence(&self, datagram: &[u8]) {
        self.send(datagram).await;
        assert_eq!(self.receive(SILENCE_TIMEOUT).await, None);
    }

    async fn next_reading(&mut self) -> Reading {
        timeout(RESPONSE_TIMEOUT, self.readings.recv())
            .await
            .expect("reading delivered")
            .expect("queue open")
    }

    fn assert_no_readings(&mut self) {
        assert!(self.readings.try_recv().is_err(), "unexpected reading");
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let result = timeout(RESPONSE_TIMEOUT, self.task).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}

#[tokio::test]
async fn test_temp_sensor_reading_is_ingested() {
    let mut harness = Harness::start(loopback_config("/sensors")).await;

    let request = create_post("sensors", 0x2001, temp_sensor_payload());
    let response = harness.exchange(&request).await;

    assert_eq!(response.message_type, MessageType::Acknowledgement);
    assert_eq!(response.code, MessageCode::CHANGED);
    assert_eq!(response.message_id, 0x2001);
    assert_eq!(response.token, request.token);
    assert!(response.payload.is_empty());

    let reading = harness.next_reading().await;
    assert_eq!(reading.asset, "tempSensor");
    assert_eq!(
        reading.datapoints.get("temperature"),
        Some(&DatapointValue::Float(21.5))
    );
    assert_eq!(
        reading.datapoints.get("humidity"),
        Some(&DatapointValue::Integer(55))
    );
    harness.assert_no_readings();

    harness.stop().await;
}

#[tokio::test]
async fn test_array_root_is_bad_request() {
    let mut harness = Harness::start(loopback_config("sensors")).await;

    let payload = encode(&CborValue::Array(vec![CborValue::Unsigned(1)]));
    let response = harness.exchange(&create_post("sensors", 1, payload)).await;

    assert_eq!(response.code, MessageCode::BAD_REQUEST);
    harness.assert_no_readings();
    harness.stop().await;
}

#[tokio::test]
async fn test_unsupported_version_is_dropped_and_listener_keeps_serving() {
    let mut harness = Harness::start(loopback_config("sensors")).await;

    let mut datagram = post_datagram("sensors", 2, temp_sensor_payload());
    datagram[0] = (datagram[0] & 0x3f) | 0x80;
    harness.expect_silence(&datagram).await;

    // Garbage is dropped too
    harness.expect_silence(&[0x40, 0x02]).await;
    harness.assert_no_readings();

    let response = harness
        .exchange(&create_post("sensors", 3, temp_sensor_payload()))
        .await;
    assert_eq!(response.code, MessageCode::CHANGED);
    assert_eq!(harness.next_reading().await.asset, "tempSensor");

    harness.stop().await;
}

#[tokio::test]
async fn test_retransmission_is_ingested_once() {
    let mut harness = Harness::start(loopback_config("sensors")).await;

    let datagram = post_datagram("sensors", 0x0bad, temp_sensor_payload());
    let first = harness.exchange_raw(&datagram).await;
    let second = harness.exchange_raw(&datagram).await;

    assert_eq!(first, second);
    assert_eq!(
        CoapMessage::decode(&second).unwrap().code,
        MessageCode::CHANGED
    );

    harness.next_reading().await;
    harness.assert_no_readings();
    harness.stop().await;
}

#[tokio::test]
async fn test_rejected_requests() {
    let harness = Harness::start(loopback_config("sensors")).await;

    let response = harness
        .exchange(&create_post("elsewhere", 1, temp_sensor_payload()))
        .await;
    assert_eq!(response.code, MessageCode::NOT_FOUND);

    let mut get = create_post("sensors", 2, Vec::new());
    get.code = MessageCode::GET;
    let response = harness.exchange(&get).await;
    assert_eq!(response.code, MessageCode::METHOD_NOT_ALLOWED);

    let mut json = create_post("sensors", 3, br#"{"a":{}}"#.to_vec());
    json.options.retain(|o| o.number != option::CONTENT_FORMAT);
    json.set_content_format(50);
    let response = harness.exchange(&json).await;
    assert_eq!(response.code, MessageCode::UNSUPPORTED_CONTENT_FORMAT);

    harness.stop().await;
}

#[tokio::test]
async fn test_depth_limit() {
    let mut harness = Harness::start(loopback_config("sensors")).await;

    let response = harness
        .exchange(&create_post("sensors", 1, nested_payload(64)))
        .await;
    assert_eq!(response.code, MessageCode::BAD_REQUEST);
    harness.assert_no_readings();

    let response = harness
        .exchange(&create_post("sensors", 2, nested_payload(8)))
        .await;
    assert_eq!(response.code, MessageCode::CHANGED);
    assert_eq!(harness.next_reading().await.asset, "a");

    harness.stop().await;
}

#[tokio::test]
async fn test_size_limit() {
    let mut harness = Harness::start(ListenerConfig {
        max_payload_bytes: 64,
        ..loopback_config("sensors")
    })
    .await;

    // Well-formed CBOR, only the size is wrong with it
    let oversized = encode(&CborValue::Map(vec![(
        CborValue::from("tempSensor"),
        CborValue::Map(vec![(
            CborValue::from("label"),
            CborValue::from("x".repeat(80).as_str()),
        )]),
    )]));
    assert!(oversized.len() > 64);
    let response = harness
        .exchange_raw(&post_datagram("sensors", 1, oversized))
        .await;
    assert_eq!(
        CoapMessage::decode(&response).unwrap().code,
        MessageCode::BAD_REQUEST
    );
    harness.assert_no_readings();

    let response = harness
        .exchange(&create_post("sensors", 2, temp_sensor_payload()))
        .await;
    assert_eq!(response.code, MessageCode::CHANGED);
    assert_eq!(harness.next_reading().await.asset, "tempSensor");

    harness.stop().await;
}

#[tokio::test]
async fn test_full_queue_is_service_unavailable() {
    let mut harness = Harness::start(ListenerConfig {
        ingest_queue_capacity: 1,
        ..loopback_config("sensors")
    })
    .await;

    let response = harness
        .exchange(&create_post("sensors", 1, temp_sensor_payload()))
        .await;
    assert_eq!(response.code, MessageCode::CHANGED);

    let response = harness
        .exchange(&create_post("sensors", 2, temp_sensor_payload()))
        .await;
    assert_eq!(response.code, MessageCode::SERVICE_UNAVAILABLE);

    // Once the consumer catches up the device's next attempt goes through
    harness.next_reading().await;
    let response = harness
        .exchange(&create_post("sensors", 3, temp_sensor_payload()))
        .await;
    assert_eq!(response.code, MessageCode::CHANGED);

    harness.stop().await;
}

#[tokio::test]
async fn test_non_confirmable_request() {
    let mut harness = Harness::start(loopback_config("sensors")).await;

    let mut request = create_post("sensors", 0x4444, temp_sensor_payload());
    request.message_type = MessageType::NonConfirmable;
    let response = harness.exchange(&request).await;

    assert_eq!(response.message_type, MessageType::NonConfirmable);
    assert_eq!(response.code, MessageCode::CHANGED);
    assert_eq!(response.token, request.token);
    harness.next_reading().await;

    harness.stop().await;
}

#[tokio::test]
async fn test_ping_is_reset() {
    let harness = Harness::start(loopback_config("sensors")).await;

    let response = harness.exchange_raw(&[0x40, 0x00, 0xab, 0xcd]).await;
    assert_eq!(response, vec![0x70, 0x00, 0xab, 0xcd]);

    harness.stop().await;
}

#[tokio::test]
async fn test_envelope_schema() {
    let mut harness = Harness::start(ListenerConfig {
        schema: PayloadSchema::Envelope,
        ..loopback_config("sensor-values")
    })
    .await;

    let payload = coapum_ingest::helper::json_to_cbor(
        r#"{
            "timestamp": "2017-01-02T01:02:03.23232Z",
            "asset": "sensor1",
            "key": "80a43623-ebe5-40d6-8d80-3f892da9b3b4",
            "readings": {"velocity": "500", "temperature": {"value": "32", "unit": "kelvin"}}
        }"#,
    )
    .unwrap();
    let response = harness
        .exchange(&create_post("sensor-values", 1, payload))
        .await;
    assert_eq!(response.code, MessageCode::CHANGED);

    let reading = harness.next_reading().await;
    assert_eq!(reading.asset, "sensor1");
    assert_eq!(reading.timestamp.year(), 2017);
    assert_eq!(reading.datapoints.len(), 2);

    let payload =
        coapum_ingest::helper::json_to_cbor(r#"{"asset": "sensor2", "readings": "500"}"#)
            .unwrap();
    let response = harness
        .exchange(&create_post("sensor-values", 2, payload))
        .await;
    assert_eq!(response.code, MessageCode::BAD_REQUEST);
    harness.assert_no_readings();

    harness.stop().await;
}
