use std::{error::Error, net::SocketAddr, time::Duration};

use coapum_ingest::{
    cbor::CONTENT_FORMAT_CBOR, helper::json_to_cbor, CoapMessage, MessageCode, MessageType,
};
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SERVER: &str = "127.0.0.1:5683";
const DEFAULT_PATH: &str = "sensor-values";
const DEFAULT_DOCUMENT: &str = r#"{"tempSensor": {"temperature": 21.5, "humidity": 55}}"#;

/// RFC 7252 ACK_TIMEOUT and MAX_RETRANSMIT
const ACK_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_RETRANSMIT: u32 = 4;

/// Posts a JSON document, converted to CBOR, as a confirmable request.
///
/// Usage: `coapum-ingest-client [server] [path] [json]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let server: SocketAddr = args
        .next()
        .unwrap_or_else(|| DEFAULT_SERVER.to_string())
        .parse()?;
    let path = args.next().unwrap_or_else(|| DEFAULT_PATH.to_string());
    let document = args.next().unwrap_or_else(|| DEFAULT_DOCUMENT.to_string());

    let mut request = CoapMessage::new(MessageType::Confirmable, MessageCode::POST, rand::random());
    request.token = rand::random::<[u8; 4]>().to_vec();
    request.set_uri_path(&path);
    request.set_content_format(CONTENT_FORMAT_CBOR);
    request.payload = json_to_cbor(&document)?;
    let datagram = request.encode()?;

    let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;

    let mut buf = vec![0u8; 1500];
    let mut wait = ACK_TIMEOUT;
    for attempt in 0..=MAX_RETRANSMIT {
        if attempt > 0 {
            warn!("No response after {:?}, retransmitting", wait / 2);
        }
        info!(
            "POST /{} to {} ({} byte payload)",
            path.trim_start_matches('/'),
            server,
            request.payload.len()
        );
        socket.send(&datagram).await?;

        let deadline = tokio::time::Instant::now() + wait;
        while let Ok(received) = tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
            let len = received?;
            let response = match CoapMessage::decode(&buf[..len]) {
                Ok(response) => response,
                Err(err) => {
                    warn!("Ignoring malformed response: {}", err);
                    continue;
                }
            };

            if response.message_type == MessageType::Reset
                && response.message_id == request.message_id
            {
                println!("Reset");
                return Ok(());
            }
            if response.token == request.token {
                println!("{}", response.code);
                return Ok(());
            }
        }
        wait *= 2;
    }

    Err(format!("No response from {}", server).into())
}

