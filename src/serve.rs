//! The UDP listener
//!
//! One task owns the socket, the exchange tracker and the response builder.
//! Datagrams are handled one at a time, start to finish, so none of that
//! state needs locking. Only a bind failure is fatal; everything that goes
//! wrong with an individual datagram is logged and the loop moves on.

use std::{
    future::Future,
    net::SocketAddr,
    time::Instant,
};

use time::OffsetDateTime;
use tokio::net::UdpSocket;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::exchange::{ExchangeKey, ExchangeTracker, Observation};
use crate::handler::{InboundRequest, IngestService};
use crate::ingest::Ingest;
use crate::message::{CoapMessage, MessageCode, MessageType};
use crate::response::ResponseBuilder;

/// Largest UDP payload
const BUF_SIZE: usize = 65535;

pub struct Listener<I: Ingest> {
    socket: UdpSocket,
    config: ListenerConfig,
    service: IngestService<I>,
    tracker: ExchangeTracker,
    responses: ResponseBuilder,
}

impl<I: Ingest> Listener<I> {
    /// Validate `config` and bind its address
    pub async fn bind(config: ListenerConfig, ingest: I) -> Result<Self, ListenerError> {
        config.validate()?;

        let addr = config.socket_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let local = socket.local_addr()?;
        info!(
            "CoAP listener started on port {} with uri {}",
            local.port(),
            config.resource_path
        );

        Ok(Self {
            socket,
            service: IngestService::new(&config, ingest),
            tracker: ExchangeTracker::from_config(&config),
            responses: ResponseBuilder::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ExchangeTracker {
        &self.tracker
    }

    /// Serve until `shutdown` resolves. The datagram being handled when it
    /// does is finished first.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), ListenerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; BUF_SIZE];

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping CoAP listener");
                    return Ok(());
                }
                recv = self.socket.recv_from(&mut buf) => match recv {
                    Ok((len, peer)) => {
                        if let Some(response) = self.handle_datagram(&buf[..len], peer).await {
                            if let Err(err) = self.socket.send_to(&response, peer).await {
                                error!("Unable to send response to {}: {}", peer, err);
                            }
                        }
                    }
                    Err(err) => {
                        error!("Error receiving datagram: {}", err);
                    }
                }
            }
        }
    }

    /// Process one datagram, returning the bytes to send back, if any
    pub async fn handle_datagram(&mut self, bytes: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        self.handle_datagram_at(bytes, peer, Instant::now(), OffsetDateTime::now_utc())
            .await
    }

    /// [`Listener::handle_datagram`] with an explicit clock
    pub async fn handle_datagram_at(
        &mut self,
        bytes: &[u8],
        peer: SocketAddr,
        now: Instant,
        received_at: OffsetDateTime,
    ) -> Option<Vec<u8>> {
        let message = match CoapMessage::decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                debug!(
                    "Dropping malformed {} byte datagram from {}: {}",
                    bytes.len(),
                    peer,
                    err
                );
                return None;
            }
        };

        debug!(
            "{:?} {} with {} path segments from {} (message ID {}, token {})",
            message.message_type,
            message.code,
            message.uri_path().len(),
            peer,
            message.message_id,
            message.token_hex()
        );

        if message.code.is_empty() {
            if message.message_type == MessageType::Confirmable {
                debug!("Answering ping from {} with a reset", peer);
                return encode(&self.responses.reset(&message));
            }
            return None;
        }

        match message.message_type {
            MessageType::Acknowledgement | MessageType::Reset => {
                debug!("Ignoring {:?} from {}", message.message_type, peer);
                return None;
            }
            MessageType::Confirmable if !message.code.is_request() => {
                warn!("Unexpected {} in a confirmable message from {}", message.code, peer);
                return encode(&self.responses.reset(&message));
            }
            MessageType::NonConfirmable if !message.code.is_request() => return None,
            _ => {}
        }

        let key = ExchangeKey::new(peer, message.message_id);
        if let Observation::Duplicate { cached } = self.tracker.observe(key, &message.token, now) {
            debug!(
                "Duplicate message ID {} from {}, not processing again",
                message.message_id, peer
            );
            return cached;
        }

        let mut response = self.responses.build(&message, MessageCode::CHANGED);
        let request = InboundRequest {
            message,
            source: peer,
            received_at,
        };

        let Ok(service) = self.service.ready().await;
        let Ok(code) = service.call(request).await;
        response.code = code;

        let encoded = encode(&response);
        self.tracker.complete(key, encoded.clone());
        encoded
    }
}

fn encode(message: &CoapMessage) -> Option<Vec<u8>> {
    match message.encode() {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            error!("Unable to encode response: {}", err);
            None
        }
    }
}

/// Bind a listener and serve until `shutdown` resolves
pub async fn serve<I, F>(config: ListenerConfig, ingest: I, shutdown: F) -> Result<(), ListenerError>
where
    I: Ingest,
    F: Future<Output = ()>,
{
    Listener::bind(config, ingest).await?.run(shutdown).await
}
