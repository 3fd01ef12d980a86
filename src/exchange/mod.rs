//! Message deduplication
//!
//! CoAP devices retransmit Confirmable requests until they see an ACK, and a
//! lost ACK means the same request arrives again. The tracker remembers each
//! (peer, message ID) for the exchange lifetime so a retransmission is
//! answered from the recorded response instead of being ingested twice.
//!
//! The tracker is owned by the listener loop and is not shared, so it needs
//! no locking.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::config::ListenerConfig;

/// Identity of a message for deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    pub peer: SocketAddr,
    pub message_id: u16,
}

impl ExchangeKey {
    pub fn new(peer: SocketAddr, message_id: u16) -> Self {
        Self { peer, message_id }
    }
}

/// Externally visible state of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Unseen,
    InFlight,
    Completed,
}

/// Result of observing an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First sighting; the caller processes the request and then calls
    /// [`ExchangeTracker::complete`]
    New,
    /// Seen within the lifetime window. `cached` holds the encoded response
    /// to resend, `None` if there is nothing to send.
    Duplicate { cached: Option<Vec<u8>> },
}

#[derive(Debug)]
enum Progress {
    InFlight,
    Completed(Option<Vec<u8>>),
}

#[derive(Debug)]
struct Exchange {
    first_seen: Instant,
    token: Vec<u8>,
    progress: Progress,
}

#[derive(Debug)]
pub struct ExchangeTracker {
    entries: HashMap<ExchangeKey, Exchange>,
    /// Keys in order of first sighting, oldest at the front
    order: VecDeque<(ExchangeKey, Instant)>,
    lifetime: Duration,
    capacity: usize,
}

impl ExchangeTracker {
    pub fn new(lifetime: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            lifetime,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(config.exchange_lifetime(), config.max_exchanges)
    }

    /// Record a message and report whether it was already seen.
    ///
    /// Expired entries are evicted first, so the cost of cleanup is spread
    /// over incoming traffic.
    pub fn observe(&mut self, key: ExchangeKey, token: &[u8], now: Instant) -> Observation {
        self.evict_expired(now);

        if let Some(exchange) = self.entries.get(&key) {
            if exchange.token != token {
                debug!(
                    "Message ID {} from {} reused with a different token",
                    key.message_id, key.peer
                );
            }

            let cached = match &exchange.progress {
                Progress::InFlight => None,
                Progress::Completed(response) => response.clone(),
            };
            return Observation::Duplicate { cached };
        }

        if self.entries.len() >= self.capacity {
            self.evict_for_capacity();
        }

        self.entries.insert(
            key,
            Exchange {
                first_seen: now,
                token: token.to_vec(),
                progress: Progress::InFlight,
            },
        );
        self.order.push_back((key, now));

        Observation::New
    }

    /// Mark an exchange as answered, keeping `response` for retransmissions
    pub fn complete(&mut self, key: ExchangeKey, response: Option<Vec<u8>>) {
        if let Some(exchange) = self.entries.get_mut(&key) {
            exchange.progress = Progress::Completed(response);
        }
    }

    pub fn state(&self, key: &ExchangeKey) -> ExchangeState {
        match self.entries.get(key).map(|e| &e.progress) {
            None => ExchangeState::Unseen,
            Some(Progress::InFlight) => ExchangeState::InFlight,
            Some(Progress::Completed(_)) => ExchangeState::Completed,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&(key, seen)) = self.order.front() {
            if now.saturating_duration_since(seen) < self.lifetime {
                break;
            }
            self.order.pop_front();
            self.remove_if_current(&key, seen);
        }
    }

    /// Drop the oldest completed exchanges until there is room. An in-flight
    /// exchange at the front stops eviction; the table then grows past its
    /// capacity rather than forgetting a request still being processed.
    fn evict_for_capacity(&mut self) {
        while self.entries.len() >= self.capacity {
            let Some(&(key, seen)) = self.order.front() else {
                break;
            };

            if let Some(exchange) = self.entries.get(&key) {
                if exchange.first_seen == seen && matches!(exchange.progress, Progress::InFlight)
                {
                    break;
                }
            }

            self.order.pop_front();
            if self.remove_if_current(&key, seen) {
                debug!(
                    "Evicted exchange {} from {} to stay within capacity",
                    key.message_id, key.peer
                );
            }
        }
    }

    fn remove_if_current(&mut self, key: &ExchangeKey, seen: Instant) -> bool {
        if self
            .entries
            .get(key)
            .is_some_and(|exchange| exchange.first_seen == seen)
        {
            self.entries.remove(key);
            return true;
        }
        false
    }
}
