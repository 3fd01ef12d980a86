//! Hand-off of readings to whatever stores or forwards them
//!
//! The listener only needs to know whether a batch was accepted. Acceptance
//! is all-or-nothing per request: either every reading from a payload is
//! queued or none is, so a 5.03 never leaves a partial batch behind.

use std::fmt::Debug;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::error::IngestError;
use crate::mapper::Reading;

pub mod memory;

pub use memory::MemoryIngest;

/// Downstream collaborator receiving readings.
///
/// `submit` is called from the listener loop and must not block; report
/// [`IngestError::QueueFull`] instead of waiting for room.
pub trait Ingest: Clone + Debug + Send + Sync + 'static {
    fn submit(&self, readings: Vec<Reading>) -> Result<(), IngestError>;
}

/// Bounded queue in front of a consumer task
#[derive(Clone, Debug)]
pub struct IngestQueue {
    sender: mpsc::Sender<Reading>,
}

impl IngestQueue {
    /// Queue holding at most `capacity` readings, with the receiving end
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Reading>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Readings that can still be queued
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

impl Ingest for IngestQueue {
    fn submit(&self, readings: Vec<Reading>) -> Result<(), IngestError> {
        if readings.is_empty() {
            return Ok(());
        }

        let permits = self
            .sender
            .try_reserve_many(readings.len())
            .map_err(|err| match err {
                TrySendError::Full(()) => IngestError::QueueFull,
                TrySendError::Closed(()) => IngestError::Closed,
            })?;

        let count = readings.len();
        for (permit, reading) in permits.zip(readings) {
            permit.send(reading);
        }
        debug!("Queued {} readings", count);

        Ok(())
    }
}
