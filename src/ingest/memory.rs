use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::IngestError;
use crate::mapper::Reading;

use super::Ingest;

/// Collects readings in memory. Useful for tests and tooling.
#[derive(Clone, Debug, Default)]
pub struct MemoryIngest {
    readings: Arc<Mutex<Vec<Reading>>>,
    batches: Arc<Mutex<usize>>,
    capacity: Option<usize>,
}

impl MemoryIngest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses any batch that would take the total past `capacity`
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Copy of everything accepted so far
    pub fn readings(&self) -> Vec<Reading> {
        lock(&self.readings).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.readings).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of accepted submissions, empty ones included
    pub fn batches(&self) -> usize {
        *lock(&self.batches)
    }
}

impl Ingest for MemoryIngest {
    fn submit(&self, readings: Vec<Reading>) -> Result<(), IngestError> {
        let mut stored = lock(&self.readings);
        if let Some(capacity) = self.capacity {
            if stored.len() + readings.len() > capacity {
                return Err(IngestError::QueueFull);
            }
        }
        stored.extend(readings);
        *lock(&self.batches) += 1;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
