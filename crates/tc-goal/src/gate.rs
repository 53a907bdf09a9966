// gate.rs - Single-slot admission gate.
//
// A semaphore with one permit. Admission is a non-blocking try-acquire, so
// two concurrent requests can never both get in. The permit is an owned
// RAII value: whoever holds it (the step-loop task) releases the gate by
// dropping it, on success, cancellation, abort, or unwind alike.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admits at most one goal at a time.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    slot: Arc<Semaphore>,
}

/// Proof of admission. Dropping it frees the gate.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the slot if it is free. Never waits.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.slot)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// Whether a goal currently holds the slot.
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new()
    }
}
