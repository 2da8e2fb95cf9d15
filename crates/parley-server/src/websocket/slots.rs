//! Connection slots: the `max_connections` limit and close accounting.
//!
//! A slot is reserved at admission, before the handshake, and held by the
//! connection task until its teardown has finished. Reservation is a single
//! atomic permit acquisition, so concurrent upgrades can never overshoot the
//! limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parley_core::CloseReason;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A reserved connection slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

/// Closes seen so far, split by whether they were routine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CloseTally {
    /// Clean departures, vanished peers, displacement, timeouts, shutdown.
    pub expected: u64,
    /// Protocol and I/O faults, abnormal close codes.
    pub unexpected: u64,
}

/// Live connection accounting for one server.
#[derive(Debug)]
pub struct ConnectionSlots {
    permits: Arc<Semaphore>,
    limit: usize,
    expected_closes: AtomicU64,
    unexpected_closes: AtomicU64,
}

impl ConnectionSlots {
    /// Slots for at most `limit` concurrent connections.
    pub fn new(limit: usize) -> Self {
        let limit = limit.min(Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            expected_closes: AtomicU64::new(0),
            unexpected_closes: AtomicU64::new(0),
        }
    }

    /// Reserve a slot, or `None` when the server is full.
    pub fn try_reserve(&self) -> Option<Slot> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| Slot { _permit: permit })
    }

    /// Slots currently held.
    pub fn live(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Count a finished connection.
    pub fn record_close(&self, reason: &CloseReason) {
        let counter = if reason.is_expected() {
            &self.expected_closes
        } else {
            &self.unexpected_closes
        };
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Closes recorded so far.
    pub fn closes(&self) -> CloseTally {
        CloseTally {
            expected: self.expected_closes.load(Ordering::Relaxed),
            unexpected: self.unexpected_closes.load(Ordering::Relaxed),
        }
    }
}
