use crate::Error;

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Bounded count of read but not yet acknowledged messages.
///
/// Capacity is fixed at construction. Every successful `acquire` hands out a
/// `Slot`, which goes back to the gate when released or dropped, so the
/// number of outstanding slots can never exceed capacity.
#[derive(Clone, Debug)]
pub struct Gate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// One unit of gate capacity, held from `read` until `ack`/`nack`.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl Gate {
    /// Creates a gate with room for `capacity` outstanding messages.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get().min(Semaphore::MAX_PERMITS);

        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if `cancel` fires first. Nothing is acquired
    /// in that case, even if a slot became free at the same time. Returns
    /// `Error::GateClosed` once the gate has been closed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Slot, Error> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                let permit = permit.map_err(|_| Error::GateClosed)?;

                Ok(Slot {
                    _permit: permit,
                    semaphore: Arc::clone(&self.semaphore),
                })
            }
        }
    }

    /// Returns a slot to the gate.
    ///
    /// # Panics
    ///
    /// Panics if `slot` was acquired from a different gate. Accepting it would
    /// push this gate past its capacity.
    pub fn release(&self, slot: Slot) {
        assert!(
            Arc::ptr_eq(&slot.semaphore, &self.semaphore),
            "slot released into a gate it was not acquired from"
        );

        drop(slot);
    }

    /// Closes the gate. Pending and future `acquire` calls fail with
    /// `Error::GateClosed`; slots already handed out stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Maximum number of outstanding slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots free right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        let available = self.available();
        debug_assert!(available <= self.capacity, "gate exceeded its capacity");

        self.capacity.saturating_sub(available)
    }
}
