use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, warn};

use crate::model::*;

use super::{CapacityLedger, LedgerError};

/// Exclusive hold on one event's counter.
///
/// Every method writes its record to the WAL before touching the counter,
/// so each call is individually atomic; holding the lease across several
/// calls makes the whole sequence atomic with respect to other callers.
pub struct EventLease<'a> {
    ledger: &'a CapacityLedger,
    guard: OwnedMutexGuard<EventState>,
}

impl<'a> EventLease<'a> {
    pub(super) fn new(ledger: &'a CapacityLedger, guard: OwnedMutexGuard<EventState>) -> Self {
        Self { ledger, guard }
    }

    pub fn event_id(&self) -> EventId {
        self.guard.id
    }

    pub fn info(&self) -> EventInfo {
        self.guard.info()
    }

    pub fn available_seats(&self) -> u32 {
        self.guard.available_seats
    }

    pub fn price_per_seat(&self) -> Cents {
        self.guard.price_per_seat
    }

    pub async fn reserve(&mut self, quantity: u32) -> Result<u32, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity(0));
        }
        let available = self.guard.available_seats;
        if available < quantity {
            return Err(LedgerError::InsufficientCapacity {
                event_id: self.guard.id,
                requested: quantity,
                available,
            });
        }

        let record = LedgerRecord::SeatsReserved { event_id: self.guard.id, quantity };
        self.ledger.persist_and_apply(&mut self.guard, record).await?;
        metrics::counter!(crate::observability::SEATS_RESERVED_TOTAL).increment(quantity as u64);
        Ok(self.guard.available_seats)
    }

    pub async fn release(&mut self, quantity: u32) -> Result<u32, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity(0));
        }
        let total = self.guard.total_seats;
        let available = self.guard.available_seats;
        if available as u64 + quantity as u64 > total as u64 {
            metrics::counter!(crate::observability::INVARIANT_VIOLATIONS_TOTAL).increment(1);
            error!(
                event_id = %self.guard.id,
                total,
                available,
                released = quantity,
                "release exceeds event capacity; reservations were miscounted"
            );
            return Err(LedgerError::CapacityInvariantViolation {
                event_id: self.guard.id,
                total,
                available,
                released: quantity,
            });
        }

        let record = LedgerRecord::SeatsReleased { event_id: self.guard.id, quantity };
        self.ledger.persist_and_apply(&mut self.guard, record).await?;
        metrics::counter!(crate::observability::SEATS_RELEASED_TOTAL).increment(quantity as u64);
        Ok(self.guard.available_seats)
    }

    /// `delta` is the net change to available seats.
    pub async fn adjust(&mut self, delta: i64) -> Result<u32, LedgerError> {
        if delta == 0 {
            debug!(event_id = %self.guard.id, "zero capacity adjustment");
            return Ok(self.guard.available_seats);
        }
        let magnitude = u32::try_from(delta.unsigned_abs())
            .map_err(|_| LedgerError::LimitExceeded("adjustment too large"))?;
        if delta < 0 {
            self.reserve(magnitude).await
        } else {
            self.release(magnitude).await
        }
    }

    pub(super) async fn reprice(&mut self, price_per_seat: Cents) -> Result<(), LedgerError> {
        let record = LedgerRecord::EventRepriced { id: self.guard.id, price_per_seat };
        self.ledger.persist_and_apply(&mut self.guard, record).await
    }

    pub(super) async fn retire(&mut self) -> Result<(), LedgerError> {
        let record = LedgerRecord::EventRetired { id: self.guard.id };
        self.ledger.persist_and_apply(&mut self.guard, record).await
    }

    pub(crate) async fn reconcile(&mut self, active_seats: u32) -> Result<(), LedgerError> {
        let total = self.guard.total_seats;
        let Some(expected) = total.checked_sub(active_seats) else {
            metrics::counter!(crate::observability::INVARIANT_VIOLATIONS_TOTAL).increment(1);
            error!(event_id = %self.guard.id, total, active = active_seats, "active bookings exceed event capacity");
            return Err(LedgerError::ActiveExceedsTotal {
                event_id: self.guard.id,
                total,
                active: active_seats,
            });
        };
        if expected == self.guard.available_seats {
            return Ok(());
        }

        warn!(
            event_id = %self.guard.id,
            recorded = self.guard.available_seats,
            expected,
            "available seats drifted from active bookings; correcting"
        );
        let record = LedgerRecord::CapacityReconciled {
            event_id: self.guard.id,
            available_seats: expected,
        };
        self.ledger.persist_and_apply(&mut self.guard, record).await
    }
}
