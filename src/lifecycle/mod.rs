mod error;

pub use error::BookingError;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::ledger::{CapacityLedger, EventLease, LedgerError};
use crate::limits::MAX_SEATS_PER_BOOKING;
use crate::model::*;
use crate::observability::{self, operation_label};
use crate::store::BookingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Amend,
    Cancel,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(operation_label(*self))
    }
}

/// Coordinates booking state transitions with capacity changes.
///
/// Each create/amend/cancel holds the event's lease from the first ledger
/// read until the booking write lands, so the ledger change and the
/// booking record commit together or not at all. If the booking write
/// fails, the ledger change is reversed before the error is returned.
///
/// Units run on their own tokio task: a caller that gives up mid-flight
/// (dropped future, request timeout) cannot strand a reservation without
/// its booking.
pub struct BookingManager<S> {
    ledger: Arc<CapacityLedger>,
    store: Arc<S>,
}

impl<S> Clone for BookingManager<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S: BookingStore + 'static> BookingManager<S> {
    pub fn new(ledger: Arc<CapacityLedger>, store: Arc<S>) -> Self {
        Self { ledger, store }
    }

    pub fn ledger(&self) -> &Arc<CapacityLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create(&self, event_id: EventId, user_id: UserId, quantity: u32) -> Result<Booking, BookingError> {
        let unit = create_unit(self.ledger.clone(), self.store.clone(), event_id, user_id, quantity);
        run(Operation::Create, unit).await
    }

    pub async fn amend(&self, booking_id: BookingId, new_quantity: u32) -> Result<Booking, BookingError> {
        let unit = amend_unit(self.ledger.clone(), self.store.clone(), booking_id, new_quantity);
        run(Operation::Amend, unit).await
    }

    /// Idempotent: cancelling a cancelled booking succeeds without touching
    /// the ledger.
    pub async fn cancel(&self, booking_id: BookingId) -> Result<(), BookingError> {
        let unit = cancel_unit(self.ledger.clone(), self.store.clone(), booking_id);
        run(Operation::Cancel, unit).await
    }

    // ── Queries ──────────────────────────────────────────────

    pub async fn booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.store
            .load(id)
            .await?
            .ok_or(BookingError::BookingNotFound(id))
    }

    pub async fn bookings(&self) -> Result<Vec<Booking>, BookingError> {
        Ok(self.store.all().await?)
    }

    pub async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.store.by_user(user_id).await?)
    }

    pub async fn bookings_for_event(&self, event_id: EventId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.store.by_event(event_id).await?)
    }

    /// Seats held by ACTIVE bookings for an event, from the booking store.
    pub async fn active_seats(&self, event_id: EventId) -> Result<u32, BookingError> {
        let bookings = self.store.by_event(event_id).await?;
        let sum: u64 = bookings
            .iter()
            .filter(|b| b.is_active())
            .map(|b| b.quantity as u64)
            .sum();
        u32::try_from(sum).map_err(|_| BookingError::Internal(format!("active seat sum overflow on event {event_id}")))
    }

    /// Bring every event's counter in line with its active bookings.
    /// Returns the number of events checked.
    /// Safe while bookings are being made: each event is counted under its
    /// lease, so no unit can commit between the count and the reset.
    pub async fn reconcile(&self) -> Result<usize, BookingError> {
        let mut checked = 0;
        for ev in self.ledger.events() {
            let mut lease = match self.ledger.lock(ev.id).await {
                Ok(lease) => lease,
                Err(LedgerError::EventNotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            let active = self.active_seats(ev.id).await?;
            lease.reconcile(active).await?;
            checked += 1;
        }
        Ok(checked)
    }
}

/// Spawn the unit, then record its outcome.
async fn run<T, F>(op: Operation, unit: F) -> Result<T, BookingError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, BookingError>> + Send + 'static,
{
    let start = Instant::now();
    let result = match tokio::spawn(unit).await {
        Ok(result) => result,
        Err(e) => Err(BookingError::Internal(format!("booking task failed: {e}"))),
    };

    let label = operation_label(op);
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.outcome_label(),
    };
    metrics::counter!(observability::BOOKING_OPERATIONS_TOTAL, "operation" => label, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(observability::BOOKING_OPERATION_DURATION_SECONDS, "operation" => label)
        .record(start.elapsed().as_secs_f64());
    result
}

fn validate_quantity(quantity: u32) -> Result<(), BookingError> {
    if quantity == 0 {
        return Err(BookingError::InvalidQuantity(quantity));
    }
    if quantity > MAX_SEATS_PER_BOOKING {
        return Err(BookingError::LimitExceeded("too many seats in one booking"));
    }
    Ok(())
}

fn price_for(quantity: u32, price_per_seat: Cents) -> Result<Cents, BookingError> {
    (quantity as Cents)
        .checked_mul(price_per_seat)
        .ok_or(BookingError::LimitExceeded("total price overflow"))
}

/// Undo a ledger change whose booking write failed. `delta` is the net
/// change to available seats that restores the previous counter.
async fn compensate(lease: &mut EventLease<'_>, delta: i64, op: Operation) -> Result<(), BookingError> {
    if delta == 0 {
        return Ok(());
    }
    match lease.adjust(delta).await {
        Ok(available) => {
            metrics::counter!(observability::COMPENSATIONS_TOTAL, "operation" => operation_label(op))
                .increment(1);
            warn!(event_id = %lease.event_id(), delta, available, "booking {op} rolled back");
            Ok(())
        }
        Err(e) => {
            error!(
                event_id = %lease.event_id(),
                delta,
                error = %e,
                "compensation after failed booking {op} did not apply; counter needs reconciliation"
            );
            Err(BookingError::Internal(format!("compensation failed: {e}")))
        }
    }
}

async fn create_unit<S: BookingStore>(
    ledger: Arc<CapacityLedger>,
    store: Arc<S>,
    event_id: EventId,
    user_id: UserId,
    quantity: u32,
) -> Result<Booking, BookingError> {
    validate_quantity(quantity)?;
    let mut lease = ledger.lock(event_id).await?;
    let total_price = price_for(quantity, lease.price_per_seat())?;

    lease.reserve(quantity).await?;

    let booking = Booking::new(Ulid::new(), event_id, user_id, quantity, total_price);
    if let Err(e) = store.persist(&booking).await {
        compensate(&mut lease, quantity as i64, Operation::Create).await?;
        return Err(BookingError::BookingWriteFailed {
            operation: Operation::Create,
            reason: e.to_string(),
        });
    }

    info!(
        booking_id = %booking.id,
        event_id = %event_id,
        quantity,
        available = lease.available_seats(),
        "booking created"
    );
    Ok(booking)
}

async fn amend_unit<S: BookingStore>(
    ledger: Arc<CapacityLedger>,
    store: Arc<S>,
    booking_id: BookingId,
    new_quantity: u32,
) -> Result<Booking, BookingError> {
    validate_quantity(new_quantity)?;
    let found = store
        .load(booking_id)
        .await?
        .ok_or(BookingError::BookingNotFound(booking_id))?;
    if !found.is_active() {
        return Err(BookingError::InvalidState { id: booking_id, status: found.status });
    }

    let mut lease = ledger.lock(found.event_id).await?;

    // Re-read under the lease: a concurrent amend or cancel may have landed.
    let booking = store
        .load(booking_id)
        .await?
        .ok_or(BookingError::BookingNotFound(booking_id))?;
    if !booking.is_active() {
        return Err(BookingError::InvalidState { id: booking_id, status: booking.status });
    }

    let total_price = price_for(new_quantity, lease.price_per_seat())?;
    let delta = booking.quantity as i64 - new_quantity as i64;
    lease.adjust(delta).await?;

    let mut updated = booking.clone();
    updated.quantity = new_quantity;
    updated.total_price = total_price;
    updated.updated_at = now_ms();

    if let Err(e) = store.persist(&updated).await {
        compensate(&mut lease, -delta, Operation::Amend).await?;
        return Err(BookingError::BookingWriteFailed {
            operation: Operation::Amend,
            reason: e.to_string(),
        });
    }

    info!(
        booking_id = %booking_id,
        event_id = %updated.event_id,
        from = booking.quantity,
        to = new_quantity,
        available = lease.available_seats(),
        "booking amended"
    );
    Ok(updated)
}

async fn cancel_unit<S: BookingStore>(
    ledger: Arc<CapacityLedger>,
    store: Arc<S>,
    booking_id: BookingId,
) -> Result<(), BookingError> {
    let found = store
        .load(booking_id)
        .await?
        .ok_or(BookingError::BookingNotFound(booking_id))?;
    if !found.is_active() {
        debug!(booking_id = %booking_id, "booking already cancelled");
        return Ok(());
    }

    let mut lease = ledger.lock(found.event_id).await?;

    let booking = store
        .load(booking_id)
        .await?
        .ok_or(BookingError::BookingNotFound(booking_id))?;
    if !booking.is_active() {
        debug!(booking_id = %booking_id, "booking cancelled concurrently");
        return Ok(());
    }

    lease.release(booking.quantity).await?;

    let mut cancelled = booking;
    cancelled.status = BookingStatus::Cancelled;
    cancelled.updated_at = now_ms();

    if let Err(e) = store.persist(&cancelled).await {
        compensate(&mut lease, -(cancelled.quantity as i64), Operation::Cancel).await?;
        return Err(BookingError::BookingWriteFailed {
            operation: Operation::Cancel,
            reason: e.to_string(),
        });
    }

    info!(
        booking_id = %booking_id,
        event_id = %cancelled.event_id,
        quantity = cancelled.quantity,
        available = lease.available_seats(),
        "booking cancelled"
    );
    Ok(())
}
