use crate::ledger::LedgerError;
use crate::model::{BookingId, BookingStatus, EventId};
use crate::store::StoreError;

use super::Operation;

#[derive(Debug)]
pub enum BookingError {
    InvalidQuantity(u32),
    EventNotFound(EventId),
    /// Capacity contention. Surfaced as a user-visible conflict, never retried.
    SeatsUnavailable {
        event_id: EventId,
        requested: u32,
        available: u32,
    },
    BookingNotFound(BookingId),
    InvalidState {
        id: BookingId,
        status: BookingStatus,
    },
    /// The booking write failed and the paired ledger change was undone.
    BookingWriteFailed {
        operation: Operation,
        reason: String,
    },
    LimitExceeded(&'static str),
    /// Lock timeout or storage outage. Safe for the caller to retry.
    Unavailable(String),
    /// Bookkeeping defect: invariant violation or a failed compensation.
    Internal(String),
}

impl BookingError {
    /// Transient infrastructure failures. Business rejections and internal
    /// defects are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::Unavailable(_) | BookingError::BookingWriteFailed { .. }
        )
    }

    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            BookingError::InvalidQuantity(_) | BookingError::LimitExceeded(_) => "invalid",
            BookingError::EventNotFound(_) | BookingError::BookingNotFound(_) => "not_found",
            BookingError::SeatsUnavailable { .. } => "seats_unavailable",
            BookingError::InvalidState { .. } => "invalid_state",
            BookingError::BookingWriteFailed { .. } => "write_failed",
            BookingError::Unavailable(_) => "unavailable",
            BookingError::Internal(_) => "internal",
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::EventNotFound(id) => BookingError::EventNotFound(id),
            LedgerError::InsufficientCapacity {
                event_id,
                requested,
                available,
            } => BookingError::SeatsUnavailable {
                event_id,
                requested,
                available,
            },
            LedgerError::InvalidQuantity(q) => BookingError::InvalidQuantity(q),
            LedgerError::LimitExceeded(msg) => BookingError::LimitExceeded(msg),
            LedgerError::LockTimeout(_) | LedgerError::Storage(_) => {
                BookingError::Unavailable(e.to_string())
            }
            LedgerError::CapacityInvariantViolation { .. }
            | LedgerError::ActiveExceedsTotal { .. }
            | LedgerError::AlreadyExists(_)
            | LedgerError::EventHasBookings { .. } => BookingError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        BookingError::Unavailable(e.to_string())
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidQuantity(q) => write!(f, "invalid booking quantity: {q}"),
            BookingError::EventNotFound(id) => write!(f, "event not found: {id}"),
            BookingError::SeatsUnavailable {
                event_id,
                requested,
                available,
            } => write!(
                f,
                "seats unavailable on event {event_id}: requested {requested}, available {available}"
            ),
            BookingError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            BookingError::InvalidState { id, status } => {
                write!(f, "booking {id} is {status} and cannot be changed")
            }
            BookingError::BookingWriteFailed { operation, reason } => {
                write!(f, "booking {operation} failed, seats restored: {reason}")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::Unavailable(msg) => write!(f, "temporarily unavailable: {msg}"),
            BookingError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}
