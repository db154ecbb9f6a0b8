use crate::model::EventId;

#[derive(Debug)]
pub enum LedgerError {
    EventNotFound(EventId),
    AlreadyExists(EventId),
    /// Seat quantities must be positive.
    InvalidQuantity(u32),
    InsufficientCapacity {
        event_id: EventId,
        requested: u32,
        available: u32,
    },
    /// A release would push available above total. Always a bookkeeping
    /// bug upstream, never a runtime condition.
    CapacityInvariantViolation {
        event_id: EventId,
        total: u32,
        available: u32,
        released: u32,
    },
    /// Reconciliation found more active seats than the event holds.
    ActiveExceedsTotal {
        event_id: EventId,
        total: u32,
        active: u32,
    },
    EventHasBookings {
        event_id: EventId,
        reserved: u32,
    },
    LimitExceeded(&'static str),
    LockTimeout(EventId),
    Storage(String),
}

impl LedgerError {
    /// Infrastructure failures the caller may retry. Everything else is
    /// either a business rejection or a defect.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::LockTimeout(_) | LedgerError::Storage(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::CapacityInvariantViolation { .. } | LedgerError::ActiveExceedsTotal { .. }
        )
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::EventNotFound(id) => write!(f, "event not found: {id}"),
            LedgerError::AlreadyExists(id) => write!(f, "event already exists: {id}"),
            LedgerError::InvalidQuantity(q) => write!(f, "invalid seat quantity: {q}"),
            LedgerError::InsufficientCapacity {
                event_id,
                requested,
                available,
            } => write!(
                f,
                "insufficient capacity on event {event_id}: requested {requested}, available {available}"
            ),
            LedgerError::CapacityInvariantViolation {
                event_id,
                total,
                available,
                released,
            } => write!(
                f,
                "capacity invariant violated on event {event_id}: releasing {released} with {available}/{total} available"
            ),
            LedgerError::ActiveExceedsTotal {
                event_id,
                total,
                active,
            } => write!(
                f,
                "capacity invariant violated on event {event_id}: {active} active seats exceed total {total}"
            ),
            LedgerError::EventHasBookings { event_id, reserved } => {
                write!(f, "event {event_id} still has {reserved} reserved seats")
            }
            LedgerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            LedgerError::LockTimeout(id) => write!(f, "timed out waiting for event lock: {id}"),
            LedgerError::Storage(e) => write!(f, "ledger storage error: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {}
