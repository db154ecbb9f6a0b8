use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

/// Money in minor units (e.g. cents). Non-negative by construction.
pub type Cents = u64;

pub type EventId = Ulid;
pub type BookingId = Ulid;
pub type UserId = Ulid;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

/// Seat counters for one event. Owned by the capacity ledger; every other
/// component sees it only through [`EventInfo`] snapshots.
#[derive(Debug, Clone)]
pub struct EventState {
    pub id: EventId,
    pub title: Option<String>,
    /// Fixed at registration.
    pub total_seats: u32,
    /// Always within `0..=total_seats`.
    pub available_seats: u32,
    pub price_per_seat: Cents,
    /// Set when the event is retired while another caller still holds its Arc.
    pub retired: bool,
}

impl EventState {
    pub fn new(id: EventId, title: Option<String>, total_seats: u32, price_per_seat: Cents) -> Self {
        Self {
            id,
            title,
            total_seats,
            available_seats: total_seats,
            price_per_seat,
            retired: false,
        }
    }

    pub fn reserved_seats(&self) -> u32 {
        self.total_seats - self.available_seats
    }

    pub fn info(&self) -> EventInfo {
        EventInfo {
            id: self.id,
            title: self.title.clone(),
            total_seats: self.total_seats,
            available_seats: self.available_seats,
            price_per_seat: self.price_per_seat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: EventId,
    pub title: Option<String>,
    pub total_seats: u32,
    pub available_seats: u32,
    pub price_per_seat: Cents,
}

impl EventInfo {
    pub fn reserved_seats(&self) -> u32 {
        self.total_seats - self.available_seats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Active,
    /// Terminal.
    Cancelled,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Active => f.write_str("ACTIVE"),
            BookingStatus::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub quantity: u32,
    /// `quantity * price_per_seat` at the time of the last create/amend.
    pub total_price: Cents,
    pub status: BookingStatus,
    pub reference: String,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn new(id: BookingId, event_id: EventId, user_id: UserId, quantity: u32, total_price: Cents) -> Self {
        let now = now_ms();
        Self {
            id,
            event_id,
            user_id,
            quantity,
            total_price,
            status: BookingStatus::Active,
            reference: booking_reference(&id),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}

/// Short customer-facing code: the random tail of the ULID.
pub fn booking_reference(id: &BookingId) -> String {
    let s = id.to_string();
    format!("BK-{}", &s[s.len() - 8..])
}

/// Ledger WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    EventRegistered {
        id: EventId,
        title: Option<String>,
        total_seats: u32,
        price_per_seat: Cents,
    },
    EventRepriced {
        id: EventId,
        price_per_seat: Cents,
    },
    EventRetired {
        id: EventId,
    },
    SeatsReserved {
        event_id: EventId,
        quantity: u32,
    },
    SeatsReleased {
        event_id: EventId,
        quantity: u32,
    },
    CapacityReconciled {
        event_id: EventId,
        available_seats: u32,
    },
    /// Written only by compaction.
    EventSnapshot {
        id: EventId,
        title: Option<String>,
        total_seats: u32,
        available_seats: u32,
        price_per_seat: Cents,
    },
}

impl LedgerRecord {
    pub fn event_id(&self) -> EventId {
        match self {
            LedgerRecord::EventRegistered { id, .. }
            | LedgerRecord::EventRepriced { id, .. }
            | LedgerRecord::EventRetired { id }
            | LedgerRecord::EventSnapshot { id, .. } => *id,
            LedgerRecord::SeatsReserved { event_id, .. }
            | LedgerRecord::SeatsReleased { event_id, .. }
            | LedgerRecord::CapacityReconciled { event_id, .. } => *event_id,
        }
    }
}

/// Booking journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingRecord {
    Upserted(Booking),
}
