mod journal;
mod memory;

pub use journal::WalBookingStore;
pub use memory::InMemoryBookingStore;

use async_trait::async_trait;

use crate::model::{Booking, BookingId, EventId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "booking store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError(e.to_string())
    }
}

/// Durable home of booking records. The lifecycle manager only ever writes
/// through `persist`, and only while it holds the booking's event lease.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn load(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Insert or overwrite by id.
    async fn persist(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError>;

    async fn by_event(&self, event_id: EventId) -> Result<Vec<Booking>, StoreError>;

    async fn all(&self) -> Result<Vec<Booking>, StoreError>;
}

/// Stable listing order: by id, which is creation order at millisecond grain.
pub(crate) fn sorted(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by_key(|b| b.id);
    bookings
}
