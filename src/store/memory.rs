use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{Booking, BookingId, EventId, UserId};

use super::{sorted, BookingStore, StoreError};

pub struct InMemoryBookingStore {
    bookings: DashMap<BookingId, Booking>,
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    fn collect(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        sorted(
            self.bookings
                .iter()
                .filter(|e| keep(e.value()))
                .map(|e| e.value().clone())
                .collect(),
        )
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn load(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(&id).map(|e| e.value().clone()))
    }

    async fn persist(&self, booking: &Booking) -> Result<(), StoreError> {
        self.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn by_user(&self, user_id: UserId) -> Result<Vec<Booking>, StoreError> {
        Ok(self.collect(|b| b.user_id == user_id))
    }

    async fn by_event(&self, event_id: EventId) -> Result<Vec<Booking>, StoreError> {
        Ok(self.collect(|b| b.event_id == event_id))
    }

    async fn all(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.collect(|_| true))
    }
}
