use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::model::{Booking, BookingId, BookingRecord, EventId, UserId};
use crate::wal::{Wal, WalWriter};

use super::{sorted, BookingStore, StoreError};

/// Booking store journaled through its own WAL. A record is visible only
/// after its append has been fsynced.
pub struct WalBookingStore {
    bookings: DashMap<BookingId, Booking>,
    wal: WalWriter<BookingRecord>,
    journal_gate: RwLock<()>,
}

impl WalBookingStore {
    /// Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let records: Vec<BookingRecord> = Wal::replay(path)?;
        let wal = WalWriter::spawn(Wal::open(path)?);
        let bookings = DashMap::new();
        for record in records {
            match record {
                BookingRecord::Upserted(b) => {
                    bookings.insert(b.id, b);
                }
            }
        }
        info!(bookings = bookings.len(), "booking journal replayed");
        Ok(Self {
            bookings,
            wal,
            journal_gate: RwLock::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Rewrite the journal with one record per booking.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.journal_gate.write().await;
        let records = sorted(self.bookings.iter().map(|e| e.value().clone()).collect())
            .into_iter()
            .map(BookingRecord::Upserted)
            .collect();
        self.wal.compact(records).await.map_err(StoreError::from)
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
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
impl BookingStore for WalBookingStore {
    async fn load(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(&id).map(|e| e.value().clone()))
    }

    async fn persist(&self, booking: &Booking) -> Result<(), StoreError> {
        let _gate = self.journal_gate.read().await;
        self.wal.append(BookingRecord::Upserted(booking.clone())).await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookingStatus;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("seatledger_test_journal");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn replay_keeps_latest_version() {
        let path = test_wal_path("replay_latest.wal");
        let mut b = Booking::new(Ulid::new(), Ulid::new(), Ulid::new(), 2, 400);
        {
            let store = WalBookingStore::open(&path).unwrap();
            store.persist(&b).await.unwrap();
            b.status = BookingStatus::Cancelled;
            store.persist(&b).await.unwrap();
        }

        let store = WalBookingStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(b.id).await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn compact_collapses_history() {
        let path = test_wal_path("compact.wal");
        let event = Ulid::new();
        let mut b = Booking::new(Ulid::new(), event, Ulid::new(), 1, 100);
        {
            let store = WalBookingStore::open(&path).unwrap();
            for q in 1..=5 {
                b.quantity = q;
                store.persist(&b).await.unwrap();
            }
            assert_eq!(store.appends_since_compact().await, 5);
            store.compact().await.unwrap();
            assert_eq!(store.appends_since_compact().await, 0);
        }

        let records: Vec<BookingRecord> = Wal::replay(&path).unwrap();
        assert_eq!(records, vec![BookingRecord::Upserted(b.clone())]);

        let store = WalBookingStore::open(&path).unwrap();
        assert_eq!(store.by_event(event).await.unwrap(), vec![b]);
    }
}
