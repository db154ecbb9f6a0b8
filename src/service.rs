use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::compactor;
use crate::config::Config;
use crate::ledger::CapacityLedger;
use crate::lifecycle::{BookingError, BookingManager};
use crate::notify::NotifyHub;
use crate::store::WalBookingStore;

pub const LEDGER_WAL: &str = "ledger.wal";
pub const BOOKINGS_WAL: &str = "bookings.wal";

#[derive(Debug)]
pub enum ServiceError {
    Io(std::io::Error),
    Reconcile(BookingError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Io(e) => write!(f, "failed to open data files: {e}"),
            ServiceError::Reconcile(e) => write!(f, "startup reconciliation failed: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Io(e)
    }
}

impl From<BookingError> for ServiceError {
    fn from(e: BookingError) -> Self {
        ServiceError::Reconcile(e)
    }
}

/// A ledger and a booking journal living in one data directory, with their
/// compactors. Dropping the service stops the compactors.
pub struct BookingService {
    ledger: Arc<CapacityLedger>,
    bookings: BookingManager<WalBookingStore>,
    compactors: Vec<JoinHandle<()>>,
}

impl BookingService {
    /// Replay both WALs, repair any counter drift left by a crash between
    /// the ledger write and the booking write, then start compaction.
    pub async fn open(config: &Config) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let (ledger, store) = open_files(&config.data_dir, config)?;
        let bookings = BookingManager::new(ledger.clone(), store.clone());

        let checked = bookings.reconcile().await?;
        info!(
            "opened {} with {checked} events and {} bookings",
            config.data_dir.display(),
            store.len()
        );

        let compactors = vec![
            tokio::spawn(compactor::run_compactor(
                ledger.clone(),
                config.compact_threshold,
                config.compact_interval,
            )),
            tokio::spawn(compactor::run_compactor(
                store,
                config.compact_threshold,
                config.compact_interval,
            )),
        ];

        Ok(Self {
            ledger,
            bookings,
            compactors,
        })
    }

    pub fn ledger(&self) -> &Arc<CapacityLedger> {
        &self.ledger
    }

    pub fn bookings(&self) -> &BookingManager<WalBookingStore> {
        &self.bookings
    }
}

impl Drop for BookingService {
    fn drop(&mut self) {
        for task in &self.compactors {
            task.abort();
        }
    }
}

fn open_files(
    dir: &Path,
    config: &Config,
) -> std::io::Result<(Arc<CapacityLedger>, Arc<WalBookingStore>)> {
    let notify = Arc::new(NotifyHub::new());
    let ledger = CapacityLedger::open(&dir.join(LEDGER_WAL), notify, config.lock_timeout)?;
    let store = WalBookingStore::open(&dir.join(BOOKINGS_WAL))?;
    Ok((Arc::new(ledger), Arc::new(store)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingRecord, LedgerRecord};
    use crate::wal::Wal;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use ulid::Ulid;

    fn test_config(name: &str) -> Config {
        let dir = std::env::temp_dir().join("seatledger_test_service").join(name);
        let _ = fs::remove_dir_all(&dir);
        Config {
            data_dir: dir,
            lock_timeout: Duration::from_secs(1),
            ..Config::default()
        }
    }

    fn wal_path(config: &Config, file: &str) -> PathBuf {
        config.data_dir.join(file)
    }

    #[tokio::test]
    async fn open_creates_data_dir() {
        let config = test_config("create_dir");
        let service = BookingService::open(&config).await.unwrap();
        assert!(config.data_dir.is_dir());
        assert!(service.ledger().events().is_empty());
        assert!(wal_path(&config, LEDGER_WAL).exists());
        assert!(wal_path(&config, BOOKINGS_WAL).exists());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let config = test_config("reopen");
        let event = Ulid::new();
        let user = Ulid::new();
        let (kept, cancelled) = {
            let service = BookingService::open(&config).await.unwrap();
            service.ledger().register_event(event, Some("Gala".into()), 10, 500).await.unwrap();
            let kept = service.bookings().create(event, user, 3).await.unwrap();
            let cancelled = service.bookings().create(event, user, 2).await.unwrap();
            service.bookings().amend(kept.id, 4).await.unwrap();
            service.bookings().cancel(cancelled.id).await.unwrap();
            (kept, cancelled)
        };

        let service = BookingService::open(&config).await.unwrap();
        let info = service.ledger().event(&event).unwrap();
        assert_eq!(info.available_seats, 6);
        assert_eq!(info.title.as_deref(), Some("Gala"));

        let kept = service.bookings().booking(kept.id).await.unwrap();
        assert_eq!(kept.quantity, 4);
        assert_eq!(kept.total_price, 2_000);
        assert!(!service.bookings().booking(cancelled.id).await.unwrap().is_active());
        assert_eq!(service.bookings().bookings_for_user(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn open_repairs_reservation_without_booking() {
        let config = test_config("repair");
        let event = Ulid::new();
        {
            let service = BookingService::open(&config).await.unwrap();
            service.ledger().register_event(event, None, 10, 100).await.unwrap();
            service.bookings().create(event, Ulid::new(), 2).await.unwrap();
        }

        // A crash after the ledger write but before the booking write.
        let mut wal = Wal::open(&wal_path(&config, LEDGER_WAL)).unwrap();
        wal.append(&LedgerRecord::SeatsReserved { event_id: event, quantity: 5 }).unwrap();
        drop(wal);
        assert!(Wal::replay::<BookingRecord>(&wal_path(&config, BOOKINGS_WAL)).unwrap().len() == 1);

        let service = BookingService::open(&config).await.unwrap();
        assert_eq!(service.ledger().event(&event).unwrap().available_seats, 8);
        assert_eq!(service.bookings().active_seats(event).await.unwrap(), 2);
    }
}
