pub mod compactor;
pub mod config;
pub mod ledger;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod service;
pub mod store;
pub mod wal;

pub use config::Config;
pub use ledger::{CapacityLedger, EventLease, LedgerError};
pub use lifecycle::{BookingError, BookingManager, Operation};
pub use service::{BookingService, ServiceError};
pub use store::{BookingStore, InMemoryBookingStore, StoreError, WalBookingStore};
