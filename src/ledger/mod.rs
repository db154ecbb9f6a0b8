mod error;
mod lease;

pub use error::LedgerError;
pub use lease::EventLease;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{info, warn};

use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::{Wal, WalWriter};

pub type SharedEventState = Arc<Mutex<EventState>>;

/// Owns every event's seat counter. All capacity changes go through here.
///
/// Each event sits behind its own mutex, so operations on different events
/// never contend. A mutation is durable (WAL-appended) before it is applied
/// in memory; a failed append leaves the counter untouched.
pub struct CapacityLedger {
    events: DashMap<EventId, SharedEventState>,
    /// Lock-free mirror of every live event, updated in the same step as the
    /// WAL append. Serves reads and compaction without touching event locks.
    catalog: DashMap<EventId, EventInfo>,
    wal: WalWriter<LedgerRecord>,
    /// Appends hold it shared; compaction holds it exclusively so the
    /// rewritten log matches `catalog` exactly.
    journal_gate: RwLock<()>,
    /// Registered, non-retired events. Counted separately from `events` so
    /// the cap can be enforced while holding a map entry.
    live_events: AtomicUsize,
    notify: Arc<NotifyHub>,
    lock_timeout: Duration,
}

/// Apply a record to an event (caller holds the lock).
/// Registration and snapshots are handled at the map level.
fn apply_record(ev: &mut EventState, record: &LedgerRecord) {
    match record {
        LedgerRecord::EventRepriced { price_per_seat, .. } => {
            ev.price_per_seat = *price_per_seat;
        }
        LedgerRecord::EventRetired { .. } => {
            ev.retired = true;
        }
        LedgerRecord::SeatsReserved { quantity, .. } => {
            ev.available_seats = ev.available_seats.saturating_sub(*quantity);
        }
        LedgerRecord::SeatsReleased { quantity, .. } => {
            ev.available_seats = ev.available_seats.saturating_add(*quantity).min(ev.total_seats);
        }
        LedgerRecord::CapacityReconciled { available_seats, .. } => {
            ev.available_seats = (*available_seats).min(ev.total_seats);
        }
        LedgerRecord::EventRegistered { .. } | LedgerRecord::EventSnapshot { .. } => {}
    }
}

impl CapacityLedger {
    /// Replay the WAL at `path` and start its group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn open(path: &Path, notify: Arc<NotifyHub>, lock_timeout: Duration) -> io::Result<Self> {
        let records: Vec<LedgerRecord> = Wal::replay(path)?;
        let wal = WalWriter::spawn(Wal::open(path)?);

        let mut states: HashMap<EventId, EventState> = HashMap::new();
        for record in &records {
            match record {
                LedgerRecord::EventRegistered {
                    id,
                    title,
                    total_seats,
                    price_per_seat,
                } => {
                    states.insert(*id, EventState::new(*id, title.clone(), *total_seats, *price_per_seat));
                }
                LedgerRecord::EventSnapshot {
                    id,
                    title,
                    total_seats,
                    available_seats,
                    price_per_seat,
                } => {
                    let mut ev = EventState::new(*id, title.clone(), *total_seats, *price_per_seat);
                    ev.available_seats = (*available_seats).min(*total_seats);
                    states.insert(*id, ev);
                }
                LedgerRecord::EventRetired { id } => {
                    states.remove(id);
                }
                other => {
                    if let Some(ev) = states.get_mut(&other.event_id()) {
                        apply_record(ev, other);
                    }
                }
            }
        }

        let ledger = Self {
            events: DashMap::new(),
            catalog: DashMap::new(),
            wal,
            journal_gate: RwLock::new(()),
            live_events: AtomicUsize::new(0),
            notify,
            lock_timeout,
        };
        ledger.live_events.store(states.len(), Ordering::SeqCst);
        for (id, ev) in states {
            ledger.catalog.insert(id, ev.info());
            ledger.events.insert(id, Arc::new(Mutex::new(ev)));
        }
        ledger.publish_event_count();
        info!(events = ledger.events.len(), records = records.len(), "ledger replayed");

        Ok(ledger)
    }

    /// WAL-append + apply + mirror + notify in one step.
    pub(super) async fn persist_and_apply(
        &self,
        ev: &mut EventState,
        record: LedgerRecord,
    ) -> Result<(), LedgerError> {
        let _gate = self.journal_gate.read().await;
        self.wal
            .append(record.clone())
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        apply_record(ev, &record);
        if ev.retired {
            self.catalog.remove(&ev.id);
        } else {
            self.catalog.insert(ev.id, ev.info());
        }
        self.notify.send(ev.id, &record);
        Ok(())
    }

    // ── Event catalog ────────────────────────────────────────

    pub async fn register_event(
        &self,
        id: EventId,
        title: Option<String>,
        total_seats: u32,
        price_per_seat: Cents,
    ) -> Result<EventInfo, LedgerError> {
        if total_seats == 0 {
            return Err(LedgerError::InvalidQuantity(0));
        }
        if total_seats > MAX_TOTAL_SEATS {
            return Err(LedgerError::LimitExceeded("too many seats"));
        }
        if let Some(ref t) = title
            && t.len() > MAX_TITLE_LEN {
                return Err(LedgerError::LimitExceeded("event title too long"));
            }
        // Publish the slot already locked so a concurrent caller waits for
        // the registration record instead of seeing a half-made event.
        let shared = Arc::new(Mutex::new(EventState::new(id, title.clone(), total_seats, price_per_seat)));
        let mut guard = shared.clone().lock_owned().await;
        match self.events.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(LedgerError::AlreadyExists(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                self.live_events
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < MAX_EVENTS).then_some(n + 1))
                    .map_err(|_| LedgerError::LimitExceeded("too many events"))?;
                slot.insert(shared);
            }
        }

        let record = LedgerRecord::EventRegistered { id, title, total_seats, price_per_seat };
        if let Err(e) = self.persist_and_apply(&mut guard, record).await {
            guard.retired = true;
            self.events.remove(&id);
            self.live_events.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }
        self.publish_event_count();
        info!(event_id = %id, total_seats, price_per_seat, "event registered");
        Ok(guard.info())
    }

    /// Change the price for future bookings and amendments. Existing
    /// bookings keep the price they were made at.
    pub async fn reprice_event(&self, id: EventId, price_per_seat: Cents) -> Result<EventInfo, LedgerError> {
        let mut lease = self.lock(id).await?;
        lease.reprice(price_per_seat).await?;
        Ok(lease.info())
    }

    /// Remove an event. Refused while any seat is reserved.
    pub async fn retire_event(&self, id: EventId) -> Result<(), LedgerError> {
        let mut lease = self.lock(id).await?;
        let reserved = lease.info().reserved_seats();
        if reserved > 0 {
            return Err(LedgerError::EventHasBookings { event_id: id, reserved });
        }
        lease.retire().await?;
        drop(lease);
        self.events.remove(&id);
        self.live_events.fetch_sub(1, Ordering::SeqCst);
        self.notify.remove(&id);
        self.publish_event_count();
        info!(event_id = %id, "event retired");
        Ok(())
    }

    /// Last committed state of an event. Never waits on the event lock.
    pub fn event(&self, id: &EventId) -> Option<EventInfo> {
        self.catalog.get(id).map(|e| e.value().clone())
    }

    /// Follow the records applied to a live event. The channel goes away
    /// when the event is retired.
    pub fn subscribe(&self, id: EventId) -> Result<broadcast::Receiver<LedgerRecord>, LedgerError> {
        let rx = self.notify.subscribe(id);
        // Checked after subscribing: retirement drops the catalog entry
        // before the channel, so a retire racing this call is seen here.
        if !self.catalog.contains_key(&id) {
            self.notify.remove(&id);
            return Err(LedgerError::EventNotFound(id));
        }
        Ok(rx)
    }

    pub fn events(&self) -> Vec<EventInfo> {
        let mut all: Vec<EventInfo> = self.catalog.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|e| e.id);
        all
    }

    // ── Capacity mutation ────────────────────────────────────

    /// Lock one event for a multi-step unit of work. The lease serializes
    /// every reserve/release/adjust on that event until it is dropped.
    /// Waiting is bounded by the configured lock timeout.
    pub async fn lock(&self, id: EventId) -> Result<EventLease<'_>, LedgerError> {
        let shared = self
            .events
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(LedgerError::EventNotFound(id))?;

        let wait_start = Instant::now();
        let guard = match tokio::time::timeout(self.lock_timeout, shared.lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                warn!(event_id = %id, timeout_ms = self.lock_timeout.as_millis() as u64, "event lock wait timed out");
                return Err(LedgerError::LockTimeout(id));
            }
        };
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());

        if guard.retired {
            return Err(LedgerError::EventNotFound(id));
        }
        Ok(EventLease::new(self, guard))
    }

    /// Atomically take `quantity` seats. Returns the new available count.
    pub async fn reserve(&self, id: EventId, quantity: u32) -> Result<u32, LedgerError> {
        self.lock(id).await?.reserve(quantity).await
    }

    /// Atomically return `quantity` seats. Returns the new available count.
    pub async fn release(&self, id: EventId, quantity: u32) -> Result<u32, LedgerError> {
        self.lock(id).await?.release(quantity).await
    }

    /// Net change to available seats: negative reserves, positive releases.
    pub async fn adjust(&self, id: EventId, delta: i64) -> Result<u32, LedgerError> {
        self.lock(id).await?.adjust(delta).await
    }

    // ── Compaction ───────────────────────────────────────────

    /// Rewrite the WAL as one snapshot per live event.
    pub async fn compact(&self) -> Result<(), LedgerError> {
        let _gate = self.journal_gate.write().await;
        let mut snapshot: Vec<EventInfo> = self.catalog.iter().map(|e| e.value().clone()).collect();
        snapshot.sort_by_key(|e| e.id);
        let records = snapshot
            .into_iter()
            .map(|ev| LedgerRecord::EventSnapshot {
                id: ev.id,
                title: ev.title,
                total_seats: ev.total_seats,
                available_seats: ev.available_seats,
                price_per_seat: ev.price_per_seat,
            })
            .collect();
        self.wal
            .compact(records)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn publish_event_count(&self) {
        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(self.live_events.load(Ordering::SeqCst) as f64);
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }
}
