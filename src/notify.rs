use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{EventId, LedgerRecord};

const CHANNEL_CAPACITY: usize = 256;

/// Per-event fan-out of applied ledger records.
///
/// Channels exist only while somebody listens: the ledger opens one for a
/// live event on subscribe, and the first record sent after the last
/// receiver is gone drops it again.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<EventId, broadcast::Sender<LedgerRecord>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callers outside the ledger go through `CapacityLedger::subscribe`,
    /// which checks that the event exists.
    pub(crate) fn subscribe(&self, event_id: EventId) -> broadcast::Receiver<LedgerRecord> {
        self.channels
            .entry(event_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn send(&self, event_id: EventId, record: &LedgerRecord) {
        let delivered = match self.channels.get(&event_id) {
            Some(sender) => sender.send(record.clone()).is_ok(),
            None => return,
        };
        if !delivered {
            self.channels
                .remove_if(&event_id, |_, sender| sender.receiver_count() == 0);
        }
    }

    pub fn remove(&self, event_id: &EventId) {
        self.channels.remove(event_id);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribers_receive_records() {
        let hub = NotifyHub::new();
        let eid = Ulid::new();
        let mut first = hub.subscribe(eid);
        let mut second = hub.subscribe(eid);
        assert_eq!(hub.channel_count(), 1);

        let record = LedgerRecord::SeatsReserved { event_id: eid, quantity: 2 };
        hub.send(eid, &record);

        assert_eq!(first.recv().await.unwrap(), record);
        assert_eq!(second.recv().await.unwrap(), record);
    }

    #[test]
    fn send_without_channel_creates_none() {
        let hub = NotifyHub::new();
        let eid = Ulid::new();
        hub.send(eid, &LedgerRecord::EventRetired { id: eid });
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn abandoned_channel_is_pruned_on_send() {
        let hub = NotifyHub::new();
        let eid = Ulid::new();
        let rx = hub.subscribe(eid);
        let record = LedgerRecord::SeatsReleased { event_id: eid, quantity: 1 };

        hub.send(eid, &record);
        assert_eq!(hub.channel_count(), 1);

        drop(rx);
        hub.send(eid, &record);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn remove_closes_channel() {
        let hub = NotifyHub::new();
        let eid = Ulid::new();
        let mut rx = hub.subscribe(eid);
        hub.remove(&eid);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
