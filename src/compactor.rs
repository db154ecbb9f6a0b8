use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::ledger::CapacityLedger;
use crate::store::WalBookingStore;

pub type CompactError = Box<dyn std::error::Error + Send + Sync>;

/// Something backed by a WAL that can be rewritten to its current state.
#[async_trait]
pub trait Compactable: Send + Sync {
    fn name(&self) -> &'static str;

    async fn appends_since_compact(&self) -> u64;

    async fn compact(&self) -> Result<(), CompactError>;
}

#[async_trait]
impl Compactable for CapacityLedger {
    fn name(&self) -> &'static str {
        "ledger"
    }

    async fn appends_since_compact(&self) -> u64 {
        CapacityLedger::appends_since_compact(self).await
    }

    async fn compact(&self) -> Result<(), CompactError> {
        CapacityLedger::compact(self).await?;
        Ok(())
    }
}

#[async_trait]
impl Compactable for WalBookingStore {
    fn name(&self) -> &'static str {
        "bookings"
    }

    async fn appends_since_compact(&self) -> u64 {
        WalBookingStore::appends_since_compact(self).await
    }

    async fn compact(&self) -> Result<(), CompactError> {
        WalBookingStore::compact(self).await?;
        Ok(())
    }
}

/// Compact once if the threshold is reached. Returns whether it ran.
pub async fn compact_if_needed<C: Compactable + ?Sized>(target: &C, threshold: u64) -> bool {
    let appends = target.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match target.compact().await {
        Ok(()) => {
            info!("compacted {} WAL after {appends} appends", target.name());
            true
        }
        Err(e) => {
            warn!("{} WAL compaction failed: {e}", target.name());
            false
        }
    }
}

/// Background task that periodically compacts a WAL.
pub async fn run_compactor<C: Compactable + ?Sized>(target: Arc<C>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if !compact_if_needed(target.as_ref(), threshold).await {
            debug!("{} WAL below compaction threshold", target.name());
        }
    }
}
