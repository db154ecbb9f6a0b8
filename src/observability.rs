use std::net::SocketAddr;

use crate::lifecycle::Operation;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking operations. Labels: operation, outcome.
pub const BOOKING_OPERATIONS_TOTAL: &str = "seatledger_booking_operations_total";

/// Histogram: booking operation latency in seconds. Labels: operation.
pub const BOOKING_OPERATION_DURATION_SECONDS: &str = "seatledger_booking_operation_duration_seconds";

/// Counter: ledger writes undone after the paired booking write failed.
pub const COMPENSATIONS_TOTAL: &str = "seatledger_compensations_total";

// ── Ledger ──────────────────────────────────────────────────────

/// Counter: seats moved from available to reserved.
pub const SEATS_RESERVED_TOTAL: &str = "seatledger_seats_reserved_total";

/// Counter: seats returned to available.
pub const SEATS_RELEASED_TOTAL: &str = "seatledger_seats_released_total";

/// Histogram: time spent waiting for an event lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "seatledger_lock_wait_seconds";

/// Counter: event lock acquisitions that hit the bounded wait.
pub const LOCK_TIMEOUTS_TOTAL: &str = "seatledger_lock_timeouts_total";

/// Counter: releases that would have pushed available above total.
pub const INVARIANT_VIOLATIONS_TOTAL: &str = "seatledger_invariant_violations_total";

/// Gauge: registered, non-retired events.
pub const EVENTS_ACTIVE: &str = "seatledger_events_active";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "seatledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "seatledger_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

pub fn operation_label(op: Operation) -> &'static str {
    match op {
        Operation::Create => "create",
        Operation::Amend => "amend",
        Operation::Cancel => "cancel",
    }
}
