use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use seatledger::{BookingError, BookingManager, BookingService, Config, WalBookingStore};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

struct Event {
    id: Ulid,
    seats: u32,
}

async fn setup(service: &BookingService) -> Vec<Event> {
    let capacities = [1, 1, 5, 5, 10, 10, 50, 100, 500, 1000];
    let mut events = Vec::new();
    for &seats in &capacities {
        let id = Ulid::new();
        service
            .ledger()
            .register_event(id, None, seats, 1_500)
            .await
            .unwrap();
        events.push(Event { id, seats });
    }
    println!("  registered {} events", events.len());
    events
}

async fn phase1_sequential(manager: &BookingManager<WalBookingStore>, event: &Event) {
    let n = event.seats as usize;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for _ in 0..n {
        let t = Instant::now();
        manager.create(event.id, Ulid::new(), 1).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create latency", &mut latencies);
}

/// Many tasks hammering the same few events. Every rejection must be a
/// capacity conflict, never a lost update.
async fn phase2_contention(manager: &BookingManager<WalBookingStore>, events: &[Event]) {
    let n_tasks = 32;
    let n_per_task = 100;
    let accepted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let manager = manager.clone();
        let event = events[i % 4].id;
        let accepted = accepted.clone();
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(n_per_task);
            for j in 0..n_per_task {
                let t = Instant::now();
                match manager.create(event, Ulid::new(), 1 + (j % 2) as u32).await {
                    Ok(_) => accepted.fetch_add(1, Ordering::Relaxed),
                    Err(BookingError::SeatsUnavailable { .. }) => rejected.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error under contention: {e}"),
                };
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    println!(
        "  {n_tasks} tasks x {n_per_task} creates in {:.2}s: {} accepted, {} rejected",
        elapsed.as_secs_f64(),
        accepted.load(Ordering::Relaxed),
        rejected.load(Ordering::Relaxed),
    );
    print_latency("contended create latency", &mut all);
}

/// Create, amend and cancel interleaved across the larger events.
async fn phase3_mixed(manager: &BookingManager<WalBookingStore>, events: &[Event]) {
    let n_tasks = 16;
    let n_rounds = 50;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let manager = manager.clone();
        let event = events[6 + i % 4].id;
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(n_rounds * 3);
            for round in 0..n_rounds {
                let t = Instant::now();
                let booking = match manager.create(event, Ulid::new(), 2).await {
                    Ok(b) => b,
                    Err(BookingError::SeatsUnavailable { .. }) => continue,
                    Err(e) => panic!("create failed: {e}"),
                };
                latencies.push(t.elapsed());

                let t = Instant::now();
                match manager.amend(booking.id, 1 + (round % 4) as u32).await {
                    Ok(_) | Err(BookingError::SeatsUnavailable { .. }) => {}
                    Err(e) => panic!("amend failed: {e}"),
                }
                latencies.push(t.elapsed());

                if round % 3 == 0 {
                    let t = Instant::now();
                    manager.cancel(booking.id).await.unwrap();
                    latencies.push(t.elapsed());
                }
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    println!("  {n_tasks} tasks x {n_rounds} rounds in {:.2}s", start.elapsed().as_secs_f64());
    print_latency("mixed operation latency", &mut all);
}

async fn check_balance(manager: &BookingManager<WalBookingStore>, events: &[Event]) -> bool {
    let mut balanced = true;
    for event in events {
        let info = manager.ledger().event(&event.id).unwrap();
        let active = manager.active_seats(event.id).await.unwrap();
        if info.available_seats + active != info.total_seats {
            println!(
                "  MISMATCH on {}: available={} active={} total={}",
                event.id, info.available_seats, active, info.total_seats
            );
            balanced = false;
        }
    }
    balanced
}

#[tokio::main]
async fn main() {
    seatledger::observability::init_tracing();

    let mut config = Config::from_env();
    if std::env::var("SEATLEDGER_DATA_DIR").is_err() {
        config.data_dir = std::env::temp_dir().join(format!("seatledger_bench_{}", Ulid::new()));
    }
    if let Err(e) = seatledger::observability::init(config.metrics_port) {
        eprintln!("metrics exporter not installed: {e}");
    }

    println!("=== seatledger stress benchmark ===");
    println!("data_dir: {}\n", config.data_dir.display());

    println!("[setup]");
    let service = BookingService::open(&config).await.unwrap();
    let events = setup(&service).await;
    let manager = service.bookings().clone();

    println!("\n[phase 1] sequential create throughput");
    phase1_sequential(&manager, &events[8]).await;

    println!("\n[phase 2] contended creates on small events");
    phase2_contention(&manager, &events).await;

    println!("\n[phase 3] mixed create/amend/cancel");
    phase3_mixed(&manager, &events).await;

    println!("\n[check] available + active == total");
    if check_balance(&manager, &events).await {
        println!("  all {} events balanced", events.len());
    } else {
        std::process::exit(1);
    }
}
