use crate::ledger::LedgerOperation;
use crate::registry::EventRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing scheduler activity.
#[derive(Default, Debug)]
pub struct Telemetry {
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    activations: AtomicU64,
    processed: AtomicU64,
    caught_late: AtomicU64,
    dispatch_failures: AtomicU64,
    dispatch_timeouts: AtomicU64,
    circuit_rejections: AtomicU64,
}

impl Telemetry {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// A tick that ran before any event set was provided.
    pub fn record_skipped_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a submission handed to the ledger adapter, whatever its outcome.
    pub fn record_dispatch(&self, operation: LedgerOperation) {
        let counter = match operation {
            LedgerOperation::Activate => &self.activations,
            LedgerOperation::Process => &self.processed,
            LedgerOperation::CatchLate => &self.caught_late,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_timeout(&self) {
        self.dispatch_timeouts.fetch_add(1, Ordering::Relaxed);
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            caught_late: self.caught_late.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            dispatch_timeouts: self.dispatch_timeouts.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.snapshot().dispatched()
    }

    pub fn dispatch_failures(&self) -> u64 {
        self.dispatch_failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub activations: u64,
    pub processed: u64,
    pub caught_late: u64,
    pub dispatch_failures: u64,
    pub dispatch_timeouts: u64,
    pub circuit_rejections: u64,
}

impl TelemetrySnapshot {
    pub fn dispatched(&self) -> u64 {
        self.activations + self.processed + self.caught_late
    }
}

/// Spawns a background task that periodically logs registry size, dispatch
/// counters, and failures until `shutdown` fires.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    registry: Arc<EventRegistry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "subproc::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let dispatched_delta = current
                        .dispatched()
                        .saturating_sub(last_snapshot.dispatched());

                    tracing::info!(
                        target: "subproc::metrics",
                        known_events = registry.known_events(),
                        dedup_entries = registry.dedup_len(),
                        ticks = current.ticks,
                        dispatched = current.dispatched(),
                        dispatched_delta,
                        activations = current.activations,
                        processed = current.processed,
                        caught_late = current.caught_late,
                        dispatch_failures = current.dispatch_failures,
                        dispatch_timeouts = current.dispatch_timeouts,
                        circuit_rejections = current.circuit_rejections,
                        "scheduler metrics snapshot"
                    );

                    last_snapshot = current;
                }
            }
        }
    })
}
