//! The polling control loop: classify, dispatch bucket by bucket, sleep, repeat.

use super::classify::{Bucket, WindowRules};
use super::dispatch::{BatchReport, Dispatcher, DispatcherParams};
use crate::ledger::{LedgerAdapter, LedgerCircuitBreaker};
use crate::registry::EventRegistry;
use crate::runtime::clock::{Clock, SystemClock};
use crate::runtime::config::{DispatchOrder, ProcessorConfig};
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// No event set had been provided yet, so classification did not run.
    pub skipped: bool,
    pub process: BatchReport,
    pub catch_late: BatchReport,
    pub activate: BatchReport,
    pub interrupted: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn bucket(&self, bucket: Bucket) -> &BatchReport {
        match bucket {
            Bucket::Process => &self.process,
            Bucket::CatchLate => &self.catch_late,
            Bucket::Activate => &self.activate,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut BatchReport {
        match bucket {
            Bucket::Process => &mut self.process,
            Bucket::CatchLate => &mut self.catch_late,
            Bucket::Activate => &mut self.activate,
        }
    }

    /// Events handed to the ledger this tick, successful or not.
    pub fn attempted(&self) -> usize {
        self.process.attempted() + self.catch_late.attempted() + self.activate.attempted()
    }
}

/// Single-worker scheduler driving every ledger submission for one operator.
pub struct PollScheduler<L: LedgerAdapter> {
    registry: Arc<EventRegistry>,
    rules: WindowRules,
    order: DispatchOrder,
    dispatcher: Dispatcher<L>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<Telemetry>,
    breaker: Option<Arc<LedgerCircuitBreaker>>,
    tick_interval: Duration,
}

impl<L: LedgerAdapter> PollScheduler<L> {
    /// Builds a scheduler reading wall-clock time from [`SystemClock`].
    pub fn new(config: &ProcessorConfig, ledger: Arc<L>) -> Self {
        Self::with_clock(config, ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ProcessorConfig, ledger: Arc<L>, clock: Arc<dyn Clock>) -> Self {
        debug_assert!(
            config.validate().is_ok(),
            "ProcessorConfig should have been validated at construction time"
        );

        let registry = Arc::new(EventRegistry::new(config.dedup_policy()));
        let telemetry = Arc::new(Telemetry::default());
        let breaker = config.breaker_failure_threshold().map(|threshold| {
            Arc::new(LedgerCircuitBreaker::new(threshold, config.breaker_cooldown()))
        });
        let dispatcher = Dispatcher::new(DispatcherParams {
            ledger,
            registry: registry.clone(),
            tx_options: config.tx_options(),
            dispatch_timeout: config.dispatch_timeout(),
            breaker: breaker.clone(),
            telemetry: telemetry.clone(),
        });

        Self {
            registry,
            rules: WindowRules::from_config(config),
            order: config.dispatch_order(),
            dispatcher,
            clock,
            telemetry,
            breaker,
            tick_interval: config.tick_interval(),
        }
    }

    /// Handle the event source pushes replacement sets into.
    pub fn registry(&self) -> Arc<EventRegistry> {
        self.registry.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// The ledger circuit breaker, if one was configured.
    pub fn breaker(&self) -> Option<Arc<LedgerCircuitBreaker>> {
        self.breaker.clone()
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Runs one classify-and-dispatch pass.
    pub async fn tick(&self, shutdown: &CancellationToken) -> TickReport {
        let Some(events) = self.registry.eligible_events() else {
            self.telemetry.record_skipped_tick();
            tracing::debug!("no subscription events provided yet; skipping classification");
            return TickReport::skipped();
        };
        self.telemetry.record_tick();

        let now = self.clock.now();
        let classification = self.rules.classify(events, now, self.order);
        tracing::debug!(
            now = now.as_secs_f64(),
            process = classification.process.len(),
            catch_late = classification.catch_late.len(),
            activate = classification.activate.len(),
            "classified pending subscription events"
        );

        let mut report = TickReport::default();
        for (bucket, events) in classification.into_batches() {
            if events.is_empty() {
                continue;
            }

            let batch = self
                .dispatcher
                .dispatch_batch(bucket, &events, shutdown)
                .await;
            *report.bucket_mut(bucket) = batch;

            if batch.interrupted {
                report.interrupted = true;
                break;
            }
        }

        report
    }

    /// Ticks until `shutdown` fires. Shutdown preempts both the inter-tick delay
    /// and any in-flight ledger call.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            operator = %self.rules.operator(),
            tick_interval = ?self.tick_interval,
            "poll scheduler started"
        );

        while !shutdown.is_cancelled() {
            let report = self.tick(&shutdown).await;
            if report.interrupted {
                break;
            }
            if report.attempted() > 0 {
                tracing::debug!(
                    attempted = report.attempted(),
                    processed = report.process.submitted,
                    caught_late = report.catch_late.submitted,
                    activated = report.activate.submitted,
                    "tick finished"
                );
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.tick_interval) => {}
            }
        }

        tracing::info!("poll scheduler stopped");
    }
}
