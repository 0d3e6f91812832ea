use crate::ledger::{LedgerAdapter, LedgerCircuitBreaker};
use crate::registry::EventRegistry;
use crate::runtime::clock::{Clock, SystemClock};
use crate::runtime::config::ProcessorConfig;
use crate::runtime::telemetry::Telemetry;
use crate::scheduler::lifecycle::{LifecycleHandles, LifecycleSpawnParams};
use crate::scheduler::PollScheduler;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates the scheduler lifecycle and handles OS signals for graceful shutdowns.
pub struct Runner<L: LedgerAdapter> {
    scheduler: Arc<PollScheduler<L>>,
    metrics_interval: Duration,
    shutdown: CancellationToken,
    lifecycle: Option<LifecycleHandles>,
}

impl<L: LedgerAdapter> Runner<L> {
    /// Creates a runner that reads wall-clock time.
    pub fn new(config: ProcessorConfig, ledger: L) -> Self {
        Self::with_clock(config, ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ProcessorConfig, ledger: L, clock: Arc<dyn Clock>) -> Self {
        let scheduler = PollScheduler::with_clock(&config, Arc::new(ledger), clock);
        Self {
            scheduler: Arc::new(scheduler),
            metrics_interval: config.metrics_interval(),
            shutdown: CancellationToken::new(),
            lifecycle: None,
        }
    }

    /// Registry the event source pushes replacement sets into. Stays valid across restarts.
    pub fn registry(&self) -> Arc<EventRegistry> {
        self.scheduler.registry()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.scheduler.telemetry()
    }

    pub fn breaker(&self) -> Option<Arc<LedgerCircuitBreaker>> {
        self.scheduler.breaker()
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle
            .as_ref()
            .is_some_and(|lifecycle| !lifecycle.poll_finished())
    }

    /// Spawns the poll loop and the metrics reporter.
    pub async fn start(&mut self) -> Result<()> {
        if self.lifecycle.is_some() {
            return Ok(());
        }

        self.lifecycle = Some(LifecycleHandles::spawn(LifecycleSpawnParams {
            shutdown_root: &self.shutdown,
            scheduler: self.scheduler.clone(),
            metrics_interval: self.metrics_interval,
        }));
        Ok(())
    }

    /// Stops the loop gracefully, waiting for any in-flight tick to unwind.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(lifecycle) = self.lifecycle.take() else {
            return Ok(());
        };

        self.shutdown.cancel();
        let result = lifecycle.shutdown().await;
        self.reinitialize_shutdown_token();
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
    }
}
