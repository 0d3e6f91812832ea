//! Lifecycle orchestration for a running [`PollScheduler`].

use super::poll::PollScheduler;
use crate::ledger::LedgerAdapter;
use crate::runtime::telemetry;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct LifecycleHandles {
    pub run_token: CancellationToken,
    poll_handle: Option<JoinHandle<()>>,
    metrics_handle: Option<JoinHandle<()>>,
}

pub(crate) struct LifecycleSpawnParams<'a, L: LedgerAdapter> {
    pub shutdown_root: &'a CancellationToken,
    pub scheduler: Arc<PollScheduler<L>>,
    pub metrics_interval: Duration,
}

impl LifecycleHandles {
    pub(crate) fn spawn<L: LedgerAdapter>(params: LifecycleSpawnParams<'_, L>) -> Self {
        let LifecycleSpawnParams {
            shutdown_root,
            scheduler,
            metrics_interval,
        } = params;

        let run_token = shutdown_root.child_token();
        let metrics_handle = telemetry::spawn_metrics_reporter(
            scheduler.telemetry(),
            scheduler.registry(),
            run_token.clone(),
            metrics_interval,
        );

        let poll_token = run_token.clone();
        let poll_handle = tokio::spawn(async move { scheduler.run(poll_token).await });

        Self {
            run_token,
            poll_handle: Some(poll_handle),
            metrics_handle: Some(metrics_handle),
        }
    }

    /// True once the poll loop has returned, whether through shutdown or a panic.
    pub(crate) fn poll_finished(&self) -> bool {
        self.poll_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Cancels both tasks and joins them. A panicked poll loop is reported as an error.
    pub(crate) async fn shutdown(mut self) -> Result<()> {
        self.run_token.cancel();

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }

        if let Some(handle) = self.poll_handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "poll scheduler task panicked");
                return Err(anyhow!("poll scheduler task panicked: {err}"));
            }
        }

        Ok(())
    }
}
