//! Sequential submission of one bucket's events to the ledger adapter.

use super::classify::Bucket;
use crate::ledger::{
    DispatchError, LedgerAdapter, LedgerCircuitBreaker, TransactionReceipt, TxOptions,
};
use crate::registry::{DispatchState, EventRegistry, SubscriptionEvent};
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Result of a single dispatch attempt.
#[derive(Debug)]
pub enum DispatchOutcome {
    Submitted(TransactionReceipt),
    Failed(DispatchError),
    /// The circuit breaker refused the submission; the event was left untouched.
    Deferred,
    /// Shutdown interrupted the in-flight call; the event stays marked as pending.
    Cancelled,
}

/// Per-bucket tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub submitted: usize,
    pub failed: usize,
    pub deferred: usize,
    pub interrupted: bool,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.submitted + self.failed
    }
}

pub struct DispatcherParams<L: LedgerAdapter> {
    pub ledger: Arc<L>,
    pub registry: Arc<EventRegistry>,
    pub tx_options: TxOptions,
    pub dispatch_timeout: Duration,
    /// `None` submits every bucketed event regardless of recent failures.
    pub breaker: Option<Arc<LedgerCircuitBreaker>>,
    pub telemetry: Arc<Telemetry>,
}

pub struct Dispatcher<L: LedgerAdapter> {
    ledger: Arc<L>,
    registry: Arc<EventRegistry>,
    tx_options: TxOptions,
    dispatch_timeout: Duration,
    breaker: Option<Arc<LedgerCircuitBreaker>>,
    telemetry: Arc<Telemetry>,
}

impl<L: LedgerAdapter> Dispatcher<L> {
    pub fn new(params: DispatcherParams<L>) -> Self {
        Self {
            ledger: params.ledger,
            registry: params.registry,
            tx_options: params.tx_options,
            dispatch_timeout: params.dispatch_timeout,
            breaker: params.breaker,
            telemetry: params.telemetry,
        }
    }

    pub fn tx_options(&self) -> &TxOptions {
        &self.tx_options
    }

    /// Dispatches `events` one after another. A failing event never stops the batch;
    /// only shutdown does.
    pub async fn dispatch_batch(
        &self,
        bucket: Bucket,
        events: &[SubscriptionEvent],
        shutdown: &CancellationToken,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for event in events {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }

            match self.dispatch_one(bucket, event, shutdown).await {
                DispatchOutcome::Submitted(_) => report.submitted += 1,
                DispatchOutcome::Failed(_) => report.failed += 1,
                DispatchOutcome::Deferred => report.deferred += 1,
                DispatchOutcome::Cancelled => {
                    report.interrupted = true;
                    break;
                }
            }
        }

        report
    }

    /// Marks the event as attempted, then submits the bucket's ledger operation.
    pub async fn dispatch_one(
        &self,
        bucket: Bucket,
        event: &SubscriptionEvent,
        shutdown: &CancellationToken,
    ) -> DispatchOutcome {
        let operation = bucket.operation();
        let tx_hash = event.transaction_hash.as_str();

        if let Some(breaker) = &self.breaker {
            if let Err(err) = breaker.before_submit() {
                self.telemetry.record_circuit_rejection();
                tracing::debug!(
                    tx_hash,
                    %operation,
                    error = %err,
                    "ledger unavailable; leaving event for a later tick"
                );
                return DispatchOutcome::Deferred;
            }
        }

        let record = self.registry.mark_pending(tx_hash);
        self.telemetry.record_dispatch(operation);
        tracing::info!(
            tx_hash,
            %operation,
            contract = %event.contract_address,
            payment = %event.payment_identifier,
            due_date = event.due_date,
            claimant = ?event.claimant.as_ref().map(|claimant| claimant.as_str()),
            attempt = record.attempts,
            "sending {bucket} transaction"
        );

        let target = event.target();
        let call = timeout(
            self.dispatch_timeout,
            self.ledger.submit(operation, &target, &self.tx_options),
        );

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = call => Some(result),
        };

        match result {
            None => {
                self.with_breaker(LedgerCircuitBreaker::release);
                tracing::info!(tx_hash, %operation, "shutdown interrupted in-flight submission");
                DispatchOutcome::Cancelled
            }
            Some(Ok(Ok(receipt))) => {
                self.with_breaker(LedgerCircuitBreaker::record_success);
                self.registry.resolve(tx_hash, DispatchState::Confirmed);
                tracing::debug!(
                    tx_hash,
                    %operation,
                    ledger_tx = %receipt.transaction_hash,
                    "ledger accepted submission"
                );
                DispatchOutcome::Submitted(receipt)
            }
            Some(Ok(Err(source))) => {
                self.with_breaker(LedgerCircuitBreaker::record_failure);
                self.registry.resolve(tx_hash, DispatchState::Failed);
                self.telemetry.record_dispatch_failure();
                let err = DispatchError::Ledger { operation, source };
                tracing::warn!(tx_hash, error = %err, "ledger submission failed");
                DispatchOutcome::Failed(err)
            }
            Some(Err(_elapsed)) => {
                // The transaction may still land, so the record stays pending.
                self.with_breaker(LedgerCircuitBreaker::record_failure);
                self.telemetry.record_dispatch_timeout();
                let err = DispatchError::Timeout {
                    operation,
                    after: self.dispatch_timeout,
                };
                tracing::warn!(tx_hash, error = %err, "ledger submission timed out");
                DispatchOutcome::Failed(err)
            }
        }
    }

    fn with_breaker(&self, record: impl FnOnce(&LedgerCircuitBreaker)) {
        if let Some(breaker) = self.breaker.as_deref() {
            record(breaker);
        }
    }
}
