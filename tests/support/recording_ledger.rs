use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use subproc::{
    LedgerAdapter, LedgerFuture, LedgerOperation, SubscriptionTarget, TransactionReceipt,
    TxOptions,
};
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: LedgerOperation,
    pub payment_identifier: String,
    pub sender: String,
}

#[derive(Default)]
struct LedgerState {
    calls: Vec<RecordedCall>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    fail_all: bool,
    latency: Option<Duration>,
}

/// Ledger double that records every submission. Clones share state, so a test can
/// keep a handle after moving one into a runner.
#[derive(Clone, Default)]
pub struct RecordingLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_all(self) -> Self {
        self.state.lock().unwrap().fail_all = true;
        self
    }

    pub fn failing_on(self, payment_identifier: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(payment_identifier.to_owned());
        self
    }

    /// Submissions for this payment never resolve.
    pub fn hanging_on(self, payment_identifier: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .hanging
            .insert(payment_identifier.to_owned());
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn payments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.payment_identifier)
            .collect()
    }

    fn submit_call<'a>(
        &'a self,
        operation: LedgerOperation,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        let (fail, hang, latency) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(RecordedCall {
                operation,
                payment_identifier: target.payment_identifier.clone(),
                sender: options.sender.to_string(),
            });
            (
                state.fail_all || state.failing.contains(&target.payment_identifier),
                state.hanging.contains(&target.payment_identifier),
                state.latency,
            )
        };

        Box::pin(async move {
            if hang {
                futures::future::pending::<()>().await;
            }
            if let Some(latency) = latency {
                sleep(latency).await;
            }
            if fail {
                return Err(anyhow!(
                    "{} reverted for {}",
                    operation.method(),
                    target.payment_identifier
                ));
            }
            Ok(TransactionReceipt::new(format!(
                "0x{}-{}",
                operation.method(),
                target.payment_identifier
            )))
        })
    }
}

impl LedgerAdapter for RecordingLedger {
    fn activate<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        self.submit_call(LedgerOperation::Activate, target, options)
    }

    fn process<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        self.submit_call(LedgerOperation::Process, target, options)
    }

    fn catch_late<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        self.submit_call(LedgerOperation::CatchLate, target, options)
    }
}
