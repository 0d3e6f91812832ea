use crate::ledger::options::TxOptions;
use crate::registry::SubscriptionTarget;
use anyhow::{Error as AnyError, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

pub type LedgerFuture<'a> = BoxFuture<'a, Result<TransactionReceipt>>;

/// Ledger operations the scheduler can submit for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOperation {
    Activate,
    Process,
    CatchLate,
}

impl LedgerOperation {
    /// Name of the executor contract method backing the operation.
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Activate => "activateSubscription",
            Self::Process => "processSubscription",
            Self::CatchLate => "catchLateSubscription",
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Acknowledgement returned by the ledger adapter for a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
}

impl TransactionReceipt {
    pub fn new(transaction_hash: impl Into<String>) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
        }
    }
}

/// Implemented by the component that signs and submits executor transactions.
///
/// Each call either succeeds or fails with a reason; the scheduler does not
/// interpret the error beyond logging and counting it.
pub trait LedgerAdapter: Send + Sync + 'static {
    fn activate<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a>;

    fn process<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a>;

    fn catch_late<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a>;

    /// Routes `operation` to the matching method.
    fn submit<'a>(
        &'a self,
        operation: LedgerOperation,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        match operation {
            LedgerOperation::Activate => self.activate(target, options),
            LedgerOperation::Process => self.process(target, options),
            LedgerOperation::CatchLate => self.catch_late(target, options),
        }
    }
}

/// Failure of a single ledger call. Always contained by the dispatcher.
#[derive(Debug)]
pub enum DispatchError {
    Timeout {
        operation: LedgerOperation,
        after: Duration,
    },
    Ledger {
        operation: LedgerOperation,
        source: AnyError,
    },
}

impl DispatchError {
    pub fn operation(&self) -> LedgerOperation {
        match self {
            Self::Timeout { operation, .. }
            | Self::Ledger { operation, .. } => *operation,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { operation, after } => {
                write!(f, "{operation} timed out after {}ms", after.as_millis())
            }
            Self::Ledger { operation, source } => write!(f, "{operation} failed: {source}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ledger { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
