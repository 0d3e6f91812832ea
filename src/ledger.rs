//! Boundary with the ledger layer: the adapter trait the scheduler submits
//! through, the fixed transaction options, dispatch errors, and the circuit
//! breaker guarding submissions while the ledger is unhealthy.

pub mod adapter;
pub mod circuit_breaker;
pub mod options;

pub use adapter::{DispatchError, LedgerAdapter, LedgerFuture, LedgerOperation, TransactionReceipt};
pub use circuit_breaker::{
    CircuitBreakerError, CircuitBreakerSnapshot, CircuitState, LedgerCircuitBreaker,
};
pub use options::TxOptions;
