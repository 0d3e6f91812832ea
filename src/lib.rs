pub mod ledger;
pub mod registry;
pub mod runtime;
pub mod scheduler;

pub use ledger::{
    CircuitBreakerSnapshot, CircuitState, DispatchError, LedgerAdapter, LedgerCircuitBreaker,
    LedgerFuture, LedgerOperation, TransactionReceipt, TxOptions,
};
pub use registry::{
    DedupPolicy, DispatchRecord, DispatchState, EventRegistry, OperatorId, SubscriptionEvent,
    SubscriptionTarget,
};
pub use runtime::clock::{Clock, ManualClock, SystemClock};
pub use runtime::config::{
    DelayPeriod, DispatchOrder, ProcessorConfig, ProcessorConfigBuilder, ProcessorConfigParams,
};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use scheduler::{Bucket, PollScheduler, TickReport, WindowRules};
