//! Event registry: the latest subscription event set pushed by the indexer and
//! the dedup table recording which transaction hashes were already submitted.

pub mod dedup;
pub mod event;
pub mod store;

pub use dedup::{DedupPolicy, DedupSet, DispatchRecord, DispatchState};
pub use event::{OperatorId, SubscriptionEvent, SubscriptionTarget};
pub use store::EventRegistry;
