//! Scheduling core: window classification, sequential dispatch, the polling
//! loop, and the background tasks that accompany it.

pub mod classify;
pub mod dispatch;
pub(crate) mod lifecycle;
pub mod poll;

pub use classify::{Bucket, Classification, WindowRules};
pub use dispatch::{BatchReport, DispatchOutcome, Dispatcher, DispatcherParams};
pub use poll::{PollScheduler, TickReport};
