//! Time-window and claim classification of pending subscription events.
//!
//! Classification is a pure function of the event, the operator identity, the
//! delay offsets, and a single `now` snapshot taken once per tick.

use crate::ledger::LedgerOperation;
use crate::registry::{OperatorId, SubscriptionEvent};
use crate::runtime::config::{DelayPeriod, DispatchOrder, ProcessorConfig};
use std::fmt;
use std::time::Duration;

/// Work buckets in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Process,
    CatchLate,
    Activate,
}

impl Bucket {
    pub const DISPATCH_ORDER: [Bucket; 3] = [Bucket::Process, Bucket::CatchLate, Bucket::Activate];

    pub const fn operation(&self) -> LedgerOperation {
        match self {
            Bucket::Process => LedgerOperation::Process,
            Bucket::CatchLate => LedgerOperation::CatchLate,
            Bucket::Activate => LedgerOperation::Activate,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Bucket::Process => "process",
            Bucket::CatchLate => "catch_late",
            Bucket::Activate => "activate",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Claim and window rules applied by one operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRules {
    operator: OperatorId,
    delays: DelayPeriod,
    catch_late_unclaimed: bool,
}

impl WindowRules {
    pub fn new(operator: OperatorId, delays: DelayPeriod) -> Self {
        Self {
            operator,
            delays,
            catch_late_unclaimed: false,
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.operator().clone(), config.delays())
            .with_catch_late_unclaimed(config.catch_late_unclaimed())
    }

    /// Lets unclaimed events fall through to catch-late once the exclusive window closes.
    pub fn with_catch_late_unclaimed(mut self, enabled: bool) -> Self {
        self.catch_late_unclaimed = enabled;
        self
    }

    pub fn operator(&self) -> &OperatorId {
        &self.operator
    }

    /// Bucket the event belongs to at `now`, if any. Earlier buckets win on overlap.
    pub fn bucket_for(&self, event: &SubscriptionEvent, now: Duration) -> Option<Bucket> {
        if event.cancelled {
            return None;
        }

        if self.in_process_window(event, now) {
            Some(Bucket::Process)
        } else if self.in_catch_late_window(event, now) {
            Some(Bucket::CatchLate)
        } else if self.needs_activation(event, now) {
            Some(Bucket::Activate)
        } else {
            None
        }
    }

    fn in_process_window(&self, event: &SubscriptionEvent, now: Duration) -> bool {
        event.activated
            && event.claimable_by(&self.operator)
            && within(
                now,
                offset(event, self.delays.processing()),
                offset(event, self.delays.catch_late()),
            )
    }

    fn in_catch_late_window(&self, event: &SubscriptionEvent, now: Duration) -> bool {
        let claim_allows = event.claimed_by_other(&self.operator)
            || (self.catch_late_unclaimed && event.claimant.is_none());

        event.activated
            && claim_allows
            && within(
                now,
                offset(event, self.delays.catch_late()),
                offset(event, self.delays.stop_checking()),
            )
    }

    fn needs_activation(&self, event: &SubscriptionEvent, now: Duration) -> bool {
        !event.activated && now >= event.due_at()
    }

    /// Splits `events` into the three buckets using a single `now` snapshot.
    pub fn classify(
        &self,
        events: impl IntoIterator<Item = SubscriptionEvent>,
        now: Duration,
        order: DispatchOrder,
    ) -> Classification {
        let mut classification = Classification::default();
        for event in events {
            match self.bucket_for(&event, now) {
                Some(Bucket::Process) => classification.process.push(event),
                Some(Bucket::CatchLate) => classification.catch_late.push(event),
                Some(Bucket::Activate) => classification.activate.push(event),
                None => {}
            }
        }

        if order == DispatchOrder::DueDate {
            classification.sort_by_due_date();
        }
        classification
    }
}

fn offset(event: &SubscriptionEvent, delay: Duration) -> Duration {
    event.due_at().saturating_add(delay)
}

fn within(now: Duration, start: Duration, end: Duration) -> bool {
    now >= start && now <= end
}

/// Result of classifying one tick's worth of events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub process: Vec<SubscriptionEvent>,
    pub catch_late: Vec<SubscriptionEvent>,
    pub activate: Vec<SubscriptionEvent>,
}

impl Classification {
    pub fn bucket(&self, bucket: Bucket) -> &[SubscriptionEvent] {
        match bucket {
            Bucket::Process => &self.process,
            Bucket::CatchLate => &self.catch_late,
            Bucket::Activate => &self.activate,
        }
    }

    pub fn len(&self) -> usize {
        self.process.len() + self.catch_late.len() + self.activate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buckets paired with their events, in dispatch order.
    pub fn into_batches(self) -> [(Bucket, Vec<SubscriptionEvent>); 3] {
        [
            (Bucket::Process, self.process),
            (Bucket::CatchLate, self.catch_late),
            (Bucket::Activate, self.activate),
        ]
    }

    fn sort_by_due_date(&mut self) {
        // `sort_by_key` is stable, so equal due dates keep encounter order.
        self.process.sort_by_key(|event| event.due_date);
        self.catch_late.sort_by_key(|event| event.due_date);
        self.activate.sort_by_key(|event| event.due_date);
    }
}
