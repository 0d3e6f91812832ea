use std::collections::HashMap;

/// Decides whether a previously attempted hash may be dispatched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Any attempted hash is never dispatched again, whatever the outcome.
    #[default]
    AtMostOnce,
    /// Hashes whose last attempt failed become eligible again until
    /// `max_attempts` submissions have been made.
    RetryFailed { max_attempts: usize },
}

/// Outcome recorded for a submitted transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Marked before the ledger call resolved (or the call was interrupted).
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub state: DispatchState,
    pub attempts: usize,
}

/// Append-only table of transaction hashes the scheduler has attempted.
#[derive(Debug, Default)]
pub struct DedupSet {
    policy: DedupPolicy,
    records: HashMap<String, DispatchRecord>,
}

impl DedupSet {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Marks `hash` as in flight. Called before the ledger operation is issued.
    pub fn mark_pending(&mut self, hash: &str) -> DispatchRecord {
        let record = self
            .records
            .entry(hash.to_owned())
            .or_insert(DispatchRecord {
                state: DispatchState::Pending,
                attempts: 0,
            });
        record.state = DispatchState::Pending;
        record.attempts = record.attempts.saturating_add(1);
        *record
    }

    /// Records the outcome of the latest attempt. Unknown hashes are ignored.
    pub fn resolve(&mut self, hash: &str, state: DispatchState) {
        if let Some(record) = self.records.get_mut(hash) {
            record.state = state;
        }
    }

    pub fn record(&self, hash: &str) -> Option<DispatchRecord> {
        self.records.get(hash).copied()
    }

    /// Returns true when `hash` must not be scheduled again.
    pub fn blocks(&self, hash: &str) -> bool {
        let Some(record) = self.records.get(hash) else {
            return false;
        };

        match self.policy {
            DedupPolicy::AtMostOnce => true,
            DedupPolicy::RetryFailed { max_attempts } => match record.state {
                DispatchState::Pending | DispatchState::Confirmed => true,
                DispatchState::Failed => record.attempts >= max_attempts,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
