use super::dedup::{DedupPolicy, DedupSet, DispatchRecord, DispatchState};
use super::event::SubscriptionEvent;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, RwLock};

/// Holds the latest event set pushed by the indexer together with the dedup table.
///
/// The event set is an immutable snapshot replaced wholesale by [`EventRegistry::set_events`],
/// so a reader either sees the previous set or the new one, never a mix of both.
/// The dedup table is only written by the scheduler.
#[derive(Debug)]
pub struct EventRegistry {
    events: RwLock<Option<Arc<[SubscriptionEvent]>>>,
    dedup: Mutex<DedupSet>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new(DedupPolicy::default())
    }
}

impl EventRegistry {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            events: RwLock::new(None),
            dedup: Mutex::new(DedupSet::new(policy)),
        }
    }

    /// Replaces the working set, dropping cancelled events.
    pub fn set_events<I>(&self, events: I)
    where
        I: IntoIterator<Item = SubscriptionEvent>,
    {
        let mut received = 0usize;
        let live: Vec<SubscriptionEvent> = events
            .into_iter()
            .inspect(|_| received += 1)
            .filter(|event| !event.cancelled)
            .collect();
        let kept = live.len();
        let snapshot: Arc<[SubscriptionEvent]> = Arc::from(live);

        {
            let mut slot = self.events.write().expect("event registry lock poisoned");
            *slot = Some(snapshot);
        }

        tracing::info!(
            received,
            kept,
            cancelled = received - kept,
            dispatched = self.dedup_len(),
            "subscription event set replaced"
        );
    }

    /// Decodes a JSON array of events in the indexer's camelCase format and installs it.
    ///
    /// Returns the number of events kept after dropping cancelled ones.
    pub fn set_events_json(&self, raw: &str) -> Result<usize> {
        let events: Vec<SubscriptionEvent> =
            serde_json::from_str(raw).context("failed to decode subscription events")?;
        let kept = events.iter().filter(|event| !event.cancelled).count();
        self.set_events(events);
        Ok(kept)
    }

    /// Returns true once an event set has been provided at least once.
    pub fn is_initialized(&self) -> bool {
        self.events
            .read()
            .expect("event registry lock poisoned")
            .is_some()
    }

    /// The live set minus everything the dedup table blocks.
    ///
    /// Returns an empty vector when no event set has been provided yet.
    pub fn current_events(&self) -> Vec<SubscriptionEvent> {
        self.eligible_events().unwrap_or_default()
    }

    /// Like [`Self::current_events`] but distinguishes "never provided" (`None`)
    /// from an empty set.
    pub fn eligible_events(&self) -> Option<Vec<SubscriptionEvent>> {
        let snapshot = self.snapshot()?;
        let dedup = self.dedup.lock().expect("dedup table lock poisoned");
        Some(
            snapshot
                .iter()
                .filter(|event| !dedup.blocks(&event.transaction_hash))
                .cloned()
                .collect(),
        )
    }

    /// Raw snapshot as last provided, without dedup filtering.
    pub fn snapshot(&self) -> Option<Arc<[SubscriptionEvent]>> {
        self.events
            .read()
            .expect("event registry lock poisoned")
            .clone()
    }

    pub fn known_events(&self) -> usize {
        self.snapshot().map(|events| events.len()).unwrap_or(0)
    }

    pub(crate) fn mark_pending(&self, hash: &str) -> DispatchRecord {
        self.dedup
            .lock()
            .expect("dedup table lock poisoned")
            .mark_pending(hash)
    }

    pub(crate) fn resolve(&self, hash: &str, state: DispatchState) {
        self.dedup
            .lock()
            .expect("dedup table lock poisoned")
            .resolve(hash, state);
    }

    /// Dispatch record for `hash`, if the scheduler ever attempted it.
    pub fn dispatch_state(&self, hash: &str) -> Option<DispatchRecord> {
        self.dedup
            .lock()
            .expect("dedup table lock poisoned")
            .record(hash)
    }

    pub fn dedup_len(&self) -> usize {
        self.dedup.lock().expect("dedup table lock poisoned").len()
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        self.dedup.lock().expect("dedup table lock poisoned").policy()
    }
}
