use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock source consulted once per tick to classify events.
///
/// Production code uses [`SystemClock`]; tests inject [`ManualClock`] to move
/// time across window boundaries deterministically.
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    /// Current time as an offset from the Unix epoch.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Clock that only moves when told to. Millisecond resolution.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now: Duration) -> Self {
        Self {
            now_ms: AtomicU64::new(duration_to_millis(now)),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn set(&self, now: Duration) {
        self.now_ms.store(duration_to_millis(now), Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: u64) {
        self.set(Duration::from_secs(secs));
    }

    pub fn advance(&self, delta: Duration) {
        self.now_ms
            .fetch_add(duration_to_millis(delta), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

fn duration_to_millis(value: Duration) -> u64 {
    value.as_millis().min(u128::from(u64::MAX)) as u64
}
