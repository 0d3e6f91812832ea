use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_FAILURE_THRESHOLD: usize = 5;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Current state of the ledger circuit breaker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of breaker internals for observability.
#[derive(Debug, Copy, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Returned when the breaker refuses a submission.
#[derive(Debug, PartialEq, Eq)]
pub enum CircuitBreakerError {
    CircuitOpen,
}

impl std::fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "ledger circuit breaker is open"),
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

/// Stops submissions after repeated ledger failures and lets a single probe
/// through once the cooldown elapses.
///
/// While open, the dispatcher leaves events untouched so they stay eligible on
/// later ticks instead of being marked as attempted.
#[derive(Debug)]
pub struct LedgerCircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: usize,
    cooldown: Duration,
}

impl Default for LedgerCircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl LedgerCircuitBreaker {
    pub fn new(failure_threshold: usize, cooldown: Duration) -> Self {
        let cooldown = if cooldown.is_zero() {
            Duration::from_millis(1)
        } else {
            cooldown
        };

        Self {
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let guard = self.state.lock().expect("circuit breaker mutex poisoned");
        CircuitBreakerSnapshot {
            state: guard.state,
            consecutive_failures: guard.consecutive_failures,
            opened_at: guard.opened_at,
        }
    }

    /// Checks whether a submission may proceed, reserving the half-open probe if needed.
    pub fn before_submit(&self) -> Result<CircuitState, CircuitBreakerError> {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");

        if state.state == CircuitState::Open {
            let cooled_down = state
                .opened_at
                .map(|opened_at| opened_at.elapsed() >= self.cooldown)
                .unwrap_or(false);
            if !cooled_down {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            Self::transition(&mut state, CircuitState::HalfOpen);
            state.probe_in_flight = false;
        }

        if state.state == CircuitState::HalfOpen {
            if state.probe_in_flight {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            state.probe_in_flight = true;
        }

        Ok(state.state)
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.probe_in_flight = false;
        state.consecutive_failures = 0;

        if state.state == CircuitState::HalfOpen {
            state.opened_at = None;
            Self::transition(&mut state, CircuitState::Closed);
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.probe_in_flight = false;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let trip = match state.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => state.consecutive_failures >= self.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            state.opened_at = Some(Instant::now());
            Self::transition(&mut state, CircuitState::Open);
        }
    }

    /// Releases a reserved probe without counting it as success or failure,
    /// e.g. when shutdown interrupts the submission.
    pub fn release(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.probe_in_flight = false;
    }

    fn transition(state: &mut BreakerState, next: CircuitState) {
        if state.state != next {
            tracing::warn!(
                previous = ?state.state,
                next = ?next,
                consecutive_failures = state.consecutive_failures,
                "ledger circuit breaker state changed"
            );
            state.state = next;
        }
    }
}
