use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state as surfaced on `/health` and `/metrics` (§3 "Provider health record").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Per-provider-slot circuit breaker (§4.2).
///
/// Opens for a fixed cool-off window on a rate-limit or unavailable
/// response; the slot is skipped entirely while open. After the window
/// elapses the breaker moves to half-open and lets exactly one trial
/// request through.
pub struct CircuitBreaker {
    state: AtomicU8,
    cooloff_until: Mutex<Option<Instant>>,
    cooloff: Duration,
}

impl CircuitBreaker {
    pub fn new(cooloff: Duration) -> Self {
        Self {
            state: AtomicU8::new(CLOSED),
            cooloff_until: Mutex::new(None),
            cooloff,
        }
    }

    /// Whether a call should be allowed through right now. Flips an expired
    /// open breaker to half-open as a side effect.
    pub fn allow(&self) -> bool {
        match self.state.load(Ordering::SeqCst) {
            CLOSED | HALF_OPEN => true,
            _ => {
                let expired = {
                    let guard = self.cooloff_until.lock().unwrap();
                    matches!(*guard, Some(until) if Instant::now() >= until)
                };
                if expired {
                    self.state.store(HALF_OPEN, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.state.store(CLOSED, Ordering::SeqCst);
        *self.cooloff_until.lock().unwrap() = None;
    }

    pub fn record_trip(&self) {
        self.state.store(OPEN, Ordering::SeqCst);
        *self.cooloff_until.lock().unwrap() = Some(Instant::now() + self.cooloff);
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::SeqCst) {
            CLOSED => BreakerState::Closed,
            HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Open,
        }
    }
}
