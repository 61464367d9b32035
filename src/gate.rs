use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source for the gate.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    InFlight,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenyReason,
    pub remaining_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    Denied(Denial),
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted)
    }
}

#[derive(Default)]
struct GateState {
    last_success: Option<Instant>,
    in_flight: bool,
}

/// Admission control for a single trigger route: one outstanding attempt at a
/// time, and a cooldown window after each successful attempt.
pub struct CooldownGate {
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<GateState>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, Arc::new(MonotonicClock))
    }

    pub fn with_clock(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown,
            clock,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check-and-set under the lock. In-flight wins over cooldown.
    pub fn begin(&self) -> Admission {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.in_flight {
            return Admission::Denied(Denial {
                reason: DenyReason::InFlight,
                remaining_seconds: 0,
            });
        }

        if let Some(last) = state.last_success {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return Admission::Denied(Denial {
                    reason: DenyReason::Cooldown,
                    // Truncated to whole seconds.
                    remaining_seconds: (self.cooldown - elapsed).as_secs(),
                });
            }
        }

        state.in_flight = true;
        Admission::Granted
    }

    /// Release a granted admission. Only a successful attempt starts the
    /// cooldown clock, measured from completion.
    pub fn finish(&self, success: bool) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if success {
            state.last_success = Some(now);
        }
        state.in_flight = false;
    }

    /// Scoped form of [`begin`](Self::begin). The returned permit owns a
    /// handle to the gate so it can move into a spawned task, and releases
    /// the gate exactly once, as a failure unless completed otherwise.
    pub fn try_acquire(self: &Arc<Self>) -> Result<GatePermit, Denial> {
        match self.begin() {
            Admission::Granted => Ok(GatePermit {
                gate: Arc::clone(self),
                released: false,
            }),
            Admission::Denied(denial) => Err(denial),
        }
    }
}

pub struct GatePermit {
    gate: Arc<CooldownGate>,
    released: bool,
}

impl GatePermit {
    pub fn complete(mut self, success: bool) {
        self.released = true;
        self.gate.finish(success);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        if !self.released {
            self.gate.finish(false);
        }
    }
}
