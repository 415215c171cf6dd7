//! Circuit Breaker State Management
//!
//! Pure bookkeeping for the breaker. Every operation receives `now` explicitly,
//! so transitions can be driven in tests without a real clock. Synchronization
//! is the caller's concern (see the parent module).

use std::fmt;
use std::time::Instant;

use tracing::{info, warn};

use super::{CircuitBreakerConfig, TripPolicy};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow through normally
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Circuit is admitting a limited number of trial requests
    HalfOpen,
}

impl CircuitState {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling request counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Requests admitted in this generation
    pub requests: u32,
    /// Successful outcomes recorded in this generation
    pub total_successes: u32,
    /// Failed outcomes recorded in this generation
    pub total_failures: u32,
    /// Successes since the last failure
    pub consecutive_successes: u32,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl Counts {
    /// Ratio of failures to admitted requests (0.0 when nothing was admitted).
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        f64::from(self.total_failures) / f64::from(self.requests)
    }

    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

impl TripPolicy {
    /// Whether the counts collected while closed should open the circuit.
    #[must_use]
    pub fn should_trip(&self, counts: &Counts) -> bool {
        match *self {
            Self::ConsecutiveFailures(threshold) => counts.consecutive_failures >= threshold,
            Self::FailureRatio {
                min_requests,
                ratio,
            } => counts.requests >= min_requests && counts.failure_ratio() >= ratio,
        }
    }
}

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The circuit is open
    Open,
    /// The circuit is half-open and its trial slots are taken
    TrialInFlight,
}

/// State, counters and generation of a single breaker.
#[derive(Debug)]
pub struct BreakerWindow {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

impl BreakerWindow {
    /// Creates a closed window at generation zero.
    #[must_use]
    pub fn new(config: &CircuitBreakerConfig, now: Instant) -> Self {
        let mut window = Self {
            state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        window.expiry = window.next_expiry(config, now);
        window
    }

    /// State as last stored, without applying any pending timeout.
    #[must_use]
    pub const fn raw_state(&self) -> CircuitState {
        self.state
    }

    /// Counters of the current generation.
    #[must_use]
    pub const fn counts(&self) -> Counts {
        self.counts
    }

    /// Current generation number.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Applies elapsed timers and returns the effective state and generation.
    pub fn current(&mut self, config: &CircuitBreakerConfig, now: Instant) -> (CircuitState, u64) {
        match self.state {
            CircuitState::Closed => {
                if self.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(config, now);
                }
            }
            CircuitState::Open => {
                if self.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(CircuitState::HalfOpen, config, now);
                }
            }
            CircuitState::HalfOpen => {}
        }
        (self.state, self.generation)
    }

    /// Admits a request, returning the generation it belongs to.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the circuit is open or every half-open
    /// trial slot is already taken.
    pub fn before_request(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Result<u64, Rejection> {
        let (state, generation) = self.current(config, now);

        match state {
            CircuitState::Open => return Err(Rejection::Open),
            CircuitState::HalfOpen if self.counts.requests >= config.max_half_open_requests => {
                return Err(Rejection::TrialInFlight);
            }
            _ => {}
        }

        self.counts.on_request();
        Ok(generation)
    }

    /// Records the outcome of a request admitted in `generation`.
    ///
    /// Outcomes from a superseded generation are dropped.
    pub fn after_request(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        generation: u64,
        success: bool,
    ) {
        let (state, current) = self.current(config, now);
        if current != generation {
            return;
        }

        if success {
            self.on_success(state, config, now);
        } else {
            self.on_failure(state, config, now);
        }
    }

    /// Settles a request admitted in `generation` whose caller went away.
    ///
    /// A closed-state request is forgotten, as if it was never admitted. An
    /// abandoned half-open trial counts as a failed trial so its slot cannot
    /// stay taken.
    pub fn abandon_request(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
        generation: u64,
    ) {
        let (state, current) = self.current(config, now);
        if current != generation {
            return;
        }

        match state {
            CircuitState::Closed => {
                self.counts.requests = self.counts.requests.saturating_sub(1);
            }
            CircuitState::HalfOpen => self.on_failure(state, config, now),
            CircuitState::Open => {}
        }
    }

    fn on_success(&mut self, state: CircuitState, config: &CircuitBreakerConfig, now: Instant) {
        match state {
            CircuitState::Closed => self.counts.on_success(),
            CircuitState::HalfOpen => {
                self.counts.on_success();
                if self.counts.consecutive_successes >= config.max_half_open_requests {
                    self.set_state(CircuitState::Closed, config, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&mut self, state: CircuitState, config: &CircuitBreakerConfig, now: Instant) {
        match state {
            CircuitState::Closed => {
                self.counts.on_failure();
                if config.trip_policy.should_trip(&self.counts) {
                    self.set_state(CircuitState::Open, config, now);
                }
            }
            CircuitState::HalfOpen => self.set_state(CircuitState::Open, config, now),
            CircuitState::Open => {}
        }
    }

    fn set_state(&mut self, next: CircuitState, config: &CircuitBreakerConfig, now: Instant) {
        if self.state == next {
            return;
        }

        let previous = self.state;
        let counts = self.counts;
        self.state = next;
        self.new_generation(config, now);

        match next {
            CircuitState::Open => warn!(
                circuit = %config.name,
                from = %previous,
                requests = counts.requests,
                failures = counts.total_failures,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => {
                info!(circuit = %config.name, "Circuit transitioning to half-open");
            }
            CircuitState::Closed => info!(circuit = %config.name, "Circuit closed after recovery"),
        }
    }

    fn new_generation(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.counts = Counts::default();
        self.expiry = self.next_expiry(config, now);
    }

    fn next_expiry(&self, config: &CircuitBreakerConfig, now: Instant) -> Option<Instant> {
        match self.state {
            CircuitState::Closed => config.interval.map(|interval| now + interval),
            CircuitState::Open => Some(now + config.timeout),
            CircuitState::HalfOpen => None,
        }
    }
}
