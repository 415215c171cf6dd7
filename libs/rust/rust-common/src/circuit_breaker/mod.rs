//! Generic circuit breaker for protecting unreliable calls.
//!
//! The breaker wraps any async operation returning `Result<T, E>`. It has three
//! states:
//! - Closed: calls pass through while outcomes are counted
//! - Open: calls are rejected without running the operation
//! - Half-Open: a limited number of trial calls probe for recovery
//!
//! Every transition starts a new generation with fresh counters. Outcomes are
//! recorded against the generation that admitted the call, so results that
//! arrive after a transition are discarded.

mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

pub use state::{BreakerWindow, CircuitState, Counts, Rejection};

/// Decides when a closed circuit opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripPolicy {
    /// Open after this many failures in a row
    ConsecutiveFailures(u32),
    /// Open once at least `min_requests` were admitted and the failure ratio
    /// reaches `ratio`
    FailureRatio {
        /// Minimum admitted requests before the ratio is considered
        min_requests: u32,
        /// Failure ratio (0.0 to 1.0) that opens the circuit
        ratio: f64,
    },
}

impl Default for TripPolicy {
    fn default() -> Self {
        Self::ConsecutiveFailures(5)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Name for metrics and logging
    pub name: String,
    /// Trial requests admitted while half-open; this many consecutive
    /// successes close the circuit
    pub max_half_open_requests: u32,
    /// Period after which closed-state counters are cleared (never when `None`)
    pub interval: Option<Duration>,
    /// Time spent open before moving to half-open
    pub timeout: Duration,
    /// Condition that opens a closed circuit
    pub trip_policy: TripPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "circuit-breaker".to_string(),
            max_half_open_requests: 1,
            interval: None,
            timeout: Duration::from_secs(60),
            trip_policy: TripPolicy::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a configuration with default policy for the named circuit.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the number of half-open trial requests.
    #[must_use]
    pub fn with_max_half_open_requests(mut self, max: u32) -> Self {
        self.max_half_open_requests = max.max(1);
        self
    }

    /// Sets the closed-state counting interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Sets the open-state timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the trip policy.
    #[must_use]
    pub fn with_trip_policy(mut self, policy: TripPolicy) -> Self {
        self.trip_policy = policy;
        self
    }
}

/// Callback invoked with `(circuit, from, to)` on every state change.
///
/// Runs while the breaker lock is held and must not call back into the breaker.
pub type StateListener = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The call was rejected without being attempted
    #[error("circuit breaker '{service}' rejected the call while {state}")]
    Open {
        /// Name of the circuit
        service: String,
        /// State that caused the rejection
        state: CircuitState,
    },
    /// The guarded operation failed
    #[error("{0}")]
    ServiceError(E),
}

/// Circuit breaker shared by all callers of one dependency.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    window: Mutex<BreakerWindow>,
    listener: Option<StateListener>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let window = BreakerWindow::new(&config, Instant::now());
        Self {
            config,
            window: Mutex::new(window),
            listener: None,
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Registers a listener for state changes.
    #[must_use]
    pub fn with_state_listener<L>(mut self, listener: L) -> Self
    where
        L: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Returns the circuit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying any elapsed open timeout.
    pub fn state(&self) -> CircuitState {
        self.update(|window, config, now| window.current(config, now).0)
    }

    /// Counters of the current generation.
    pub fn counts(&self) -> Counts {
        self.window.lock().counts()
    }

    /// Runs `operation` if the circuit admits it.
    ///
    /// `Ok` outcomes count as successes and `Err` outcomes as failures. If the
    /// returned future is dropped before the operation completes, a closed-state
    /// call is forgotten and a half-open trial is recorded as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without calling `operation` when
    /// the call is rejected, or wraps the operation's own error in
    /// [`CircuitBreakerError::ServiceError`].
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_request()?;
        let mut call = InFlight {
            breaker: self,
            generation,
            settled: false,
        };

        let result = operation().await;
        call.settle(result.is_ok());
        result.map_err(CircuitBreakerError::ServiceError)
    }

    fn before_request<E>(&self) -> Result<u64, CircuitBreakerError<E>> {
        self.update(|window, config, now| window.before_request(config, now))
            .map_err(|rejection| {
                let state = match rejection {
                    Rejection::Open => CircuitState::Open,
                    Rejection::TrialInFlight => CircuitState::HalfOpen,
                };
                debug!(circuit = %self.config.name, %state, "Call rejected by circuit breaker");
                CircuitBreakerError::Open {
                    service: self.config.name.clone(),
                    state,
                }
            })
    }

    fn after_request(&self, generation: u64, success: bool) {
        self.update(|window, config, now| {
            window.after_request(config, now, generation, success);
        });
    }

    fn abandon_request(&self, generation: u64) {
        self.update(|window, config, now| window.abandon_request(config, now, generation));
    }

    fn update<R>(
        &self,
        operation: impl FnOnce(&mut BreakerWindow, &CircuitBreakerConfig, Instant) -> R,
    ) -> R {
        let mut window = self.window.lock();
        let from = window.raw_state();
        let result = operation(&mut window, &self.config, Instant::now());
        let to = window.raw_state();

        if from != to {
            if let Some(listener) = &self.listener {
                listener(&self.config.name, from, to);
            }
        }
        result
    }
}

/// Settles an admitted call that never reported an outcome.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon_request(self.generation);
        }
    }
}
