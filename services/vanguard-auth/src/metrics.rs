//! Request and Circuit Breaker Metrics
//!
//! Prometheus counters for Configure and Login outcomes plus the login
//! circuit's state. The registry is owned here rather than being global so
//! tests can build independent instances.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use rust_common::CircuitState;

use crate::error::PluginError;

const NAMESPACE: &str = "vanguard_auth";

/// Outcome label for a successful request.
pub const OUTCOME_SUCCESS: &str = "success";

/// Service metrics
pub struct GatewayMetrics {
    registry: Registry,
    /// Login requests by outcome
    pub login_requests: IntCounterVec,
    /// Configure requests by outcome
    pub configure_requests: IntCounterVec,
    /// Current circuit state (0=closed, 1=open, 2=half-open)
    pub circuit_state: IntGaugeVec,
    /// Circuit state changes
    pub circuit_state_changes: IntCounterVec,
}

impl GatewayMetrics {
    /// Creates the metrics and registers them with a fresh registry.
    ///
    /// # Errors
    ///
    /// Fails if a metric descriptor is invalid or registered twice.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let login_requests = IntCounterVec::new(
            Opts::new("login_requests_total", "Total login requests").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(login_requests.clone()))?;

        let configure_requests = IntCounterVec::new(
            Opts::new("configure_requests_total", "Total configure requests")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(configure_requests.clone()))?;

        let circuit_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Current circuit breaker state")
                .namespace(NAMESPACE),
            &["circuit"],
        )?;
        registry.register(Box::new(circuit_state.clone()))?;

        let circuit_state_changes = IntCounterVec::new(
            Opts::new(
                "circuit_breaker_state_changes_total",
                "Total circuit breaker state changes",
            )
            .namespace(NAMESPACE),
            &["circuit", "from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_state_changes.clone()))?;

        Ok(Self {
            registry,
            login_requests,
            configure_requests,
            circuit_state,
            circuit_state_changes,
        })
    }

    /// Records the outcome of a Login call.
    pub fn record_login<T>(&self, result: &Result<T, PluginError>) {
        self.login_requests
            .with_label_values(&[outcome(result)])
            .inc();
    }

    /// Records the outcome of a Configure call.
    pub fn record_configure<T>(&self, result: &Result<T, PluginError>) {
        self.configure_requests
            .with_label_values(&[outcome(result)])
            .inc();
    }

    /// Records a circuit state change
    pub fn record_state_change(&self, circuit: &str, from: CircuitState, to: CircuitState) {
        self.circuit_state_changes
            .with_label_values(&[circuit, from.as_str(), to.as_str()])
            .inc();

        self.set_circuit_state(circuit, to);
    }

    /// Sets the state gauge without counting a transition.
    pub fn set_circuit_state(&self, circuit: &str, state: CircuitState) {
        let state_value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.circuit_state
            .with_label_values(&[circuit])
            .set(state_value);
    }

    /// Renders all metrics in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Fails if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

fn outcome<T>(result: &Result<T, PluginError>) -> &'static str {
    match result {
        Ok(_) => OUTCOME_SUCCESS,
        Err(err) => err.code().outcome(),
    }
}
