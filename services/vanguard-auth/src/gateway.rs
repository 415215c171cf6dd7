//! Login orchestration.
//!
//! [`AuthGateway`] validates requests, reads a settings snapshot, calls the
//! identity provider through the login circuit breaker and translates the
//! provider's answer into a [`LoginResult`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_common::{CircuitBreaker, CircuitBreakerConfig, CircuitState, TripPolicy};
use secrecy::SecretString;
use tracing::debug;

use crate::error::PluginError;
use crate::metrics::GatewayMetrics;
use crate::settings::{ConfigurationStore, UpstreamSettings};
use crate::upstream::{IdentityProvider, LoginData};

/// Name of the login circuit.
pub const LOGIN_BREAKER_NAME: &str = "upstream-login";
/// Requests the closed circuit must see before it can trip.
pub const LOGIN_BREAKER_MIN_REQUESTS: u32 = 3;
/// Failure ratio that trips the closed circuit.
pub const LOGIN_BREAKER_FAILURE_RATIO: f64 = 0.6;
/// Time the circuit stays open before admitting a trial.
pub const LOGIN_BREAKER_OPEN_TIMEOUT: Duration = Duration::from_secs(60);
/// Trial calls admitted while half-open.
pub const LOGIN_BREAKER_TRIALS: u32 = 1;

/// Credential key for the user's email.
pub const EMAIL_KEY: &str = "email";
/// Credential key for the user's password.
pub const PASSWORD_KEY: &str = "password";

/// Fixed policy of the login circuit.
#[must_use]
pub fn login_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::new(LOGIN_BREAKER_NAME)
        .with_max_half_open_requests(LOGIN_BREAKER_TRIALS)
        .with_timeout(LOGIN_BREAKER_OPEN_TIMEOUT)
        .with_trip_policy(TripPolicy::FailureRatio {
            min_requests: LOGIN_BREAKER_MIN_REQUESTS,
            ratio: LOGIN_BREAKER_FAILURE_RATIO,
        })
}

/// Credentials of one login attempt.
#[derive(Debug)]
pub struct LoginCredentials {
    email: String,
    password: SecretString,
}

impl LoginCredentials {
    /// Creates credentials from already validated parts.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Extracts credentials from a login request's map.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MissingCredential`] for the first absent or
    /// empty field, checking `email` before `password`.
    pub fn from_map(credentials: &HashMap<String, String>) -> Result<Self, PluginError> {
        let field = |name: &'static str| {
            credentials
                .get(name)
                .filter(|value| !value.is_empty())
                .ok_or(PluginError::MissingCredential { field: name })
        };

        let email = field(EMAIL_KEY)?;
        let password = field(PASSWORD_KEY)?;
        Ok(Self::new(email.as_str(), password.as_str()))
    }

    /// Email to log in with.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Password to log in with.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }
}

/// A unit the user may act for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSelection {
    /// Unit id
    pub unit_id: String,
    /// Unit display name
    pub unit_name: String,
}

/// Normalized result of a granted login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    /// Provider user id
    pub user_id: String,
    /// Display name of the user
    pub display_name: String,
    /// Selectable units, in provider order
    pub available_units: Vec<UnitSelection>,
    /// Selectable role codes, in provider order
    pub available_roles: Vec<u8>,
}

impl From<LoginData> for LoginResult {
    fn from(data: LoginData) -> Self {
        Self {
            user_id: data.user_id,
            display_name: data.display_name,
            available_units: data
                .available_units
                .into_iter()
                .map(|unit| UnitSelection {
                    unit_id: unit.unit_id,
                    unit_name: unit.name,
                })
                .collect(),
            available_roles: data.available_roles,
        }
    }
}

/// Entry point for Configure and Login.
pub struct AuthGateway {
    store: ConfigurationStore,
    breaker: CircuitBreaker,
    provider: Arc<dyn IdentityProvider>,
}

impl AuthGateway {
    /// Creates a gateway with the fixed login circuit policy.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::with_breaker(provider, CircuitBreaker::new(login_breaker_config()))
    }

    /// Creates a gateway whose circuit reports state changes to `metrics`.
    #[must_use]
    pub fn instrumented(provider: Arc<dyn IdentityProvider>, metrics: Arc<GatewayMetrics>) -> Self {
        metrics.set_circuit_state(LOGIN_BREAKER_NAME, CircuitState::Closed);
        let breaker = CircuitBreaker::new(login_breaker_config())
            .with_state_listener(move |circuit, from, to| {
                metrics.record_state_change(circuit, from, to);
            });
        Self::with_breaker(provider, breaker)
    }

    /// Creates a gateway around an existing circuit breaker.
    #[must_use]
    pub fn with_breaker(provider: Arc<dyn IdentityProvider>, breaker: CircuitBreaker) -> Self {
        Self {
            store: ConfigurationStore::new(),
            breaker,
            provider,
        }
    }

    /// Validates and installs new provider settings.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MissingSettings`] and leaves the active settings
    /// untouched when a required key is missing or empty.
    pub fn configure(
        &self,
        plugin_name: &str,
        settings: &HashMap<String, String>,
    ) -> Result<(), PluginError> {
        let settings = UpstreamSettings::from_settings(plugin_name, settings)?;
        debug!(plugin_name, base_api_url = %settings.base_api_url, "Installing provider settings");
        self.store.replace(settings);
        Ok(())
    }

    /// Performs one login attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] for invalid input, missing configuration, an
    /// open circuit, or a failed or rejected upstream call. Only the last
    /// group is counted by the circuit breaker.
    pub async fn login(
        &self,
        credentials: &HashMap<String, String>,
    ) -> Result<LoginResult, PluginError> {
        let credentials = LoginCredentials::from_map(credentials)?;
        let settings = self.store.snapshot().ok_or(PluginError::NotConfigured)?;

        let provider = &self.provider;
        let (settings, credentials) = (&*settings, &credentials);
        let data = self
            .breaker
            .execute(move || async move {
                provider.login(settings, credentials).await?.into_result()
            })
            .await?;

        Ok(LoginResult::from(data))
    }

    /// The login circuit breaker.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The settings store.
    #[must_use]
    pub const fn store(&self) -> &ConfigurationStore {
        &self.store
    }
}
