//! Error handling module
//!
//! Every failure a plugin request can run into is a [`PluginError`] variant.
//! None of them becomes a gRPC transport fault: the handlers turn them into
//! `success = false` responses carrying the error's display text, so the
//! messages here are client-facing.

use std::error::Error as StdError;

use rust_common::CircuitBreakerError;
use thiserror::Error;

/// Message returned while the upstream circuit is open.
pub const CIRCUIT_OPEN_MESSAGE: &str =
    "Login service is temporarily unavailable (circuit breaker open), please try again later";

/// Message used when the provider rejects a login without explaining why.
pub const DEFAULT_REJECTION_MESSAGE: &str = "Login rejected by identity provider";

/// Non-exhaustive error enum for forward compatibility
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configure was called without one or more required settings
    #[error("Missing required configuration settings: {}", .keys.join(", "))]
    MissingSettings {
        /// Keys that were absent or empty, in declaration order
        keys: Vec<&'static str>,
    },

    /// Login was called without a required credential
    #[error("The '{field}' field is required in credentials")]
    MissingCredential {
        /// Name of the first missing credential
        field: &'static str,
    },

    /// Login was called before any successful Configure
    #[error("Plugin is not configured")]
    NotConfigured,

    /// The circuit breaker rejected the call without contacting upstream
    #[error("{}", CIRCUIT_OPEN_MESSAGE)]
    CircuitOpen {
        /// Name of the open circuit
        service: String,
    },

    /// The upstream could not be reached or did not answer in time
    #[error("{reason}")]
    Transport {
        /// Underlying error text, without the request URL
        reason: String,
    },

    /// The upstream answered with a body that could not be decoded
    #[error("{reason}")]
    MalformedResponse {
        /// Decoder error text
        reason: String,
    },

    /// The upstream answered but did not grant the login
    #[error("{message}")]
    Rejected {
        /// Message supplied by the upstream
        message: String,
    },
}

/// Stable error codes for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MissingSettings,
    MissingCredential,
    NotConfigured,
    CircuitOpen,
    UpstreamTransport,
    UpstreamProtocol,
    UpstreamRejected,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSettings => "CONFIG_MISSING_SETTINGS",
            Self::MissingCredential => "LOGIN_MISSING_CREDENTIAL",
            Self::NotConfigured => "PLUGIN_NOT_CONFIGURED",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::UpstreamTransport => "UPSTREAM_TRANSPORT",
            Self::UpstreamProtocol => "UPSTREAM_PROTOCOL",
            Self::UpstreamRejected => "UPSTREAM_REJECTED",
        }
    }

    /// Outcome label used by the request counters.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::MissingSettings | Self::MissingCredential => "validation",
            Self::NotConfigured => "not_configured",
            Self::CircuitOpen => "circuit_open",
            Self::UpstreamTransport | Self::UpstreamProtocol | Self::UpstreamRejected => {
                "upstream"
            }
        }
    }
}

impl PluginError {
    /// Get the error code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingSettings { .. } => ErrorCode::MissingSettings,
            Self::MissingCredential { .. } => ErrorCode::MissingCredential,
            Self::NotConfigured => ErrorCode::NotConfigured,
            Self::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            Self::Transport { .. } => ErrorCode::UpstreamTransport,
            Self::MalformedResponse { .. } => ErrorCode::UpstreamProtocol,
            Self::Rejected { .. } => ErrorCode::UpstreamRejected,
        }
    }

    /// Whether the error came back from an attempted upstream call.
    #[must_use]
    pub const fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::MalformedResponse { .. } | Self::Rejected { .. }
        )
    }

    /// Builds a rejection, substituting a generic message for an empty one.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            return Self::Rejected {
                message: DEFAULT_REJECTION_MESSAGE.to_string(),
            };
        }
        Self::Rejected { message }
    }
}

/// Joins an error with its chain of sources.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ============================================================================
// From trait implementations for automatic error conversion
// ============================================================================

impl From<reqwest::Error> for PluginError {
    fn from(err: reqwest::Error) -> Self {
        // The URL carries the API key and token as query parameters.
        let err = err.without_url();
        let reason = error_chain(&err);
        if err.is_decode() {
            Self::MalformedResponse { reason }
        } else {
            Self::Transport { reason }
        }
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse {
            reason: format!("invalid identity provider response: {err}"),
        }
    }
}

impl From<CircuitBreakerError<PluginError>> for PluginError {
    fn from(err: CircuitBreakerError<PluginError>) -> Self {
        match err {
            CircuitBreakerError::Open { service, .. } => Self::CircuitOpen { service },
            CircuitBreakerError::ServiceError(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_common::CircuitState;

    #[test]
    fn test_missing_settings_lists_keys() {
        let err = PluginError::MissingSettings {
            keys: vec!["token", "baseApiUrl"],
        };
        assert_eq!(
            err.to_string(),
            "Missing required configuration settings: token, baseApiUrl"
        );
        assert_eq!(err.code(), ErrorCode::MissingSettings);
        assert_eq!(err.code().outcome(), "validation");
    }

    #[test]
    fn test_missing_credential_names_field() {
        let err = PluginError::MissingCredential { field: "email" };
        assert_eq!(err.to_string(), "The 'email' field is required in credentials");
        assert_eq!(err.code().as_str(), "LOGIN_MISSING_CREDENTIAL");
    }

    #[test]
    fn test_rejected_keeps_upstream_message() {
        let err = PluginError::rejected("Invalid password");
        assert_eq!(err.to_string(), "Invalid password");
        assert!(err.is_upstream_failure());
    }

    #[test]
    fn test_rejected_with_blank_message_uses_default() {
        let err = PluginError::rejected("  ");
        assert_eq!(err.to_string(), DEFAULT_REJECTION_MESSAGE);
    }

    #[test]
    fn test_breaker_open_converts_to_circuit_open() {
        let err: PluginError = CircuitBreakerError::<PluginError>::Open {
            service: "upstream-login".to_string(),
            state: CircuitState::HalfOpen,
        }
        .into();

        assert!(matches!(err, PluginError::CircuitOpen { ref service } if service == "upstream-login"));
        assert_eq!(err.to_string(), CIRCUIT_OPEN_MESSAGE);
        assert!(!err.is_upstream_failure());
        assert_eq!(err.code().outcome(), "circuit_open");
    }

    #[test]
    fn test_breaker_service_error_is_unwrapped() {
        let err: PluginError =
            CircuitBreakerError::ServiceError(PluginError::rejected("nope")).into();
        assert!(matches!(err, PluginError::Rejected { ref message } if message == "nope"));
    }

    #[test]
    fn test_json_error_is_protocol_failure() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = PluginError::from(json_err);
        assert_eq!(err.code(), ErrorCode::UpstreamProtocol);
        assert!(err.to_string().starts_with("invalid identity provider response"));
    }

    #[test]
    fn test_validation_errors_are_not_upstream_failures() {
        assert!(!PluginError::NotConfigured.is_upstream_failure());
        assert!(!PluginError::MissingCredential { field: "password" }.is_upstream_failure());
    }
}
