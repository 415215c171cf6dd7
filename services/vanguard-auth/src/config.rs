//! Process Configuration
//!
//! Settings come from environment variables (optionally loaded from a `.env`
//! file) and can be overridden by command-line flags. Upstream credentials are
//! not part of this; the host supplies them through Configure.

use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use rust_common::{HttpConfig, TracingConfig};
use thiserror::Error;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 16057;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid port number
    #[error("Invalid port: must be between 1 and 65535")]
    InvalidPort,

    /// Listen address is reachable from other hosts
    #[error("Invalid host {0}: the plugin only listens on a loopback address")]
    NonLoopbackHost(IpAddr),

    /// Unknown distribution mode
    #[error("Invalid distribution mode {0}: expected 0 (standalone), 1 (control) or 2 (voice)")]
    InvalidDistributionMode(String),

    /// Zero timeout
    #[error("Invalid timeout for {0}: must be greater than 0")]
    InvalidTimeout(&'static str),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Role of the VCS server process that loads the plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DistributionMode {
    /// Control and voice in one server
    #[default]
    Standalone,
    /// Control node for separate voice servers
    Control,
    /// Voice node behind a control server
    Voice,
}

impl DistributionMode {
    /// Numeric code used on the command line.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Standalone => 0,
            Self::Control => 1,
            Self::Voice => 2,
        }
    }
}

impl FromStr for DistributionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Self::Standalone),
            "1" => Ok(Self::Control),
            "2" => Ok(Self::Voice),
            other => Err(ConfigError::InvalidDistributionMode(other.to_string())),
        }
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standalone => "standalone",
            Self::Control => "control",
            Self::Voice => "voice",
        };
        write!(f, "{} ({name})", self.code())
    }
}

/// Command-line flags.
#[derive(Debug, Default, Parser)]
#[command(name = "vanguard-auth-plugin", version, about = "Vanguard authentication plugin for VCS")]
pub struct CliArgs {
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Distribution mode: 0=standalone, 1=control, 2=voice
    #[arg(long)]
    pub distribution_mode: Option<DistributionMode>,
}

/// Service configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (loopback only)
    pub host: IpAddr,
    /// Listen port (1-65535)
    pub port: u16,
    /// Distribution mode reported by the host
    pub distribution_mode: DistributionMode,
    /// Upstream request timeout in seconds
    pub upstream_timeout_secs: u64,
    /// Upstream connect timeout in seconds
    pub upstream_connect_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Default tracing filter
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            distribution_mode: DistributionMode::Standalone,
            upstream_timeout_secs: 10,
            upstream_connect_timeout_secs: 5,
            shutdown_timeout_seconds: 10,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Fails when a variable cannot be parsed or a value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be parsed or is out of range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            host: parse_env(&lookup, "HOST", defaults.host)?,
            port: parse_env(&lookup, "PORT", defaults.port)?,
            distribution_mode: parse_env(&lookup, "DISTRIBUTION_MODE", defaults.distribution_mode)?,
            upstream_timeout_secs: parse_env(
                &lookup,
                "UPSTREAM_TIMEOUT",
                defaults.upstream_timeout_secs,
            )?,
            upstream_connect_timeout_secs: parse_env(
                &lookup,
                "UPSTREAM_CONNECT_TIMEOUT",
                defaults.upstream_connect_timeout_secs,
            )?,
            shutdown_timeout_seconds: parse_env(
                &lookup,
                "SHUTDOWN_TIMEOUT",
                defaults.shutdown_timeout_seconds,
            )?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: parse_env(&lookup, "LOG_JSON", defaults.log_json)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Fails when an override is out of range.
    pub fn with_cli(mut self, args: &CliArgs) -> Result<Self, ConfigError> {
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(mode) = args.distribution_mode {
            self.distribution_mode = mode;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if !self.host.is_loopback() {
            return Err(ConfigError::NonLoopbackHost(self.host));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("UPSTREAM_TIMEOUT"));
        }
        if self.upstream_connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("UPSTREAM_CONNECT_TIMEOUT"));
        }
        Ok(())
    }

    /// Socket address the gRPC server binds.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// HTTP client settings for the identity provider.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(Duration::from_secs(self.upstream_timeout_secs))
            .with_connect_timeout(Duration::from_secs(self.upstream_connect_timeout_secs))
    }

    /// Tracing subscriber settings.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig::default()
            .with_service_name(env!("CARGO_PKG_NAME"))
            .with_log_level(&self.log_level)
            .with_json_output(self.log_json)
    }

    /// Time allowed for in-flight requests to finish on shutdown.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:16057".parse().unwrap());
        assert_eq!(config.distribution_mode, DistributionMode::Standalone);
        assert_eq!(config.http_config().timeout, Duration::from_secs(10));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert!(!config.log_json);
    }

    #[test]
    fn test_env_overrides() {
        let config = load(&[
            ("PORT", "17000"),
            ("DISTRIBUTION_MODE", "2"),
            ("UPSTREAM_TIMEOUT", "3"),
            ("LOG_JSON", "true"),
            ("HOST", "::1"),
        ])
        .unwrap();
        assert_eq!(config.port, 17000);
        assert_eq!(config.distribution_mode, DistributionMode::Voice);
        assert_eq!(config.http_config().timeout, Duration::from_secs(3));
        assert!(config.tracing_config().json_output);
        assert!(config.host.is_loopback());
    }

    #[test]
    fn test_rejects_non_loopback_host() {
        let err = load(&[("HOST", "0.0.0.0")]).unwrap_err();
        assert!(matches!(err, ConfigError::NonLoopbackHost(_)));
    }

    #[test]
    fn test_rejects_port_zero() {
        assert!(matches!(load(&[("PORT", "0")]), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_rejects_zero_upstream_timeout() {
        let err = load(&[("UPSTREAM_TIMEOUT", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout("UPSTREAM_TIMEOUT")));
    }

    #[test]
    fn test_parse_error_names_variable() {
        let err = load(&[("DISTRIBUTION_MODE", "7")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to parse environment variable DISTRIBUTION_MODE: Invalid distribution mode 7: \
             expected 0 (standalone), 1 (control) or 2 (voice)"
        );
    }

    #[test]
    fn test_cli_overrides_env() {
        let args = CliArgs::parse_from([
            "vanguard-auth-plugin",
            "--port",
            "16100",
            "--distribution-mode",
            "1",
        ]);
        let config = load(&[("PORT", "17000")]).unwrap().with_cli(&args).unwrap();
        assert_eq!(config.port, 16100);
        assert_eq!(config.distribution_mode, DistributionMode::Control);
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        let parsed = CliArgs::try_parse_from(["vanguard-auth-plugin", "--distribution-mode", "3"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_distribution_mode_display() {
        assert_eq!(DistributionMode::Control.to_string(), "1 (control)");
    }
}
