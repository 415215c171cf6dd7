//! Shared building blocks for the Vanguard auth plugin.
//!
//! This crate provides:
//! - A generic, generation-aware circuit breaker for unreliable calls
//! - HTTP client configuration with bounded timeouts
//! - Tracing subscriber initialization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod http;
pub mod tracing_config;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, Counts, TripPolicy,
};
pub use http::{HttpConfig, build_http_client};
pub use tracing_config::{TracingConfig, init_tracing};
