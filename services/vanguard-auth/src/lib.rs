//! Vanguard auth plugin for VCS servers.
//!
//! The VCS host loads the plugin as a local gRPC service, hands it the
//! identity provider's settings through Configure, and forwards each user
//! login to it. Logins are delegated to the provider's `vcs_login` endpoint
//! behind a circuit breaker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod grpc;
pub mod metrics;
pub mod settings;
pub mod shutdown;
pub mod upstream;

// Include generated protobuf code
#[allow(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
pub mod proto {
    // plugin server, called by the VCS host
    pub mod vcsauth {
        tonic::include_proto!("vcsauth");
    }
}

pub use config::{CliArgs, Config, ConfigError, DistributionMode};
pub use error::{ErrorCode, PluginError};
pub use gateway::{AuthGateway, LoginCredentials, LoginResult, UnitSelection};
pub use grpc::{AuthPluginServiceImpl, PLUGIN_VERSION};
pub use metrics::GatewayMetrics;
pub use settings::{ConfigurationStore, UpstreamSettings};
pub use upstream::{HttpIdentityProvider, IdentityProvider};
