//! gRPC Service Implementation
//!
//! Implements `vcsauth.AuthPluginService` on top of [`AuthGateway`]. Every
//! plugin-level failure is answered with `success = false` and a message; a
//! `Status` is only ever produced by the transport itself.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{Span, field, info, instrument, warn};
use uuid::Uuid;

use crate::error::PluginError;
use crate::gateway::{AuthGateway, LoginResult};
use crate::metrics::GatewayMetrics;
use crate::proto::vcsauth::auth_plugin_service_server::AuthPluginService;
use crate::proto::vcsauth::server_login_response::LoginResult as LoginOutcome;
use crate::proto::vcsauth::{
    ClientLoginRequest, ConfigureRequest, ConfigureResponse, LoginResult as ProtoLoginResult,
    ServerLoginResponse, UnitSelection as ProtoUnitSelection,
};

/// Version reported to the host by Configure.
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Message returned by a successful Configure.
pub const CONFIGURE_SUCCESS_MESSAGE: &str = "Configuration successful";

/// Auth plugin service backed by a shared gateway.
pub struct AuthPluginServiceImpl {
    gateway: Arc<AuthGateway>,
    metrics: Arc<GatewayMetrics>,
}

impl AuthPluginServiceImpl {
    /// Creates the service.
    #[must_use]
    pub const fn new(gateway: Arc<AuthGateway>, metrics: Arc<GatewayMetrics>) -> Self {
        Self { gateway, metrics }
    }

    /// Generates a new correlation ID for request tracing.
    fn generate_correlation_id() -> Uuid {
        let correlation_id = Uuid::new_v4();
        Span::current().record("correlation_id", field::display(correlation_id));
        correlation_id
    }

    fn log_failure(operation: &str, err: &PluginError, correlation_id: Uuid) {
        warn!(
            correlation_id = %correlation_id,
            error_code = err.code().as_str(),
            error = %err,
            "{operation} failed"
        );
    }
}

/// Sorted setting names, for logging; the values are secrets.
fn setting_keys(settings: &HashMap<String, String>) -> Vec<&str> {
    let mut keys: Vec<&str> = settings.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

impl From<LoginResult> for ProtoLoginResult {
    fn from(result: LoginResult) -> Self {
        Self {
            available_roles: result.available_roles.into_iter().map(u32::from).collect(),
            available_units: result
                .available_units
                .into_iter()
                .map(|unit| ProtoUnitSelection {
                    unit_id: unit.unit_id,
                    unit_name: unit.unit_name,
                })
                .collect(),
        }
    }
}

impl From<Result<LoginResult, PluginError>> for ServerLoginResponse {
    fn from(result: Result<LoginResult, PluginError>) -> Self {
        match result {
            Ok(result) => Self {
                success: true,
                login_result: Some(LoginOutcome::Result(result.into())),
            },
            Err(err) => Self {
                success: false,
                login_result: Some(LoginOutcome::ErrorMessage(err.to_string())),
            },
        }
    }
}

#[tonic::async_trait]
impl AuthPluginService for AuthPluginServiceImpl {
    #[instrument(skip(self, request), fields(correlation_id = field::Empty))]
    async fn configure(
        &self,
        request: Request<ConfigureRequest>,
    ) -> Result<Response<ConfigureResponse>, Status> {
        let correlation_id = Self::generate_correlation_id();
        let req = request.into_inner();

        info!(
            plugin_name = %req.plugin_name,
            settings = ?setting_keys(&req.settings),
            "Configure request received"
        );

        let result = self.gateway.configure(&req.plugin_name, &req.settings);
        self.metrics.record_configure(&result);

        let response = match result {
            Ok(()) => {
                info!(plugin_name = %req.plugin_name, "Plugin configured");
                ConfigureResponse {
                    success: true,
                    message: CONFIGURE_SUCCESS_MESSAGE.to_string(),
                    version: PLUGIN_VERSION.to_string(),
                }
            }
            Err(err) => {
                Self::log_failure("Configure", &err, correlation_id);
                ConfigureResponse {
                    success: false,
                    message: err.to_string(),
                    version: PLUGIN_VERSION.to_string(),
                }
            }
        };

        Ok(Response::new(response))
    }

    #[instrument(skip(self, request), fields(correlation_id = field::Empty))]
    async fn login(
        &self,
        request: Request<ClientLoginRequest>,
    ) -> Result<Response<ServerLoginResponse>, Status> {
        let correlation_id = Self::generate_correlation_id();
        let req = request.into_inner();

        let result = self.gateway.login(&req.credentials).await;
        self.metrics.record_login(&result);

        match &result {
            Ok(granted) => info!(
                correlation_id = %correlation_id,
                user_id = %granted.user_id,
                units = granted.available_units.len(),
                roles = granted.available_roles.len(),
                "Login granted"
            ),
            Err(err) => Self::log_failure("Login", err, correlation_id),
        }

        Ok(Response::new(result.into()))
    }
}
