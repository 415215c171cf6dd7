//! Identity provider client.
//!
//! The provider exposes a single login endpoint:
//! `POST {baseApiUrl}vcs_login?key={apiKey}&token={token}` with a JSON body of
//! `{email, password}`. It answers with a `{success, message, error?, data?}`
//! envelope; the body is decoded whatever the HTTP status.

use async_trait::async_trait;
use reqwest::Client;
use rust_common::{HttpConfig, build_http_client};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PluginError;
use crate::gateway::LoginCredentials;
use crate::settings::UpstreamSettings;

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

/// Login response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEnvelope {
    /// Provider's own success flag
    #[serde(default)]
    pub success: bool,
    /// Human-readable outcome
    #[serde(default)]
    pub message: String,
    /// Provider-specific error detail, never interpreted
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    /// Present on a granted login
    #[serde(default)]
    pub data: Option<LoginData>,
}

/// Payload of a granted login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    /// Provider user id
    #[serde(default)]
    pub user_id: String,
    /// Display name of the user
    #[serde(default)]
    pub display_name: String,
    /// Units the user may select, in provider order
    #[serde(default)]
    pub available_units: Vec<UnitRecord>,
    /// Role codes the user may select
    #[serde(default)]
    pub available_roles: Vec<u8>,
}

/// A unit as the provider names it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRecord {
    /// Unit id
    #[serde(default)]
    pub unit_id: String,
    /// Unit display name
    #[serde(default)]
    pub name: String,
}

impl LoginEnvelope {
    /// Splits the envelope into a granted payload or a rejection.
    ///
    /// A `success` flag without a payload is a rejection too.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Rejected`] carrying the provider's message.
    pub fn into_result(self) -> Result<LoginData, PluginError> {
        match self {
            Self {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            Self { message, .. } => Err(PluginError::rejected(message)),
        }
    }
}

/// Seam between the gateway and the identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Submits one login attempt and returns the decoded envelope.
    async fn login(
        &self,
        settings: &UpstreamSettings,
        credentials: &LoginCredentials,
    ) -> Result<LoginEnvelope, PluginError>;
}

/// HTTP implementation of [`IdentityProvider`].
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    http: Client,
}

impl HttpIdentityProvider {
    /// Creates a provider with a client built from `config`.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, PluginError> {
        Ok(Self::with_client(build_http_client(config)?))
    }

    /// Creates a provider around an existing client.
    #[must_use]
    pub const fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn login(
        &self,
        settings: &UpstreamSettings,
        credentials: &LoginCredentials,
    ) -> Result<LoginEnvelope, PluginError> {
        let body = LoginBody {
            email: credentials.email(),
            password: credentials.password().expose_secret(),
        };

        let response = self
            .http
            .post(settings.login_url())
            .query(&[
                ("key", settings.api_key.as_str()),
                ("token", settings.token.as_str()),
            ])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(%status, bytes = bytes.len(), "Identity provider responded");

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_envelope_yields_data() {
        let envelope: LoginEnvelope = serde_json::from_str(
            r#"{"success":true,"message":"ok","data":{"userId":"u1","displayName":"D",
                "availableUnits":[{"unitId":"a","name":"Alpha"}],"availableRoles":[1,2]}}"#,
        )
        .unwrap();

        let data = envelope.into_result().unwrap();
        assert_eq!(data.user_id, "u1");
        assert_eq!(data.display_name, "D");
        assert_eq!(
            data.available_units,
            vec![UnitRecord {
                unit_id: "a".to_string(),
                name: "Alpha".to_string()
            }]
        );
        assert_eq!(data.available_roles, vec![1, 2]);
    }

    #[test]
    fn test_unsuccessful_envelope_is_rejected_with_message() {
        let envelope: LoginEnvelope =
            serde_json::from_str(r#"{"success":false,"message":"Invalid credentials","error":{"code":7}}"#)
                .unwrap();
        let err = envelope.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_success_without_data_is_rejected() {
        let envelope: LoginEnvelope =
            serde_json::from_str(r#"{"success":true,"message":"No profile","data":null}"#).unwrap();
        let err = envelope.into_result().unwrap_err();
        assert!(matches!(err, PluginError::Rejected { ref message } if message == "No profile"));
    }

    #[test]
    fn test_missing_fields_default() {
        let envelope: LoginEnvelope = serde_json::from_str("{}").unwrap();
        assert!(!envelope.success);
        assert!(envelope.message.is_empty());
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_role_out_of_range_fails_to_decode() {
        let result = serde_json::from_str::<LoginEnvelope>(
            r#"{"success":true,"data":{"availableRoles":[256]}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_login_body_shape() {
        let body = LoginBody {
            email: "pilot@example.com",
            password: "hunter2",
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"email": "pilot@example.com", "password": "hunter2"})
        );
    }
}
