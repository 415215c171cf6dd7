//! Upstream connection settings and the store that publishes them.
//!
//! Settings are immutable once built. Configure installs a whole new record
//! with an atomic pointer swap, so a reader holding a snapshot always sees the
//! token, API key and base URL from the same Configure call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::error::PluginError;

/// Settings key for the provider access token.
pub const TOKEN_KEY: &str = "token";
/// Settings key for the provider API key.
pub const API_KEY_KEY: &str = "apiKey";
/// Settings key for the provider base URL.
pub const BASE_API_URL_KEY: &str = "baseApiUrl";

/// Keys every Configure call must supply, in reporting order.
pub const REQUIRED_SETTINGS: [&str; 3] = [TOKEN_KEY, API_KEY_KEY, BASE_API_URL_KEY];

/// Path appended to the base URL for logins.
pub const LOGIN_PATH: &str = "vcs_login";

/// Identity provider connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Name the host registered the plugin under
    pub plugin_name: String,
    /// Access token sent as the `token` query parameter
    pub token: String,
    /// API key sent as the `key` query parameter
    pub api_key: String,
    /// Base URL the login path is appended to, verbatim
    pub base_api_url: String,
}

impl UpstreamSettings {
    /// Builds settings from a Configure request's settings map.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MissingSettings`] naming every required key that
    /// is absent or empty.
    pub fn from_settings(
        plugin_name: &str,
        settings: &HashMap<String, String>,
    ) -> Result<Self, PluginError> {
        let value = |key: &str| settings.get(key).filter(|v| !v.is_empty());

        let missing: Vec<&'static str> = REQUIRED_SETTINGS
            .into_iter()
            .filter(|key| value(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PluginError::MissingSettings { keys: missing });
        }

        let required = |key: &str| value(key).cloned().unwrap_or_default();
        Ok(Self {
            plugin_name: plugin_name.to_string(),
            token: required(TOKEN_KEY),
            api_key: required(API_KEY_KEY),
            base_api_url: required(BASE_API_URL_KEY),
        })
    }

    /// Login endpoint without query parameters.
    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}{LOGIN_PATH}", self.base_api_url)
    }
}

impl fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("plugin_name", &self.plugin_name)
            .field("token", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .field("base_api_url", &self.base_api_url)
            .finish()
    }
}

/// Holds the active settings; single writer swap, lock-free readers.
#[derive(Default)]
pub struct ConfigurationStore {
    current: ArcSwapOption<UpstreamSettings>,
}

impl ConfigurationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `settings` as the active configuration.
    pub fn replace(&self, settings: UpstreamSettings) {
        self.current.store(Some(Arc::new(settings)));
    }

    /// Returns the active configuration, if any.
    ///
    /// The snapshot stays valid and unchanged after later replacements.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<UpstreamSettings>> {
        self.current.load_full()
    }

    /// Whether Configure has succeeded at least once.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.current.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        settings_map(&[
            ("token", "tok"),
            ("apiKey", "key"),
            ("baseApiUrl", "https://profile.example.net/_functions/"),
        ])
    }

    #[test]
    fn test_from_settings_complete() {
        let settings = UpstreamSettings::from_settings("vanguard", &complete()).unwrap();
        assert_eq!(settings.plugin_name, "vanguard");
        assert_eq!(settings.token, "tok");
        assert_eq!(settings.api_key, "key");
        assert_eq!(
            settings.login_url(),
            "https://profile.example.net/_functions/vcs_login"
        );
    }

    #[test]
    fn test_from_settings_reports_each_missing_key() {
        for key in REQUIRED_SETTINGS {
            let mut map = complete();
            map.remove(key);
            let err = UpstreamSettings::from_settings("p", &map).unwrap_err();
            assert!(matches!(err, PluginError::MissingSettings { ref keys } if keys == &[key]));
        }
    }

    #[test]
    fn test_from_settings_treats_empty_as_missing() {
        let mut map = complete();
        map.insert("apiKey".to_string(), String::new());
        let err = UpstreamSettings::from_settings("p", &map).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required configuration settings: apiKey"
        );
    }

    #[test]
    fn test_from_settings_lists_all_missing_in_order() {
        let err = UpstreamSettings::from_settings("p", &HashMap::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required configuration settings: token, apiKey, baseApiUrl"
        );
    }

    #[test]
    fn test_extra_settings_are_ignored() {
        let mut map = complete();
        map.insert("region".to_string(), "eu".to_string());
        assert!(UpstreamSettings::from_settings("p", &map).is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = UpstreamSettings::from_settings("p", &complete()).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("tok\""));
        assert!(!debug.contains("\"key\""));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_store_starts_unconfigured() {
        let store = ConfigurationStore::new();
        assert!(!store.is_configured());
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let store = ConfigurationStore::new();
        let first = UpstreamSettings::from_settings("one", &complete()).unwrap();
        store.replace(first.clone());

        let held = store.snapshot().unwrap();

        let mut map = complete();
        map.insert("token".to_string(), "rotated".to_string());
        store.replace(UpstreamSettings::from_settings("two", &map).unwrap());

        assert_eq!(*held, first);
        let current = store.snapshot().unwrap();
        assert_eq!(current.token, "rotated");
        assert_eq!(current.plugin_name, "two");
        assert!(store.is_configured());
    }
}
