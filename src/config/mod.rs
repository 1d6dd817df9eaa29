#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use toml_config::TomlConfig;

use crate::utils::error::{OptimumError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://optimize.vicbee.net";
pub const PORTFOLIO_API: &str = "optimize";
pub const MODELS_API: &str = "models";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api() -> String {
    PORTFOLIO_API.to_string()
}

fn default_true() -> bool {
    true
}

/// Connection settings shared by the async and blocking clients.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_true")]
    pub auto_token_renewal: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api")]
    pub api: String,
    pub timeout_seconds: Option<u64>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            token: None,
            auto_token_renewal: true,
            base_url: default_base_url(),
            api: default_api(),
            timeout_seconds: None,
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("auto_token_renewal", &self.auto_token_renewal)
            .field("base_url", &self.base_url)
            .field("api", &self.api)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl ClientSettings {
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn auto_token_renewal(mut self, enabled: bool) -> Self {
        self.auto_token_renewal = enabled;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Root of the selected API, `{base_url}/{api}/api`.
    pub fn api_root(&self) -> String {
        format!("{}/{}/api", self.base_url.trim_end_matches('/'), self.api.trim_matches('/'))
    }

    /// Overlay OPTIMUM_* environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("OPTIMUM_USERNAME") {
            self.username = Some(username);
        }
        if let Ok(password) = std::env::var("OPTIMUM_PASSWORD") {
            self.password = Some(password);
        }
        if let Ok(token) = std::env::var("OPTIMUM_TOKEN") {
            self.token = Some(token);
        }
        if let Ok(base_url) = std::env::var("OPTIMUM_BASE_URL") {
            self.base_url = base_url;
        }
    }
}

impl Validate for ClientSettings {
    fn validate(&self) -> Result<()> {
        if self.token.is_none() && !self.has_credentials() {
            return Err(OptimumError::MissingCredentials);
        }
        validate_url("base_url", &self.base_url)?;
        validate_non_empty_string("api", &self.api)?;
        if let Some(timeout) = self.timeout_seconds {
            validate_range("timeout_seconds", timeout, 1, 3600)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_root_strips_trailing_slashes() {
        let settings = ClientSettings::with_token("t").base_url("https://optimize.vicbee.net///");
        assert_eq!(settings.api_root(), "https://optimize.vicbee.net/optimize/api");

        let settings = settings.api(MODELS_API);
        assert_eq!(settings.api_root(), "https://optimize.vicbee.net/models/api");
    }

    #[test]
    fn test_settings_require_credentials() {
        assert!(matches!(
            ClientSettings::default().validate(),
            Err(OptimumError::MissingCredentials)
        ));
        assert!(ClientSettings::with_credentials("demo", "secret").validate().is_ok());
        assert!(ClientSettings {
            username: Some("demo".to_string()),
            ..ClientSettings::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let settings = ClientSettings::with_credentials("demo", "hunter2");
        let printed = format!("{:?}", settings);
        assert!(printed.contains("demo"));
        assert!(!printed.contains("hunter2"));
    }
}
