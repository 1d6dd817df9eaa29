use crate::config::{ClientSettings, MODELS_API, PORTFOLIO_API};
use crate::utils::error::{OptimumError, Result};
use crate::utils::validation::{validate_required_field, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default tickers and ranges for `recommend`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketConfig {
    pub tickers: Option<Vec<String>>,
    pub ranges: Option<Vec<String>>,
}

impl MarketConfig {
    /// Market tickers and ranges, taking the given values over the configured ones.
    pub fn resolve(&self, tickers: &[String], ranges: &[String]) -> Result<(Vec<String>, Vec<String>)> {
        let tickers = pick("market.tickers", tickers, &self.tickers)?;
        let ranges = pick("market.ranges", ranges, &self.ranges)?;
        Ok((tickers, ranges))
    }
}

fn pick(field: &str, given: &[String], configured: &Option<Vec<String>>) -> Result<Vec<String>> {
    if !given.is_empty() {
        return Ok(given.to_vec());
    }
    let configured = validate_required_field(field, configured)?;
    if configured.is_empty() {
        return Err(OptimumError::MissingConfigError {
            field: field.to_string(),
        });
    }
    Ok(configured.clone())
}

/// On-disk configuration, one section per API:
///
/// ```toml
/// [portfolio_api]
/// username = "${OPTIMUM_USERNAME}"
/// password = "${OPTIMUM_PASSWORD}"
///
/// [models_api]
/// token = "${OPTIMUM_MODELS_TOKEN}"
/// base_url = "https://optimize.vicbee.net"
///
/// [market]
/// tickers = ["^DJI"]
/// ranges = ["6mo", "1y"]
/// ```
///
/// A section's `api` defaults to `optimize` and `models` respectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct TomlConfig {
    pub portfolio_api: ClientSettings,
    pub models_api: ClientSettings,
    pub market: MarketConfig,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    portfolio_api: toml::Table,
    #[serde(default)]
    models_api: toml::Table,
    #[serde(default)]
    market: MarketConfig,
}

fn section(name: &str, mut table: toml::Table, api: &str) -> Result<ClientSettings> {
    table
        .entry("api")
        .or_insert(toml::Value::String(api.to_string()));
    toml::Value::Table(table)
        .try_into()
        .map_err(|e| OptimumError::ConfigValidationError {
            field: name.to_string(),
            message: e.to_string(),
        })
}

impl TryFrom<RawConfig> for TomlConfig {
    type Error = OptimumError;

    fn try_from(raw: RawConfig) -> Result<Self> {
        Ok(Self {
            portfolio_api: section("portfolio_api", raw.portfolio_api, PORTFOLIO_API)?,
            models_api: section("models_api", raw.models_api, MODELS_API)?,
            market: raw.market,
        })
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            portfolio_api: ClientSettings::default().api(PORTFOLIO_API),
            models_api: ClientSettings::default().api(MODELS_API),
            market: MarketConfig::default(),
        }
    }
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| OptimumError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replace `${VAR}` with the environment value; unknown variables are left as is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| OptimumError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Overlay OPTIMUM_* environment variables on both APIs.
    pub fn apply_env_overrides(&mut self) {
        self.portfolio_api.apply_env_overrides();
        self.models_api.apply_env_overrides();
    }

    pub fn portfolio_settings(&self) -> ClientSettings {
        self.portfolio_api.clone()
    }

    pub fn models_settings(&self) -> ClientSettings {
        self.models_api.clone()
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        for (name, settings) in [("portfolio_api", &self.portfolio_api), ("models_api", &self.models_api)] {
            let unresolved = [
                ("username", &settings.username),
                ("password", &settings.password),
                ("token", &settings.token),
            ];
            for (field, value) in unresolved {
                if let Some(value) = value {
                    if value.starts_with("${") {
                        return Err(OptimumError::ConfigValidationError {
                            field: format!("{}.{}", name, field),
                            message: format!("environment variable {} is not set", value),
                        });
                    }
                }
            }
            settings.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_per_api_sections() {
        let toml_content = r#"
[portfolio_api]
username = "demo@optimize.vicbee.net"
password = "optimize"
timeout_seconds = 30

[models_api]
token = "models-token"
base_url = "http://localhost:9000"
auto_token_renewal = false

[market]
tickers = ["^DJI"]
ranges = ["1mo", "6mo", "1y"]
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        let portfolio = config.portfolio_settings();
        assert_eq!(portfolio.base_url, "https://optimize.vicbee.net");
        assert_eq!(portfolio.username.as_deref(), Some("demo@optimize.vicbee.net"));
        assert!(portfolio.auto_token_renewal);
        assert_eq!(portfolio.api_root(), "https://optimize.vicbee.net/optimize/api");

        let models = config.models_settings();
        assert_eq!(models.token.as_deref(), Some("models-token"));
        assert_eq!(models.username, None);
        assert!(!models.auto_token_renewal);
        assert_eq!(models.api_root(), "http://localhost:9000/models/api");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_api_name_is_kept() {
        let toml_content = r#"
[portfolio_api]
token = "t"
api = "optimize-beta"

[models_api]
token = "t"
"#;
        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.portfolio_api.api, "optimize-beta");
        assert_eq!(config.models_api.api, MODELS_API);
    }

    #[test]
    fn test_missing_section_fails_validation() {
        let config = TomlConfig::from_toml_str("[portfolio_api]\ntoken = \"t\"\n").unwrap();
        assert_eq!(config.models_api.api, MODELS_API);
        assert!(matches!(
            config.validate(),
            Err(OptimumError::MissingCredentials)
        ));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("OPTIMUM_TEST_TOKEN", "abc123");

        let toml_content = r#"
[portfolio_api]
token = "${OPTIMUM_TEST_TOKEN}"
auto_token_renewal = false

[models_api]
token = "${OPTIMUM_TEST_TOKEN}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.portfolio_api.token.as_deref(), Some("abc123"));
        assert_eq!(config.models_api.token.as_deref(), Some("abc123"));
        assert!(config.validate().is_ok());

        std::env::remove_var("OPTIMUM_TEST_TOKEN");
    }

    #[test]
    fn test_unresolved_placeholder_fails_validation() {
        let toml_content = r#"
[portfolio_api]
token = "abc"

[models_api]
token = "${OPTIMUM_SURELY_UNSET_VARIABLE}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        match config.validate() {
            Err(OptimumError::ConfigValidationError { field, .. }) => {
                assert_eq!(field, "models_api.token")
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_config_validation() {
        let toml_content = r#"
[portfolio_api]
token = "abc"
base_url = "invalid-url"

[models_api]
token = "abc"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[portfolio_api]
username = "demo"
password = "secret"
base_url = "http://localhost:8080"

[models_api]
username = "demo"
password = "secret"
base_url = "http://localhost:8081"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.portfolio_settings().api_root(), "http://localhost:8080/optimize/api");
        assert_eq!(config.models_settings().api_root(), "http://localhost:8081/models/api");
    }

    #[test]
    fn test_market_fallback() {
        let market = MarketConfig {
            tickers: Some(vec!["^DJI".to_string()]),
            ranges: Some(vec!["6mo".to_string(), "1y".to_string()]),
        };

        let (tickers, ranges) = market.resolve(&[], &[]).unwrap();
        assert_eq!(tickers, vec!["^DJI"]);
        assert_eq!(ranges, vec!["6mo", "1y"]);

        let given = vec!["^GSPC".to_string()];
        let (tickers, ranges) = market.resolve(&given, &[]).unwrap();
        assert_eq!(tickers, vec!["^GSPC"]);
        assert_eq!(ranges.len(), 2);

        match MarketConfig::default().resolve(&given, &[]) {
            Err(OptimumError::MissingConfigError { field }) => assert_eq!(field, "market.ranges"),
            other => panic!("expected a missing config error, got {:?}", other),
        }
        let empty = MarketConfig {
            tickers: Some(Vec::new()),
            ranges: None,
        };
        assert!(empty.resolve(&[], &given).is_err());
    }
}
