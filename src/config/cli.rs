use crate::config::toml_config::TomlConfig;
use crate::utils::error::{OptimumError, Result};
use crate::utils::validation::{validate_non_empty_string, Validate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "optimum")]
#[command(about = "Command line client for the optimize.vicbee.net portfolio API")]
pub struct CliConfig {
    /// TOML file with client settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Fetch an access token and print it
    Token,
    /// POST a JSON payload to an entry point of the portfolio API
    Call {
        entry_point: String,
        /// Request body as JSON
        data: String,
        /// Send the request to the models API instead
        #[arg(long)]
        models: bool,
    },
    /// Recommend a rebalanced portfolio
    Recommend {
        #[arg(long)]
        portfolio: PathBuf,

        /// Market tickers; defaults to `[market] tickers` in the config file
        #[arg(long, value_delimiter = ',')]
        market: Vec<String>,

        /// Model ranges; defaults to `[market] ranges` in the config file
        #[arg(long, value_delimiter = ',')]
        ranges: Vec<String>,

        #[arg(long, default_value = "0")]
        cashflow: f64,

        #[arg(long, default_value = "0")]
        max_sales: f64,

        /// Target return; defaults to the return at the current risk level
        #[arg(long)]
        mu: Option<f64>,

        /// Ask the optimizer instead of interpolating the frontier
        #[arg(long)]
        exact: bool,
    },
}

impl CliConfig {
    /// Settings from `--config` when given, otherwise defaults; OPTIMUM_*
    /// environment variables take precedence over both.
    pub fn load(&self) -> Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Token => Ok(()),
            Command::Call { entry_point, data, .. } => {
                validate_non_empty_string("entry_point", entry_point)?;
                serde_json::from_str::<serde_json::Value>(data).map_err(|e| {
                    OptimumError::InvalidConfigValueError {
                        field: "data".to_string(),
                        value: data.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(())
            }
            // market and ranges may come from the config file, see `MarketConfig::resolve`
            Command::Recommend { portfolio, .. } => {
                if !portfolio.exists() {
                    return Err(OptimumError::InvalidConfigValueError {
                        field: "portfolio".to_string(),
                        value: portfolio.display().to_string(),
                        reason: "file does not exist".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}
