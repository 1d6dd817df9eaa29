use clap::Parser;
use optimum::config::cli::Command;
use optimum::utils::error::ErrorSeverity;
use optimum::utils::{logger, validation::Validate};
use optimum::{
    CliConfig, Client, FrontierParams, ModelOptions, OptimumError, Portfolio, RecommendationMethod,
    Result, TomlConfig,
};

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    if config.json_logs {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting optimum CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        tracing::error!("Suggestion: {}", e.recovery_suggestion());
        eprintln!("{}", e.user_friendly_message());
        std::process::exit(1);
    }

    let result = match config.load() {
        Ok(settings) => run(&config.command, &settings).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!(
            "Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("{}", e.user_friendly_message());
        eprintln!("Suggestion: {}", e.recovery_suggestion());
        if e.is_retryable() {
            eprintln!("The connection failed or timed out; running the command again may succeed.");
        }

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(command: &Command, settings: &TomlConfig) -> Result<()> {
    match command {
        Command::Token => {
            let client = Client::new(settings.portfolio_settings())?;
            client.get_token().await?;
            let token = client.token().await.ok_or(OptimumError::NoToken)?;
            println!("{}", token);
        }
        Command::Call {
            entry_point,
            data,
            models,
        } => {
            let client_settings = if *models {
                settings.models_settings()
            } else {
                settings.portfolio_settings()
            };
            let client = Client::new(client_settings)?;
            let data: serde_json::Value = serde_json::from_str(data)?;
            let response = client.call(entry_point, &data).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Recommend {
            portfolio: path,
            market,
            ranges,
            cashflow,
            max_sales,
            mu,
            exact,
        } => {
            let mut portfolio = Portfolio::new(
                Client::new(settings.portfolio_settings())?,
                Client::new(settings.models_settings())?,
            );
            let (market, ranges) = settings.market.resolve(market, ranges)?;
            portfolio.import_csv(path)?;

            let options = ModelOptions {
                include_prices: true,
                ..ModelOptions::default()
            };
            portfolio
                .retrieve_models(market.as_slice(), ranges.as_slice(), options)
                .await?;
            portfolio
                .retrieve_frontier(FrontierParams {
                    cashflow: *cashflow,
                    max_sales: *max_sales,
                    ..FrontierParams::default()
                })
                .await?;

            let method = if *exact {
                RecommendationMethod::Exact
            } else {
                RecommendationMethod::Approximate
            };
            let (mu0, std0) = portfolio.get_return_and_variance()?;
            let rec = portfolio.retrieve_recommendation(*mu, method).await?;

            println!("current:     return {:>8.4}  std {:>8.4}", mu0, std0);
            println!("recommended: return {:>8.4}  std {:>8.4}", rec.mu, rec.std);
            println!();
            println!("{:<10} {:>10} {:>10}", "ticker", "current", "weight");
            for (holding, weight) in portfolio.holdings().iter().zip(rec.x.iter()) {
                println!(
                    "{:<10} {:>10.4} {:>10.4}",
                    holding.ticker,
                    holding.weight.unwrap_or(0.0),
                    weight
                );
            }
        }
    }
    Ok(())
}
