use anyhow::Result;
use httpmock::prelude::*;
use optimum::{
    Client, ClientSettings, ConstraintFunction, ConstraintSign, ConstraintUnit, FrontierMethod,
    FrontierParams, ModelMethod, ModelOptions, OptimumError, Portfolio, RecommendationMethod,
    TradeSwitches,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio_test::assert_ok;

fn portfolio_csv() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/portfolio.csv")
}

fn model(scale: f64) -> Value {
    json!({
        "r": [0.10, 0.08 * scale, 0.12, 0.20],
        "F": [[1.0, 0.2], [0.9, -0.1], [1.1, 0.3], [2.0, 0.5]],
        "Q": [0.02, 0.015, 0.03, 0.08],
        "D": [[0.04, 0.01 * scale], [0.01 * scale, 0.02]],
    })
}

fn models_body() -> Value {
    json!({
        "6mo": model(1.0),
        "1y": model(1.5),
        "prices": {
            "AAPL": ["2024-01-02", 100.0],
            "MSFT": ["2024-01-02", 20.0],
            "ASML": ["2024-01-02", 50.0],
            "TQQQ": ["2024-01-02", 10.0],
        }
    })
}

fn frontier_body() -> Value {
    json!({
        "frontier": [
            {"mu": 0.09, "sol": {"status": "optimal", "x": [0.1, 0.7, 0.1, 0.1]}},
            {"mu": 0.12, "sol": {"status": "optimal", "x": [0.2, 0.3, 0.3, 0.2]}},
            {"mu": 0.16, "sol": {"status": "optimal", "x": [0.0, 0.1, 0.4, 0.5]}},
            {"mu": 0.20, "sol": {"status": "infeasible", "x": []}},
        ]
    })
}

fn clients(server: &MockServer) -> Result<(Client, Client)> {
    let settings = ClientSettings::with_token("test-token").base_url(server.base_url());
    Ok((
        Client::new(settings.clone().api("optimize"))?,
        Client::new(settings.api("models"))?,
    ))
}

async fn loaded_portfolio(server: &MockServer) -> Result<Portfolio> {
    let (portfolio_client, model_client) = clients(server)?;
    let mut portfolio = Portfolio::new(portfolio_client, model_client);
    portfolio.import_csv(portfolio_csv())?;
    portfolio
        .retrieve_models(
            &["^DJI"],
            &["6mo", "1y"],
            ModelOptions {
                include_prices: true,
                ..ModelOptions::default()
            },
        )
        .await?;
    Ok(portfolio)
}

#[tokio::test]
async fn test_recommendation_workflow() -> Result<()> {
    let server = MockServer::start();
    let models_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/models/api/model")
            .header("x-api-key", "test-token");
        then.status(200).json_body(models_body());
    });
    let frontier_mock = server.mock(|when, then| {
        when.method(POST).path("/optimize/api/frontier");
        then.status(200).json_body(frontier_body());
    });
    let portfolio_mock = server.mock(|when, then| {
        when.method(POST).path("/optimize/api/portfolio");
        then.status(200)
            .json_body(json!({"status": "optimal", "x": [0.15, 0.5, 0.2, 0.15]}));
    });

    let mut portfolio = loaded_portfolio(&server).await?;
    models_mock.assert();
    assert_eq!(portfolio.get_tickers(), vec!["AAPL", "MSFT", "ASML", "TQQQ"]);
    assert_eq!(portfolio.get_value(), 430.0);
    assert_eq!(portfolio.models().len(), 2);

    assert_ok!(portfolio.retrieve_frontier(FrontierParams::default()).await);
    frontier_mock.assert();
    assert_eq!(portfolio.frontier_method(), FrontierMethod::Optimal);
    assert_eq!(portfolio.frontier().map(|f| f.len()), Some(3));

    let approx = portfolio
        .retrieve_recommendation(Some(0.105), RecommendationMethod::Approximate)
        .await?;
    assert!((approx.x[1] - 0.5).abs() < 1e-12);
    portfolio_mock.assert_hits(0);

    let exact = portfolio
        .retrieve_recommendation(Some(0.105), RecommendationMethod::Exact)
        .await?;
    portfolio_mock.assert();
    assert_eq!(exact.status, "optimal");
    assert_eq!(exact.x[1], 0.5);
    assert!(exact.std > 0.0);

    let out = NamedTempFile::new()?;
    portfolio.write_csv(out.reopen()?)?;
    let mut reader = csv::Reader::from_path(out.path())?;
    let headers = reader.headers()?.clone();
    assert_eq!(&headers[0], "ticker");
    assert!(headers.iter().any(|h| h == "std (%)"));
    assert_eq!(reader.records().count(), 4);
    Ok(())
}

#[tokio::test]
async fn test_frontier_query_carries_constraints() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/models/api/model");
        then.status(200).json_body(models_body());
    });
    let frontier_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/optimize/api/frontier")
            .body_contains("\"xup\"")
            .body_contains("\"rho\"");
        then.status(200).json_body(frontier_body());
    });

    let mut portfolio = loaded_portfolio(&server).await?;
    portfolio.apply_constraint(
        &["TQQQ"],
        ConstraintFunction::Holdings,
        ConstraintSign::LessThanOrEqual,
        20.0,
        ConstraintUnit::Shares,
        TradeSwitches::default(),
    )?;
    assert_eq!(portfolio.holdings()[3].upper, 20.0);

    let params = FrontierParams {
        cashflow: 70.0,
        rho: 1e-3,
        ..FrontierParams::default()
    };
    portfolio.retrieve_frontier(params).await?;
    frontier_mock.assert();

    let query = portfolio.frontier_query_params();
    let xup = query["xup"].as_array().expect("xup");
    assert_eq!(xup[0], Value::Null);
    // bounds are scaled by the value after the cashflow
    assert!((xup[3].as_f64().unwrap() - 20.0 * 10.0 / 500.0).abs() < 1e-12);
    assert!(query.contains_key("D"));
    Ok(())
}

#[tokio::test]
async fn test_infeasible_frontier() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/models/api/model");
        then.status(200).json_body(models_body());
    });
    server.mock(|when, then| {
        when.method(POST).path("/optimize/api/frontier");
        then.status(200).json_body(json!({
            "frontier": [{"mu": 0.1, "sol": {"status": "infeasible", "x": []}}]
        }));
    });

    let mut portfolio = loaded_portfolio(&server).await?;
    let err = portfolio
        .retrieve_frontier(FrontierParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OptimumError::InfeasibleFrontier));
    assert!(!portfolio.has_frontier());
    assert!(portfolio
        .retrieve_recommendation(Some(0.1), RecommendationMethod::Approximate)
        .await
        .is_err());
    Ok(())
}

#[tokio::test]
async fn test_model_weights_and_method() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/models/api/model");
        then.status(200).json_body(models_body());
    });
    server.mock(|when, then| {
        when.method(POST).path("/optimize/api/frontier");
        then.status(200).json_body(frontier_body());
    });

    let mut portfolio = loaded_portfolio(&server).await?;
    portfolio.retrieve_frontier(FrontierParams::default()).await?;

    let weights = BTreeMap::from([("6mo".to_string(), 1.0), ("1y".to_string(), 0.0)]);
    portfolio.set_models_weights(weights)?;
    assert_eq!(portfolio.frontier_method(), FrontierMethod::Approximate);

    // with all weight on one range the blend is that range's model
    let blended = portfolio.get_model()?;
    let six_months = portfolio.models()["6mo"].clone();
    assert!((blended.r() - six_months.r()).abs().max() < 1e-12);
    assert!((blended.d()? - six_months.d()?).abs().max() < 1e-12);

    portfolio.set_model_method(ModelMethod::LinearFractional);
    let blended = portfolio.get_model()?;
    assert!((blended.di()? - six_months.di()?).abs().max() < 1e-9);

    let (mu, std) = portfolio.get_return_and_variance()?;
    assert!(mu.is_finite() && std > 0.0);
    Ok(())
}
