use crate::core::client::Client;
use crate::domain::constraint::{
    ConstraintFunction, ConstraintSign, ConstraintUnit, ConstraintValue, TradeSwitches,
};
use crate::domain::frontier::{
    Frontier, FrontierMethod, FrontierPoint, Recommendation, RecommendationMethod,
};
use crate::domain::holdings::{read_holdings, Holding, PortfolioRow};
use crate::domain::model::{finite_or_null, Model, ModelField, UnconstrainedFrontier};
use crate::domain::ports::ApiCaller;
use crate::utils::error::{OptimumError, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Lowest and highest value of a quantity.
pub type ValueRange = (f64, f64);

/// How per-range models are combined into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelMethod {
    /// Weighted sum of the factor covariances.
    #[default]
    #[serde(rename = "linear")]
    Linear,
    /// Weighted sum of the inverse factor covariances.
    #[serde(rename = "linear-fractional")]
    LinearFractional,
}

impl FromStr for ModelMethod {
    type Err = OptimumError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(ModelMethod::Linear),
            "linear-fractional" => Ok(ModelMethod::LinearFractional),
            other => Err(OptimumError::validation(format!("Unknown model method: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnModel {
    #[default]
    Median,
    Mean,
}

/// Options for [`Portfolio::retrieve_models`].
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    pub return_model: ReturnModel,
    pub common_factors: bool,
    pub include_prices: bool,
    pub model_weights: Option<BTreeMap<String, f64>>,
}

/// Parameters of a frontier query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontierParams {
    pub cashflow: f64,
    pub max_sales: f64,
    pub short_sales: bool,
    pub buy: bool,
    pub sell: bool,
    /// Regularization weight; only sent when positive.
    pub rho: f64,
}

impl Default for FrontierParams {
    fn default() -> Self {
        Self {
            cashflow: 0.0,
            max_sales: 0.0,
            short_sales: false,
            buy: true,
            sell: true,
            rho: 0.0,
        }
    }
}

/// A portfolio of holdings together with its risk models and efficient frontier.
///
/// Models and prices come from the models API; frontiers and exact
/// recommendations come from the portfolio API.
pub struct Portfolio<C: ApiCaller = Client> {
    portfolio_client: C,
    model_client: C,
    model_method: ModelMethod,
    holdings: Vec<Holding>,
    models: BTreeMap<String, Model>,
    model_weights: BTreeMap<String, f64>,
    frontier: Option<Frontier>,
    frontier_query_params: Map<String, Value>,
    frontier_method: FrontierMethod,
}

impl<C: ApiCaller> Portfolio<C> {
    pub fn new(portfolio_client: C, model_client: C) -> Self {
        Self {
            portfolio_client,
            model_client,
            model_method: ModelMethod::default(),
            holdings: Vec::new(),
            models: BTreeMap::new(),
            model_weights: BTreeMap::new(),
            frontier: None,
            frontier_query_params: Map::new(),
            frontier_method: FrontierMethod::None,
        }
    }

    pub fn with_model_method(mut self, method: ModelMethod) -> Self {
        self.model_method = method;
        self
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn models(&self) -> &BTreeMap<String, Model> {
        &self.models
    }

    pub fn model_weights(&self) -> &BTreeMap<String, f64> {
        &self.model_weights
    }

    pub fn model_method(&self) -> ModelMethod {
        self.model_method
    }

    pub fn frontier(&self) -> Option<&Frontier> {
        self.frontier.as_ref()
    }

    pub fn frontier_method(&self) -> FrontierMethod {
        self.frontier_method
    }

    pub fn frontier_query_params(&self) -> &Map<String, Value> {
        &self.frontier_query_params
    }

    pub fn invalidate_model(&mut self) {
        self.models.clear();
        self.model_weights.clear();
    }

    pub fn invalidate_frontier(&mut self) {
        self.frontier = None;
        self.frontier_query_params = Map::new();
        self.frontier_method = FrontierMethod::None;
    }

    pub fn has_prices(&self) -> bool {
        !self.holdings.is_empty() && self.holdings.iter().all(|h| h.close.is_some())
    }

    pub fn has_frontier(&self) -> bool {
        self.frontier.is_some()
    }

    pub fn has_models(&self) -> bool {
        !self.models.is_empty()
    }

    pub fn get_tickers(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.ticker.clone()).collect()
    }

    /// Total value, or zero before prices are known.
    pub fn get_value(&self) -> f64 {
        if !self.has_prices() {
            return 0.0;
        }
        self.holdings.iter().filter_map(|h| h.value).sum()
    }

    pub fn import_csv<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = std::fs::File::open(path.as_ref())?;
        tracing::info!("Importing portfolio from {}", path.as_ref().display());
        self.import_csv_reader(file)
    }

    pub fn import_csv_reader<R: Read>(&mut self, reader: R) -> Result<()> {
        let holdings = read_holdings(reader)?;
        self.invalidate_frontier();
        self.invalidate_model();
        self.holdings = holdings;
        Ok(())
    }

    fn update_prices(&mut self, prices: &Value) -> Result<f64> {
        let prices = prices
            .as_object()
            .ok_or_else(|| OptimumError::unexpected("prices must be an object keyed by ticker"))?;

        let mut closes = Vec::with_capacity(self.holdings.len());
        for holding in &self.holdings {
            let entry = prices
                .get(&holding.ticker)
                .ok_or_else(|| OptimumError::unexpected(format!("No price for ticker '{}'", holding.ticker)))?;
            // [timestamp, close]
            let close = match entry {
                Value::Array(fields) => fields.get(1).and_then(Value::as_f64),
                Value::Object(fields) => fields.get("close").and_then(Value::as_f64),
                _ => None,
            }
            .ok_or_else(|| OptimumError::unexpected(format!("Malformed price for ticker '{}'", holding.ticker)))?;
            closes.push(close);
        }

        let mut total = 0.0;
        for (holding, close) in self.holdings.iter_mut().zip(closes) {
            let value = holding.shares * close;
            holding.close = Some(close);
            holding.value = Some(value);
            total += value;
        }
        for holding in &mut self.holdings {
            holding.weight = holding.value.map(|v| v / total);
        }

        tracing::info!("Portfolio value: {:.2}", total);
        Ok(total)
    }

    /// Fetch closing prices and return the total portfolio value.
    pub async fn retrieve_prices(&mut self) -> Result<f64> {
        let data = json!({ "symbols": self.get_tickers() });
        let prices = self.model_client.call("prices", &data).await?;
        self.update_prices(&prices)
    }

    /// Fetch one model per range for the current tickers against `market_tickers`.
    pub async fn retrieve_models<M, R>(
        &mut self,
        market_tickers: &[M],
        ranges: &[R],
        options: ModelOptions,
    ) -> Result<()>
    where
        M: AsRef<str>,
        R: AsRef<str>,
    {
        let data = json!({
            "tickers": self.get_tickers(),
            "market": market_tickers.iter().map(|t| t.as_ref()).collect::<Vec<_>>(),
            "range": ranges.iter().map(|r| r.as_ref()).collect::<Vec<_>>(),
            "options": {
                "common": options.common_factors,
                "return_model": options.return_model,
                "include_prices": options.include_prices,
            }
        });
        let response = self.model_client.call("model", &data).await?;
        let Value::Object(mut response) = response else {
            return Err(OptimumError::unexpected("model response must be an object"));
        };

        if options.include_prices {
            let prices = response
                .remove("prices")
                .ok_or_else(|| OptimumError::unexpected("model response has no 'prices'"))?;
            self.update_prices(&prices)?;
        }

        let models = response
            .iter()
            .map(|(range, data)| Ok((range.clone(), Model::from_value(data)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        tracing::info!("Retrieved {} models", models.len());

        self.set_models(models, options.model_weights)
    }

    pub fn set_models(
        &mut self,
        models: BTreeMap<String, Model>,
        model_weights: Option<BTreeMap<String, f64>>,
    ) -> Result<()> {
        if let Some(model) = models.values().find(|m| m.num_assets() != self.holdings.len()) {
            return Err(OptimumError::model(format!(
                "Model has {} assets but portfolio has {} tickers",
                model.num_assets(),
                self.holdings.len()
            )));
        }

        let weights = model_weights
            .unwrap_or_else(|| models.keys().map(|rg| (rg.clone(), 1.0)).collect());
        let weights = normalize_weights(&models, weights)?;

        self.invalidate_frontier();
        self.models = models;
        self.model_weights = weights;
        Ok(())
    }

    /// Set and normalize the weight of each model; weights summing to zero become uniform.
    pub fn set_models_weights(&mut self, model_weights: BTreeMap<String, f64>) -> Result<()> {
        self.model_weights = normalize_weights(&self.models, model_weights)?;

        if self.frontier.is_some() {
            let model = self.get_model()?;
            if let Some(frontier) = self.frontier.as_mut() {
                for point in frontier.points_mut() {
                    let (mu, std) = model.return_and_variance(&point.x)?;
                    point.mu = mu;
                    point.std = std;
                }
            }
            self.frontier_method = FrontierMethod::Approximate;
        }
        Ok(())
    }

    pub fn set_model_method(&mut self, method: ModelMethod) {
        self.model_method = method;
    }

    /// Weighted combination of the per-range models.
    pub fn get_model(&self) -> Result<Model> {
        if !self.has_models() {
            return Err(OptimumError::precondition("Models have not yet been retrieved"));
        }
        let via_inverse = self.model_method == ModelMethod::LinearFractional && self.models.len() > 1;
        Model::blend(
            self.model_weights
                .iter()
                .filter_map(|(rg, w)| self.models.get(rg).map(|m| (*w, m))),
            via_inverse,
        )
    }

    fn weights(&self) -> Result<DVector<f64>> {
        if !self.has_prices() {
            return Err(OptimumError::precondition("Prices have not yet been retrieved"));
        }
        Ok(DVector::from_iterator(
            self.holdings.len(),
            self.holdings.iter().map(|h| h.weight.unwrap_or(0.0)),
        ))
    }

    fn portfolio_query(&self, params: &FrontierParams) -> Result<Map<String, Value>> {
        let model = self.get_model()?;
        let mut data = model.to_data(
            Some(&[ModelField::R, ModelField::Q, ModelField::D, ModelField::F]),
            true,
        )?;

        if params.rho > 0.0 {
            data.insert("rho".to_string(), json!(params.rho));
        }

        let value0 = self.get_value();
        let value = value0 + params.cashflow;
        let x0: Vec<Value> = self.weights()?.iter().cloned().map(finite_or_null).collect();
        data.insert("x0".to_string(), Value::from(x0));
        data.insert("cashflow".to_string(), finite_or_null(params.cashflow / value0));
        data.insert(
            "options".to_string(),
            json!({ "short": params.short_sales, "buy": params.buy, "sell": params.sell }),
        );
        data.insert(
            "constraints".to_string(),
            json!([{
                "label": "sales",
                "function": "sales",
                "bounds": finite_or_null(params.max_sales / value0),
            }]),
        );

        let scaled = |bound: f64, close: Option<f64>| finite_or_null(bound * close.unwrap_or(f64::NAN) / value);
        if self.holdings.iter().any(Holding::is_bounded_below) {
            let xlo: Vec<Value> = self.holdings.iter().map(|h| scaled(h.lower, h.close)).collect();
            data.insert("xlo".to_string(), Value::from(xlo));
        }
        if self.holdings.iter().any(Holding::is_bounded_above) {
            let xup: Vec<Value> = self.holdings.iter().map(|h| scaled(h.upper, h.close)).collect();
            data.insert("xup".to_string(), Value::from(xup));
        }

        Ok(data)
    }

    /// Ask the optimizer for the efficient frontier under the current constraints.
    pub async fn retrieve_frontier(&mut self, params: FrontierParams) -> Result<()> {
        if !(self.has_prices() && self.has_models()) {
            return Err(OptimumError::precondition("Either prices or models are missing"));
        }

        let query = self.portfolio_query(&params)?;
        let sol = self
            .portfolio_client
            .call("frontier", &Value::Object(query.clone()))
            .await?;
        let solutions = sol
            .get("frontier")
            .and_then(Value::as_array)
            .ok_or_else(|| OptimumError::unexpected("frontier response has no 'frontier' list"))?;

        let model = self.get_model()?;
        let mut points = Vec::with_capacity(solutions.len());
        for s in solutions {
            if s["sol"]["status"].as_str() != Some("optimal") {
                continue;
            }
            let mu = s["mu"]
                .as_f64()
                .ok_or_else(|| OptimumError::unexpected("frontier point has no 'mu'"))?;
            let x = vector_from_value(&s["sol"]["x"])?;
            let (_, std) = model.return_and_variance(&x)?;
            points.push(FrontierPoint { mu, std, x });
        }

        if points.is_empty() {
            tracing::warn!("Optimizer returned no optimal frontier points");
            self.invalidate_frontier();
            return Err(OptimumError::InfeasibleFrontier);
        }

        tracing::info!("Retrieved frontier with {} points", points.len());
        self.frontier = Some(Frontier::new(points));
        self.frontier_query_params = query;
        self.frontier_method = FrontierMethod::Optimal;
        Ok(())
    }

    /// Recommended holdings at return `mu`, or at the return matching the
    /// current portfolio risk when `mu` is `None`.
    pub async fn retrieve_recommendation(
        &self,
        mu: Option<f64>,
        method: RecommendationMethod,
    ) -> Result<Recommendation> {
        let frontier = self
            .frontier
            .as_ref()
            .ok_or_else(|| OptimumError::precondition("Frontier has not been retrieved"))?;
        let empty = || OptimumError::precondition("Frontier is empty");

        let mu = match mu {
            Some(mu) => mu,
            None => {
                let (_, std) = self.get_return_and_variance()?;
                frontier.mu_at_std(std).ok_or_else(empty)?
            }
        };

        if method == RecommendationMethod::Exact {
            let mut data = self.frontier_query_params.clone();
            data.insert("mu".to_string(), json!(mu));

            let recs = self.portfolio_client.call("portfolio", &Value::Object(data)).await?;
            let status = recs["status"].as_str().unwrap_or_default();
            if status == "optimal" {
                let x = vector_from_value(&recs["x"])?;
                let (_, std) = self.get_model()?.return_and_variance(&x)?;
                return Ok(Recommendation {
                    x,
                    status: status.to_string(),
                    std,
                    mu,
                });
            }
            tracing::warn!("Exact recommendation returned status '{}'; using approximation", status);
        }

        frontier.approximate(mu).ok_or_else(empty)
    }

    /// Portfolio as report rows, with model and price columns when available.
    pub fn portfolio_table(&self) -> Result<Vec<PortfolioRow>> {
        let mut rows: Vec<PortfolioRow> = self.holdings.iter().map(PortfolioRow::from).collect();

        if self.has_models() {
            let model = self.get_model()?;
            let std = model.std()?;
            for (i, row) in rows.iter_mut().enumerate() {
                row.expected_return = Some(model.r()[i]);
                row.std = Some(std[i]);
            }
        }

        if self.has_prices() {
            for row in &mut rows {
                row.lower_value = row.close.map(|c| c * row.lower);
                row.upper_value = row.close.map(|c| c * row.upper);
            }
        }

        Ok(rows)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for row in self.portfolio_table()? {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn get_frontier_range(&self) -> Result<(ValueRange, ValueRange)> {
        let frontier = self
            .frontier
            .as_ref()
            .ok_or_else(|| OptimumError::precondition("Frontier has not been retrieved yet"))?;
        match (frontier.mu_range(), frontier.std_range()) {
            (Some(mu), Some(std)) => Ok((mu, std)),
            _ => Err(OptimumError::precondition("Frontier is empty")),
        }
    }

    /// Return and risk ranges of the current model, widened to cover the frontier.
    pub fn get_range(&self) -> Result<(ValueRange, ValueRange)> {
        let model = self.get_model()?;
        let mut mu_range = min_max(model.r().iter().cloned());
        let mut std_range = min_max(model.std()?.iter().cloned());

        if self.frontier.is_some() {
            let (fmu, fstd) = self.get_frontier_range()?;
            mu_range = (mu_range.0.min(fmu.0), mu_range.1.max(fmu.1));
            std_range = (std_range.0.min(fstd.0), std_range.1.max(fstd.1));
        }
        Ok((mu_range, std_range))
    }

    /// Return and standard deviation of the current holdings.
    pub fn get_return_and_variance(&self) -> Result<(f64, f64)> {
        let x = self.weights()?;
        self.get_model()?.return_and_variance(&x)
    }

    pub fn get_unconstrained_frontier(&self, x_bar: f64) -> Result<UnconstrainedFrontier> {
        self.get_model()?.unconstrained_frontier(x_bar)
    }

    fn ticker_indices<T: AsRef<str>>(&self, tickers: &[T]) -> Result<Vec<usize>> {
        tickers
            .iter()
            .map(|t| {
                self.holdings
                    .iter()
                    .position(|h| h.ticker == t.as_ref())
                    .ok_or_else(|| OptimumError::validation(format!("Unknown ticker '{}'", t.as_ref())))
            })
            .collect()
    }

    /// Remove all individual constraints on the listed tickers.
    pub fn remove_constraints<T: AsRef<str>>(&mut self, tickers: &[T]) -> Result<()> {
        for i in self.ticker_indices(tickers)? {
            self.holdings[i].clear_bounds();
        }
        Ok(())
    }

    /// Tighten share bounds on `tickers` so that `function sign value` holds.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_constraint<T: AsRef<str>>(
        &mut self,
        tickers: &[T],
        function: ConstraintFunction,
        sign: ConstraintSign,
        value: impl Into<ConstraintValue>,
        unit: ConstraintUnit,
        switches: TradeSwitches,
    ) -> Result<()> {
        if tickers.is_empty() {
            return Ok(());
        }

        let indices = self.ticker_indices(tickers)?;
        let values = value.into().expand(indices.len())?;

        let mut bounds = Vec::with_capacity(indices.len());
        for (&i, v) in indices.iter().zip(values) {
            let holding = &self.holdings[i];
            let shares = holding.shares;
            let v = match unit {
                ConstraintUnit::Shares => v,
                ConstraintUnit::Value => {
                    let close = holding.close.ok_or_else(|| {
                        OptimumError::precondition("Prices are required for value constraints")
                    })?;
                    v / close
                }
                ConstraintUnit::PercentValue => v * shares / 100.0,
            };
            let (lb, ub) = function.share_bounds(sign, v, shares);
            bounds.push((
                i,
                lb.map(|b| switches.clip(b, shares)),
                ub.map(|b| switches.clip(b, shares)),
            ));
        }

        for (i, lb, ub) in bounds {
            let holding = &mut self.holdings[i];
            if let Some(lb) = lb {
                holding.lower = holding.lower.max(lb);
            }
            if let Some(ub) = ub {
                holding.upper = holding.upper.min(ub);
            }
        }
        Ok(())
    }
}

/// Weights checked against `models` and scaled to sum to one.
fn normalize_weights(
    models: &BTreeMap<String, Model>,
    weights: BTreeMap<String, f64>,
) -> Result<BTreeMap<String, f64>> {
    if models.is_empty() {
        return Err(OptimumError::precondition("Models have not yet been retrieved"));
    }
    if !models.keys().eq(weights.keys()) {
        return Err(OptimumError::validation("Weights must have the same keys as models"));
    }
    if weights.values().any(|w| !(*w >= 0.0)) {
        return Err(OptimumError::validation("Weights must be non-negative"));
    }

    let total: f64 = weights.values().sum();
    let n = weights.len() as f64;
    Ok(weights
        .into_iter()
        .map(|(rg, w)| (rg, if total > 0.0 { w / total } else { 1.0 / n }))
        .collect())
}

fn vector_from_value(value: &Value) -> Result<DVector<f64>> {
    let entries = value
        .as_array()
        .ok_or_else(|| OptimumError::unexpected("expected a numeric array"))?;
    let values = entries
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| OptimumError::unexpected("expected a number")))
        .collect::<Result<Vec<_>>>()?;
    Ok(DVector::from_vec(values))
}

fn min_max(values: impl Iterator<Item = f64>) -> ValueRange {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
