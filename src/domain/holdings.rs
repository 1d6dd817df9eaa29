use crate::utils::error::{OptimumError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub shares: f64,
    /// Lower bound on shares after rebalancing.
    pub lower: f64,
    /// Upper bound on shares after rebalancing.
    pub upper: f64,
    pub close: Option<f64>,
    pub value: Option<f64>,
    /// Fraction of total portfolio value.
    pub weight: Option<f64>,
}

impl Holding {
    pub fn new(ticker: impl Into<String>, shares: f64) -> Self {
        Self {
            ticker: ticker.into(),
            shares,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            close: None,
            value: None,
            weight: None,
        }
    }

    pub fn is_bounded_below(&self) -> bool {
        self.lower.is_finite()
    }

    pub fn is_bounded_above(&self) -> bool {
        self.upper.is_finite()
    }

    pub fn clear_bounds(&mut self) {
        self.lower = f64::NEG_INFINITY;
        self.upper = f64::INFINITY;
    }
}

/// One row of the portfolio report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRow {
    pub ticker: String,
    pub shares: f64,
    pub lower: f64,
    pub upper: f64,
    #[serde(rename = "close ($)")]
    pub close: Option<f64>,
    #[serde(rename = "value ($)")]
    pub value: Option<f64>,
    #[serde(rename = "value (%)")]
    pub weight: Option<f64>,
    #[serde(rename = "return (%)")]
    pub expected_return: Option<f64>,
    #[serde(rename = "std (%)")]
    pub std: Option<f64>,
    #[serde(rename = "lower ($)")]
    pub lower_value: Option<f64>,
    #[serde(rename = "upper ($)")]
    pub upper_value: Option<f64>,
}

impl From<&Holding> for PortfolioRow {
    fn from(h: &Holding) -> Self {
        Self {
            ticker: h.ticker.clone(),
            shares: h.shares,
            lower: h.lower,
            upper: h.upper,
            close: h.close,
            value: h.value,
            weight: h.weight,
            expected_return: None,
            std: None,
            lower_value: None,
            upper_value: None,
        }
    }
}

/// Read holdings from CSV with a `ticker` column and an optional `shares`
/// column; other columns are ignored.
pub fn read_holdings<R: Read>(reader: R) -> Result<Vec<Holding>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let ticker_idx = headers
        .iter()
        .position(|h| h == "ticker")
        .ok_or_else(|| OptimumError::validation("Portfolio must contain a column named 'ticker'"))?;
    let shares_idx = headers.iter().position(|h| h == "shares");

    let mut seen = HashSet::new();
    let mut holdings = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let ticker = record.get(ticker_idx).unwrap_or_default();
        if ticker.is_empty() {
            return Err(OptimumError::validation(format!("Row {} has no ticker", line + 1)));
        }
        if !seen.insert(ticker.to_string()) {
            return Err(OptimumError::validation(format!("Duplicate ticker '{}'", ticker)));
        }

        let shares = match shares_idx.and_then(|i| record.get(i)) {
            None | Some("") => 0.0,
            Some(s) => s.parse::<f64>().map_err(|_| {
                OptimumError::validation(format!("Invalid shares '{}' for ticker '{}'", s, ticker))
            })?,
        };
        holdings.push(Holding::new(ticker, shares));
    }

    tracing::debug!("Read {} holdings", holdings.len());
    Ok(holdings)
}
