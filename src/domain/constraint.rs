//! Per-ticker trading constraints, expressed as share bounds.

use crate::utils::error::OptimumError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const LESS_THAN_OR_EQUAL: &str = "\u{2264}";
pub const GREATER_THAN_OR_EQUAL: &str = "\u{2265}";

/// Left-hand side of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintFunction {
    Purchases,
    Sales,
    Holdings,
    #[serde(rename = "short sales")]
    ShortSales,
}

impl ConstraintFunction {
    pub const ALL: [ConstraintFunction; 4] = [
        ConstraintFunction::Purchases,
        ConstraintFunction::Sales,
        ConstraintFunction::Holdings,
        ConstraintFunction::ShortSales,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintFunction::Purchases => "purchases",
            ConstraintFunction::Sales => "sales",
            ConstraintFunction::Holdings => "holdings",
            ConstraintFunction::ShortSales => "short sales",
        }
    }

    /// Lower and upper share bounds implied by `function sign value`.
    pub fn share_bounds(self, sign: ConstraintSign, value: f64, shares: f64) -> (Option<f64>, Option<f64>) {
        use ConstraintSign::*;
        match (self, sign) {
            (ConstraintFunction::Sales, LessThanOrEqual) => (Some(shares - value), None),
            (ConstraintFunction::Sales, GreaterThanOrEqual) => (None, Some(shares - value)),
            (ConstraintFunction::Purchases, LessThanOrEqual) => (None, Some(shares + value)),
            (ConstraintFunction::Purchases, GreaterThanOrEqual) => (Some(shares + value), None),
            (ConstraintFunction::ShortSales, LessThanOrEqual) => (Some(-value), None),
            (ConstraintFunction::ShortSales, GreaterThanOrEqual) => (None, Some(-value)),
            (ConstraintFunction::Holdings, LessThanOrEqual) => (None, Some(value)),
            (ConstraintFunction::Holdings, GreaterThanOrEqual) => (Some(value), None),
        }
    }
}

impl fmt::Display for ConstraintFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConstraintFunction {
    type Err = OptimumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "purchases" => Ok(ConstraintFunction::Purchases),
            "sales" => Ok(ConstraintFunction::Sales),
            "holdings" => Ok(ConstraintFunction::Holdings),
            "short sales" | "short-sales" => Ok(ConstraintFunction::ShortSales),
            other => Err(OptimumError::validation(format!("Unknown constraint function: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSign {
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl ConstraintSign {
    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintSign::LessThanOrEqual => LESS_THAN_OR_EQUAL,
            ConstraintSign::GreaterThanOrEqual => GREATER_THAN_OR_EQUAL,
        }
    }
}

impl FromStr for ConstraintSign {
    type Err = OptimumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            LESS_THAN_OR_EQUAL | "<=" => Ok(ConstraintSign::LessThanOrEqual),
            GREATER_THAN_OR_EQUAL | ">=" => Ok(ConstraintSign::GreaterThanOrEqual),
            other => Err(OptimumError::validation(format!("Unknown constraint sign: {}", other))),
        }
    }
}

/// Unit of the right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintUnit {
    #[serde(rename = "shares")]
    Shares,
    #[serde(rename = "value")]
    Value,
    #[serde(rename = "percent value")]
    PercentValue,
}

impl ConstraintUnit {
    pub const ALL: [ConstraintUnit; 3] = [
        ConstraintUnit::Shares,
        ConstraintUnit::Value,
        ConstraintUnit::PercentValue,
    ];
}

impl FromStr for ConstraintUnit {
    type Err = OptimumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shares" => Ok(ConstraintUnit::Shares),
            "value" => Ok(ConstraintUnit::Value),
            "percent value" | "percent-value" | "%" => Ok(ConstraintUnit::PercentValue),
            other => Err(OptimumError::validation(format!("Unknown constraint unit: {}", other))),
        }
    }
}

/// One value for all tickers, or one per ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValue {
    Uniform(f64),
    PerTicker(Vec<f64>),
}

impl ConstraintValue {
    pub fn expand(&self, n: usize) -> crate::utils::error::Result<Vec<f64>> {
        match self {
            ConstraintValue::Uniform(v) => Ok(vec![*v; n]),
            ConstraintValue::PerTicker(values) if values.len() == n => Ok(values.clone()),
            ConstraintValue::PerTicker(values) => Err(OptimumError::validation(format!(
                "Got {} constraint values for {} tickers",
                values.len(),
                n
            ))),
        }
    }
}

impl From<f64> for ConstraintValue {
    fn from(value: f64) -> Self {
        ConstraintValue::Uniform(value)
    }
}

impl From<Vec<f64>> for ConstraintValue {
    fn from(values: Vec<f64>) -> Self {
        ConstraintValue::PerTicker(values)
    }
}

/// Which kinds of trade a constraint may leave open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeSwitches {
    pub short_sales: bool,
    pub buy: bool,
    pub sell: bool,
}

impl Default for TradeSwitches {
    fn default() -> Self {
        Self {
            short_sales: true,
            buy: true,
            sell: true,
        }
    }
}

impl TradeSwitches {
    pub fn clip(&self, bound: f64, shares: f64) -> f64 {
        let mut bound = bound;
        if !self.short_sales && !(bound > 0.0) {
            bound = 0.0;
        }
        if !self.buy && bound > shares {
            bound = shares;
        }
        if !self.sell && bound < shares {
            bound = shares;
        }
        bound
    }
}
