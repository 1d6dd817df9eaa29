pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::{ClientSettings, TomlConfig};
pub use core::{BlockingClient, Client, FrontierParams, ModelMethod, ModelOptions, Portfolio, ReturnModel};
pub use domain::constraint::{ConstraintFunction, ConstraintSign, ConstraintUnit, TradeSwitches};
pub use domain::frontier::{Frontier, FrontierMethod, Recommendation, RecommendationMethod};
pub use domain::model::Model;
pub use utils::error::{OptimumError, Result};
