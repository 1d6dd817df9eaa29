pub mod blocking;
pub mod client;
pub mod portfolio;

pub use crate::domain::ports::ApiCaller;
pub use crate::utils::error::Result;
pub use blocking::BlockingClient;
pub use client::Client;
pub use portfolio::{FrontierParams, ModelMethod, ModelOptions, Portfolio, ReturnModel};
