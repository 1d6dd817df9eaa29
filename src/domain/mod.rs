//! Domain layer: the risk model, holdings, frontier and constraint types, and
//! the port the portfolio uses to reach the API.

pub mod constraint;
pub mod frontier;
pub mod holdings;
pub mod model;
pub mod ports;
