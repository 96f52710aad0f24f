pub mod aggregate;
pub mod capture;
pub mod config;
pub mod model;

pub use aggregate::*;
pub use capture::*;
pub use config::*;
pub use model::*;

// Firewall ruleset model, rule identifiers and counter aggregation
