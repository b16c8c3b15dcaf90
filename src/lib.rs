pub mod analysis;
pub mod app;
pub mod audit;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod external;
pub mod github;
pub mod metrics;
pub mod notify;
pub mod risk;
pub mod vulnerability;
pub mod webhooks;

pub use error::SecurityGateError;
