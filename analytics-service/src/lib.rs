pub mod aggregate;
pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod reconcile;
pub mod sources;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_support;

pub use dataset::Dataset;
pub use error::AnalyticsError;
pub use pipeline::{Envelope, Pipeline};
