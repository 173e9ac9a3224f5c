use async_trait::async_trait;
use std::fmt::Debug;

use crate::{Config, LocationDateKey, PredictionError, RawPredictionResponse};

pub mod http;

pub use http::HttpPredictionClient;

/// One outbound query per call. Implementations must not retry and must not
/// time out on their own; abandoning a request is the caller's business.
#[async_trait]
pub trait PredictionClient: Send + Sync + Debug {
    async fn predict(&self, key: &LocationDateKey) -> Result<RawPredictionResponse, PredictionError>;
}

/// Construct the HTTP client for the configured scoring endpoint.
pub fn client_from_config(config: &Config) -> anyhow::Result<Box<dyn PredictionClient>> {
    config.validate()?;

    let client = HttpPredictionClient::new(config.endpoint.clone());
    tracing::debug!(endpoint = client.endpoint(), "prediction client ready");

    Ok(Box::new(client))
}
