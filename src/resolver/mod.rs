//! Distance lookup: a mapping service first, a model-based estimate second.

use crate::estimator::{self, DeliveryEstimate};
use crate::location::LocationInput;
use crate::TransportMode;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

pub mod claude;
pub mod google_maps;

pub use claude::ClaudeEstimator;
pub use google_maps::GoogleMaps;

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceResult {
    pub distance_meters: f64,
    pub distance_text: String,
    pub duration_seconds: f64,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EstimateMethod {
    #[serde(rename = "google-maps")]
    GoogleMaps,
    #[serde(rename = "claude-estimate")]
    ClaudeEstimate,
}

impl EstimateMethod {
    pub fn is_estimate(&self) -> bool {
        matches!(self, EstimateMethod::ClaudeEstimate)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
#[error("unable to calculate distance: both mapping and estimate services failed")]
pub struct ResolveError {
    pub primary: ProviderError,
    pub fallback: ProviderError,
}

#[async_trait]
pub trait DistanceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn distance(
        &self,
        origin: &LocationInput,
        destination: &LocationInput,
        mode: TransportMode,
    ) -> Result<DistanceResult, ProviderError>;
}

#[derive(Clone)]
pub struct Resolver {
    primary: Arc<dyn DistanceProvider>,
    fallback: Arc<dyn DistanceProvider>,
}

impl Resolver {
    pub fn new(primary: Arc<dyn DistanceProvider>, fallback: Arc<dyn DistanceProvider>) -> Self {
        Resolver { primary, fallback }
    }

    pub async fn resolve(
        &self,
        origin: &LocationInput,
        destination: &LocationInput,
        mode: TransportMode,
    ) -> Result<(DistanceResult, EstimateMethod), ResolveError> {
        debug!(provider = self.primary.name(), %mode, "Resolving distance");
        let primary = match self.primary.distance(origin, destination, mode).await {
            Ok(result) => return Ok((result, EstimateMethod::GoogleMaps)),
            Err(err) => err,
        };

        warn!(provider = self.primary.name(), error = %primary, "Falling back to estimate");
        match self.fallback.distance(origin, destination, mode).await {
            Ok(result) => Ok((result, EstimateMethod::ClaudeEstimate)),
            Err(fallback) => {
                error!(
                    provider = self.fallback.name(),
                    error = %fallback,
                    "Both distance providers failed"
                );
                Err(ResolveError { primary, fallback })
            }
        }
    }

    pub async fn estimate(
        &self,
        origin: &LocationInput,
        destination: &LocationInput,
        mode: TransportMode,
    ) -> Result<DeliveryEstimate, ResolveError> {
        let (distance, method) = self.resolve(origin, destination, mode).await?;
        Ok(estimator::estimate(distance, mode, method))
    }

    /// Estimates every mode concurrently. Any failure fails the whole batch.
    pub async fn estimate_all(
        &self,
        origin: &LocationInput,
        destination: &LocationInput,
    ) -> Result<BTreeMap<TransportMode, DeliveryEstimate>, ResolveError> {
        let estimates = futures::future::try_join_all(
            TransportMode::ALL
                .into_iter()
                .map(|mode| async move {
                    let estimate = self.estimate(origin, destination, mode).await?;
                    Ok::<_, ResolveError>((mode, estimate))
                }),
        )
        .await?;

        Ok(estimates.into_iter().collect())
    }
}
