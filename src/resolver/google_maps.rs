use super::{DistanceProvider, DistanceResult, ProviderError};
use crate::location::LocationInput;
use crate::TransportMode;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

const DISTANCE_MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Google Maps Distance Matrix client.
pub struct GoogleMaps {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl GoogleMaps {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        GoogleMaps {
            client,
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Pigeons fly, so the driving route stands in for the aerial one. Everyone
/// else follows the footpaths.
fn travel_mode(mode: TransportMode) -> &'static str {
    match mode {
        TransportMode::Pigeon => "driving",
        TransportMode::Walking | TransportMode::Swimming | TransportMode::RockClimbing => {
            "walking"
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    origin_addresses: Vec<String>,
    #[serde(default)]
    destination_addresses: Vec<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<TextValue>,
    duration: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
    value: f64,
}

fn parse_matrix(
    response: MatrixResponse,
    origin: &LocationInput,
    destination: &LocationInput,
) -> Result<DistanceResult, ProviderError> {
    if response.status != "OK" {
        let detail = match response.error_message {
            Some(message) => format!("{}: {}", response.status, message),
            None => response.status,
        };
        return Err(ProviderError::Status(detail));
    }

    let element = response
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .ok_or_else(|| ProviderError::InvalidResponse("no route element".into()))?;

    if element.status != "OK" {
        return Err(ProviderError::Status(element.status));
    }

    let (Some(distance), Some(duration)) = (element.distance, element.duration) else {
        return Err(ProviderError::InvalidResponse(
            "route element without distance or duration".into(),
        ));
    };

    Ok(DistanceResult {
        distance_meters: distance.value,
        distance_text: distance.text,
        duration_seconds: duration.value,
        origin: response
            .origin_addresses
            .into_iter()
            .next()
            .unwrap_or_else(|| origin.label()),
        destination: response
            .destination_addresses
            .into_iter()
            .next()
            .unwrap_or_else(|| destination.label()),
    })
}

#[async_trait]
impl DistanceProvider for GoogleMaps {
    fn name(&self) -> &'static str {
        "google-maps"
    }

    #[instrument(name = "google_maps.distance", skip_all, fields(%mode))]
    async fn distance(
        &self,
        origin: &LocationInput,
        destination: &LocationInput,
        mode: TransportMode,
    ) -> Result<DistanceResult, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("Google Maps API key"))?;

        let response = self
            .client
            .get(DISTANCE_MATRIX_URL)
            .query(&[
                ("origins", origin.query_param().as_str()),
                ("destinations", destination.query_param().as_str()),
                ("mode", travel_mode(mode)),
                ("key", api_key),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<MatrixResponse>()
            .await?;

        parse_matrix(response, origin, destination)
    }
}
