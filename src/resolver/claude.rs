use super::{DistanceProvider, DistanceResult, ProviderError};
use crate::location::LocationInput;
use crate::TransportMode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;

/// Asks a language model for a best-guess distance when the mapping service
/// cannot route between two places.
pub struct ClaudeEstimator {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl ClaudeEstimator {
    pub fn new(client: reqwest::Client, api_key: Option<String>, model: impl Into<String>) -> Self {
        ClaudeEstimator {
            client,
            api_key: api_key.filter(|key| !key.is_empty()),
            model: model.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Estimate {
    distance_km: f64,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    origin_formatted: Option<String>,
    #[serde(default)]
    destination_formatted: Option<String>,
}

fn prompt(origin: &str, destination: &str) -> String {
    format!(
        "You are a distance estimation assistant for a novelty email service.\n\
         \n\
         Estimate the distance between these two locations:\n\
         Origin: {origin}\n\
         Destination: {destination}\n\
         \n\
         Provide your response in this exact JSON format (no markdown, just the JSON):\n\
         {{\n  \
           \"distanceKm\": <estimated distance in kilometers as a number>,\n  \
           \"explanation\": \"<brief explanation of how you estimated this>\",\n  \
           \"originFormatted\": \"<formatted origin location name>\",\n  \
           \"destinationFormatted\": \"<formatted destination location name>\"\n\
         }}\n\
         \n\
         Be as accurate as possible based on your geographic knowledge. If coordinates \
         are provided, use them. If addresses are provided, use your knowledge of those places."
    )
}

/// Models sometimes wrap JSON in a markdown fence despite being told not to.
fn strip_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn parse_estimate(
    text: &str,
    origin: String,
    destination: String,
    mode: TransportMode,
) -> Result<DistanceResult, ProviderError> {
    let estimate: Estimate = serde_json::from_str(strip_fence(text))
        .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;

    if !estimate.distance_km.is_finite() || estimate.distance_km < 0.0 {
        return Err(ProviderError::InvalidResponse(format!(
            "distance {} km",
            estimate.distance_km
        )));
    }
    if let Some(explanation) = &estimate.explanation {
        debug!(%explanation, "Distance estimated");
    }

    Ok(DistanceResult {
        distance_meters: estimate.distance_km * 1000.0,
        distance_text: format!("{:.1} km (estimated)", estimate.distance_km),
        duration_seconds: estimate.distance_km / mode.speed_kmh() * 3600.0,
        origin: estimate.origin_formatted.unwrap_or(origin),
        destination: estimate.destination_formatted.unwrap_or(destination),
    })
}

#[async_trait]
impl DistanceProvider for ClaudeEstimator {
    fn name(&self) -> &'static str {
        "claude-estimate"
    }

    #[instrument(name = "claude.distance", skip_all, fields(%mode))]
    async fn distance(
        &self,
        origin: &LocationInput,
        destination: &LocationInput,
        mode: TransportMode,
    ) -> Result<DistanceResult, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("Anthropic API key"))?;

        let origin = origin.label();
        let destination = destination.label();
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [UserMessage {
                role: "user",
                content: prompt(&origin, &destination),
            }],
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<MessagesResponse>()
            .await?;

        let text = response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| ProviderError::InvalidResponse("no text content".into()))?;

        parse_estimate(&text, origin, destination, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let text = r#"{"distanceKm": 12.34, "explanation": "short hop",
            "originFormatted": "Brooklyn, NY", "destinationFormatted": "Queens, NY"}"#;

        let result = parse_estimate(
            text,
            "Brooklyn".into(),
            "Queens".into(),
            TransportMode::Walking,
        )
        .unwrap();

        assert_eq!(result.distance_meters, 12_340.0);
        assert_eq!(result.distance_text, "12.3 km (estimated)");
        assert!((result.duration_seconds - 12.34 / 5.0 * 3600.0).abs() < 1e-6);
        assert_eq!(result.origin, "Brooklyn, NY");
        assert_eq!(result.destination, "Queens, NY");
    }

    #[test]
    fn falls_back_to_input_labels_and_strips_fences() {
        let text = "```json\n{\"distanceKm\": 60}\n```";

        let result =
            parse_estimate(text, "1, 2".into(), "3, 4".into(), TransportMode::Pigeon).unwrap();

        assert_eq!(result.duration_seconds, 3600.0);
        assert_eq!(result.origin, "1, 2");
        assert_eq!(result.destination, "3, 4");
    }

    #[test]
    fn rejects_prose_and_negative_distances() {
        assert!(matches!(
            parse_estimate("About 5 km.", "a".into(), "b".into(), TransportMode::Walking),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_estimate(
                r#"{"distanceKm": -3}"#,
                "a".into(),
                "b".into(),
                TransportMode::Walking
            ),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn prompt_names_both_places() {
        let prompt = prompt("Lisbon", "38.7, -9.1");
        assert!(prompt.contains("Origin: Lisbon"));
        assert!(prompt.contains("Destination: 38.7, -9.1"));
        assert!(prompt.contains("\"distanceKm\""));
    }

    #[test]
    fn content_blocks_ignore_unknown_types() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content": [{"type": "thinking", "thinking": "hm"}, {"type": "text", "text": "{}"}]}"#,
        )
        .unwrap();
        assert!(matches!(response.content[0], ContentBlock::Other));
        assert!(matches!(&response.content[1], ContentBlock::Text { text } if text == "{}"));
    }
}
