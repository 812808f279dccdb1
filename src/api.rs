//! JSON handlers for the distance and email endpoints.

use crate::location::LocationInput;
use crate::registry::MAX_DELIVERY;
use crate::resolver::ResolveError;
use crate::server::AppState;
use crate::{JobRequest, Status, TransportMode};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

static EMAIL_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{error}")]
    BadRequest {
        error: &'static str,
        message: Option<String>,
    },
    #[error("{error}: {message}")]
    NotFound {
        error: &'static str,
        message: String,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl ApiError {
    fn bad_request(error: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            error,
            message: Some(message.into()),
        }
    }

    fn missing_fields(message: &str) -> Self {
        Self::bad_request("Missing required fields", message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid request body", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest { error, message } => (StatusCode::BAD_REQUEST, error, message),
            ApiError::NotFound { error, message } => (StatusCode::NOT_FOUND, error, Some(message)),
            ApiError::Resolve(err) => {
                error!(
                    message = "Distance calculation failed",
                    primary = %err.primary,
                    fallback = %err.fallback
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Calculation failed",
                    Some(err.to_string()),
                )
            }
        };

        let mut body = json!({ "success": false, "error": error });
        if let Some(message) = message {
            body["message"] = Value::String(message);
        }
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub origin: Option<LocationInput>,
    pub destination: Option<LocationInput>,
    pub mode: Option<String>,
}

fn locations(
    origin: Option<LocationInput>,
    destination: Option<LocationInput>,
) -> Result<(LocationInput, LocationInput), ApiError> {
    let (Some(origin), Some(destination)) = (origin, destination) else {
        return Err(ApiError::missing_fields(
            "Both origin and destination are required",
        ));
    };
    if !origin.is_valid() || !destination.is_valid() {
        return Err(ApiError::bad_request(
            "Invalid location format",
            "Locations must have either an address or lat/lng coordinates",
        ));
    }
    Ok((origin, destination))
}

fn transport_mode(mode: Option<&str>) -> Result<TransportMode, ApiError> {
    let mode = mode.filter(|m| !m.is_empty()).ok_or_else(|| {
        ApiError::bad_request(
            "Missing transport mode",
            format!("mode is required ({})", TransportMode::names()),
        )
    })?;
    mode.parse().map_err(|_| {
        ApiError::bad_request(
            "Invalid transport mode",
            format!("mode must be one of: {}", TransportMode::names()),
        )
    })
}

pub async fn calculate(
    State(state): State<AppState>,
    body: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let (origin, destination) = locations(request.origin, request.destination)?;
    let mode = transport_mode(request.mode.as_deref())?;

    let estimate = state.resolver.estimate(&origin, &destination, mode).await?;
    Ok(ok(estimate))
}

pub async fn calculate_all(
    State(state): State<AppState>,
    body: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let (origin, destination) = locations(request.origin, request.destination)?;

    let estimates = state.resolver.estimate_all(&origin, &destination).await?;
    Ok(ok(estimates))
}

pub async fn distance_health() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Distance calculation service is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub transport_mode: Option<String>,
    pub delivery_time_seconds: Option<f64>,
    pub speed_multiplier: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailResponse {
    pub job_id: String,
    pub status: Status,
    pub transport_mode: TransportMode,
    pub estimated_delivery_time: f64,
    pub original_delivery_time: f64,
    pub speed_multiplier: f64,
    pub message: String,
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

impl SendEmailRequest {
    fn validate(self) -> Result<(JobRequest, f64, f64), ApiError> {
        let (Some(from), Some(to), Some(subject), Some(message), Some(delivery_time)) = (
            required(self.from),
            required(self.to),
            required(self.subject),
            required(self.message),
            self.delivery_time_seconds,
        ) else {
            return Err(ApiError::missing_fields(
                "from, to, subject, message, transportMode and deliveryTimeSeconds are required",
            ));
        };
        let transport_mode = transport_mode(self.transport_mode.as_deref())?;

        if !EMAIL_ADDRESS.is_match(&from) || !EMAIL_ADDRESS.is_match(&to) {
            return Err(ApiError::BadRequest {
                error: "Invalid email format",
                message: None,
            });
        }
        if !delivery_time.is_finite() || delivery_time < 0.0 {
            return Err(ApiError::bad_request(
                "Invalid delivery time",
                "deliveryTimeSeconds must be a non-negative number",
            ));
        }
        let multiplier = self.speed_multiplier.unwrap_or(1.0);
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ApiError::bad_request(
                "Invalid speed multiplier",
                "speedMultiplier must be a positive number",
            ));
        }
        let estimated = delivery_time / multiplier;
        if estimated > MAX_DELIVERY.as_secs_f64() {
            return Err(ApiError::bad_request(
                "Invalid delivery time",
                format!(
                    "delivery may take at most {} seconds",
                    MAX_DELIVERY.as_secs()
                ),
            ));
        }

        let request = JobRequest {
            from,
            to,
            subject,
            message,
            transport_mode,
            delivery_time_seconds: estimated,
        };
        Ok((request, delivery_time, multiplier))
    }
}

pub async fn send_email(
    State(state): State<AppState>,
    body: Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body?;
    let (request, original, multiplier) = request.validate()?;

    let job = state.registry.submit(request);
    info!(job_id = %job.id, multiplier, "Scheduled letter");

    Ok(ok(SendEmailResponse {
        message: format!("Your letter is on its way by {}", job.transport_mode),
        job_id: job.id,
        status: job.status,
        transport_mode: job.transport_mode,
        estimated_delivery_time: job.delivery_time_seconds,
        original_delivery_time: original,
        speed_multiplier: multiplier,
    }))
}

pub async fn email_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registry
        .get(&job_id)
        .map(ok)
        .ok_or_else(|| ApiError::NotFound {
            error: "Job not found",
            message: format!("No email job with id {job_id}"),
        })
}

pub async fn email_jobs(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.registry.list())
}

pub async fn email_health(State(state): State<AppState>) -> impl IntoResponse {
    match state.mailer.verify().await {
        Ok(ready) => {
            let message = if ready {
                "Email service is configured and ready"
            } else {
                "Email service configuration issue"
            };
            (
                StatusCode::OK,
                Json(json!({ "success": ready, "message": message })),
            )
        }
        Err(err) => {
            error!(message = "Email health check failed", error = %err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Email service health check failed",
                })),
            )
        }
    }
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "SnailMail Backend API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /api/distance/health",
            "calculate": "POST /api/distance/calculate",
            "calculateAll": "POST /api/distance/calculate-all",
            "sendEmail": "POST /api/email/send",
            "emailStatus": "GET /api/email/status/:jobId",
            "emailJobs": "GET /api/email/jobs",
            "emailHealth": "GET /api/email/health",
        },
    }))
}
