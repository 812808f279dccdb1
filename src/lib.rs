use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod api;
pub mod config;
pub mod courier;
pub mod estimator;
pub mod location;
pub mod mailer;
pub mod registry;
pub mod resolver;
pub mod server;
pub mod telemetry;

/// The whimsical ways a letter can travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    Walking,
    Swimming,
    Pigeon,
    RockClimbing,
}

impl TransportMode {
    pub const ALL: [TransportMode; 4] = [
        TransportMode::Walking,
        TransportMode::Swimming,
        TransportMode::Pigeon,
        TransportMode::RockClimbing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Walking => "walking",
            TransportMode::Swimming => "swimming",
            TransportMode::Pigeon => "pigeon",
            TransportMode::RockClimbing => "rock-climbing",
        }
    }

    /// Nominal speed in km/h.
    pub fn speed_kmh(&self) -> f64 {
        match self {
            TransportMode::Walking => 5.0,
            TransportMode::Swimming => 3.0,
            TransportMode::Pigeon => 60.0,
            TransportMode::RockClimbing => 1.0,
        }
    }

    /// Comma separated list of every mode, for error messages.
    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(TransportMode::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport mode `{0}`")]
pub struct UnknownMode(pub String);

impl FromStr for TransportMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
    pub transport_mode: TransportMode,
    pub delivery_time_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    InTransit,
    Delivered,
    Failed,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::InTransit)
    }
}
