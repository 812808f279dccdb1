//! Turns a resolved distance into a delivery time for a transport mode.

use crate::resolver::{DistanceResult, EstimateMethod};
use crate::TransportMode;
use serde::Serialize;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEstimate {
    pub distance_meters: f64,
    pub distance_text: String,
    pub duration_seconds: f64,
    pub delivery_time_seconds: f64,
    pub delivery_time_text: String,
    pub origin: String,
    pub destination: String,
    pub transport_mode: TransportMode,
    #[serde(rename = "speedKmH")]
    pub speed_kmh: f64,
    pub is_estimate: bool,
    pub method: EstimateMethod,
}

/// Seconds needed to cover `distance_meters` at the nominal speed of `mode`.
pub fn delivery_seconds(distance_meters: f64, mode: TransportMode) -> f64 {
    distance_meters / 1000.0 / mode.speed_kmh() * SECONDS_PER_HOUR as f64
}

pub fn estimate(
    distance: DistanceResult,
    mode: TransportMode,
    method: EstimateMethod,
) -> DeliveryEstimate {
    let delivery_time_seconds = delivery_seconds(distance.distance_meters, mode);
    DeliveryEstimate {
        distance_meters: distance.distance_meters,
        distance_text: distance.distance_text,
        duration_seconds: distance.duration_seconds,
        delivery_time_seconds,
        delivery_time_text: format_delivery_time(delivery_time_seconds),
        origin: distance.origin,
        destination: distance.destination,
        transport_mode: mode,
        speed_kmh: mode.speed_kmh(),
        is_estimate: method.is_estimate(),
        method,
    }
}

struct Breakdown {
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

impl Breakdown {
    fn of(seconds: f64) -> Self {
        let total = if seconds.is_finite() && seconds > 0.0 {
            seconds as u64
        } else {
            0
        };
        Breakdown {
            days: total / SECONDS_PER_DAY,
            hours: (total % SECONDS_PER_DAY) / SECONDS_PER_HOUR,
            minutes: (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
            seconds: total % SECONDS_PER_MINUTE,
        }
    }
}

fn unit(count: u64, name: &str) -> String {
    if count == 1 {
        format!("{count} {name}")
    } else {
        format!("{count} {name}s")
    }
}

/// Coarse format shown next to estimates. Minutes are dropped once the trip
/// takes a day or more.
pub fn format_delivery_time(seconds: f64) -> String {
    let b = Breakdown::of(seconds);
    let mut parts = Vec::new();
    if b.days > 0 {
        parts.push(unit(b.days, "day"));
    }
    if b.hours > 0 {
        parts.push(unit(b.hours, "hour"));
    }
    if b.minutes > 0 && b.days == 0 {
        parts.push(unit(b.minutes, "minute"));
    }

    if parts.is_empty() {
        "< 1 minute".to_string()
    } else {
        parts.join(", ")
    }
}

/// Finer format printed inside delivered letters. Seconds only appear for
/// trips shorter than an hour.
pub fn format_transit_time(seconds: f64) -> String {
    let b = Breakdown::of(seconds);
    let mut parts = Vec::new();
    if b.days > 0 {
        parts.push(unit(b.days, "day"));
    }
    if b.hours > 0 {
        parts.push(unit(b.hours, "hour"));
    }
    if b.minutes > 0 {
        parts.push(unit(b.minutes, "minute"));
    }
    if b.seconds > 0 && b.days == 0 && b.hours == 0 {
        parts.push(unit(b.seconds, "second"));
    }

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(", ")
    }
}
