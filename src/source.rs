//! Position sources.
//!
//! [`PositionSource`] is the single-fetch contract the orbit interpolator
//! depends on. [`HttpPositionSource`] implements it over a list of public
//! endpoints, tried in order, accepting either the wheretheiss.at or the
//! open-notify response schema.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::fix::Fix;

/// One remote position lookup.
pub trait PositionSource: Send + Sync {
    /// Fetch the current position. Must return within a bounded time.
    fn fetch(&self) -> Result<Fix, FetchError>;
}

// =============================================================================
// Response Schemas
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    fn value(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
struct OpenNotifyPosition {
    latitude: Number,
    longitude: Number,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    /// `{"iss_position": {"latitude": "51.1", "longitude": "-0.2"}, "timestamp": 1700000000}`
    OpenNotify { iss_position: OpenNotifyPosition, timestamp: Option<i64> },
    /// `{"latitude": 51.1, "longitude": -0.2, "altitude": 420.1, "velocity": 27600.3, "timestamp": 1700000000}`
    WhereTheIss {
        latitude: Number,
        longitude: Number,
        altitude: Option<Number>,
        velocity: Option<Number>,
        timestamp: Option<i64>,
    },
}

/// Decode a response body into a fix. `now` stands in for a missing timestamp.
pub fn parse_payload(
    url: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<Fix, FetchError> {
    let parse_err = |message: String| FetchError::Parse { url: url.to_string(), message };

    let payload: Payload = serde_json::from_str(body).map_err(|e| parse_err(e.to_string()))?;
    let (lat, lon, altitude, velocity, timestamp) = match payload {
        Payload::OpenNotify { iss_position, timestamp } => {
            (iss_position.latitude.value(), iss_position.longitude.value(), None, None, timestamp)
        }
        Payload::WhereTheIss { latitude, longitude, altitude, velocity, timestamp } => (
            latitude.value(),
            longitude.value(),
            altitude.and_then(|a| a.value()),
            velocity.and_then(|v| v.value()),
            timestamp,
        ),
    };

    let (Some(latitude), Some(longitude)) = (lat, lon) else {
        return Err(parse_err("latitude/longitude are not numbers".into()));
    };
    let observed_at = timestamp.and_then(|ts| DateTime::from_timestamp(ts, 0)).unwrap_or(now);

    let fix = Fix {
        latitude,
        longitude,
        altitude_km: altitude.filter(|a| a.is_finite() && *a > 0.0),
        speed_kmh: velocity.filter(|v| v.is_finite() && *v > 0.0),
        observed_at,
    };
    if !fix.is_plausible() {
        return Err(parse_err(format!("position out of range: {latitude}, {longitude}")));
    }
    Ok(fix)
}

// =============================================================================
// HTTP Source
// =============================================================================

/// Blocking HTTP source over an ordered endpoint list.
pub struct HttpPositionSource {
    agent: ureq::Agent,
    endpoints: Vec<String>,
}

impl HttpPositionSource {
    pub fn new(
        endpoints: Vec<String>,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("iss-globe/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, endpoints }
    }

    fn fetch_one(
        &self,
        url: &str,
    ) -> Result<Fix, FetchError> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => return Err(FetchError::Status { url: url.to_string(), status }),
            Err(e) => return Err(FetchError::Network { url: url.to_string(), message: e.to_string() }),
        };
        let body = response
            .into_string()
            .map_err(|e| FetchError::Network { url: url.to_string(), message: e.to_string() })?;
        parse_payload(url, &body, Utc::now())
    }
}

impl PositionSource for HttpPositionSource {
    fn fetch(&self) -> Result<Fix, FetchError> {
        if self.endpoints.is_empty() {
            return Err(FetchError::NoEndpoints);
        }
        for url in &self.endpoints {
            match self.fetch_one(url) {
                Ok(fix) => {
                    debug!(url, lat = fix.latitude, lon = fix.longitude, "position fetched");
                    return Ok(fix);
                }
                Err(e) => warn!(error = %e, "position endpoint failed"),
            }
        }
        Err(FetchError::AllFailed(self.endpoints.len()))
    }
}
