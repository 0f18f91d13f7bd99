//! World Air Quality Index (aqicn.org) feed client.
//!
//! The feed reports the current AQI for a monitoring station, looked up
//! either by station identifier / city name or by `geo:{lat};{lon}`.
//!
//! # API Reference
//!
//! See: <https://aqicn.org/json-api/doc/>
//!
//! # Response shape
//!
//! ```json
//! {
//!     "status": "ok",
//!     "data": {
//!         "aqi": 57,
//!         "dominentpol": "pm25",
//!         "iaqi": { "pm25": { "v": 57 }, "pm10": { "v": 22 } },
//!         "time": { "s": "2024-03-01 08:00:00", "tz": "+08:00" },
//!         "city": { "name": "Shanghai" }
//!     }
//! }
//! ```
//!
//! On failure `status` is `"error"` and `data` is a plain message string.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, warn};

use super::round_half_up;
use crate::error::ProviderError;
use crate::model::AirQualityReading;

/// Base URL for the aqicn API.
const AQICN_API_BASE: &str = "https://api.waqi.info";

/// Provider name used in errors and logs.
const PROVIDER: &str = "aqicn";

/// Value of `status` on a successful response.
const SUCCESS_STATUS: &str = "ok";

/// Pollutant assumed when the feed does not name one.
const DEFAULT_POLLUTANT: &str = "pm25";

/// Client for the aqicn air-quality feed.
#[derive(Clone)]
pub struct AqicnClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl AqicnClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `token` - API token, sent as the `token` query parameter
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(AQICN_API_BASE, token)
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Fetch the current reading for a station identifier or city name.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = AqicnClient::new("demo");
    /// let reading = client.get_by_station("shanghai").await?;
    /// ```
    pub async fn get_by_station(
        &self,
        identifier: &str,
    ) -> Result<AirQualityReading, ProviderError> {
        self.fetch_feed(&urlencoding::encode(identifier)).await
    }

    /// Fetch the current reading for the station nearest to a coordinate pair.
    pub async fn get_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<AirQualityReading, ProviderError> {
        self.fetch_feed(&format!("geo:{};{}", latitude, longitude))
            .await
    }

    async fn fetch_feed(&self, target: &str) -> Result<AirQualityReading, ProviderError> {
        let url = format!(
            "{}/feed/{}/?token={}",
            self.base_url,
            target,
            urlencoding::encode(&self.token)
        );
        debug!(target = %target, "Fetching aqicn feed");

        let result = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ProviderError::transport(PROVIDER, e))?;
            let envelope = response
                .json::<AqicnEnvelope>()
                .await
                .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;
            normalize_envelope(envelope)
        }
        .await;

        if let Err(e) = &result {
            warn!(target = %target, error = %e, "aqicn feed request failed");
        }
        result
    }
}

// ============================================================================
// Response types
// ============================================================================

/// Outer response wrapper; `data` is only a feed when `status` is "ok".
#[derive(Debug, Deserialize)]
pub struct AqicnEnvelope {
    pub status: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Feed body of a successful response.
#[derive(Debug, Deserialize)]
pub struct AqicnFeed {
    /// Numeric AQI, or "-" when the station has no current value.
    pub aqi: serde_json::Value,

    /// Individual pollutant sub-indices.
    #[serde(default)]
    pub iaqi: AqicnIaqi,

    /// Dominant pollutant (the feed's own spelling).
    #[serde(default)]
    pub dominentpol: Option<String>,

    pub time: AqicnTime,
    pub city: AqicnCity,
}

#[derive(Debug, Default, Deserialize)]
pub struct AqicnIaqi {
    #[serde(default)]
    pub pm25: Option<AqicnSample>,
    #[serde(default)]
    pub pm10: Option<AqicnSample>,
}

#[derive(Debug, Deserialize)]
pub struct AqicnSample {
    #[serde(default)]
    pub v: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AqicnTime {
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub s: String,
    /// Station offset, e.g. "+08:00".
    #[serde(default)]
    pub tz: Option<String>,
    /// RFC 3339 timestamp, when the feed supplies one.
    #[serde(default)]
    pub iso: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AqicnCity {
    pub name: String,
}

impl AqicnSample {
    fn value(sample: &Option<AqicnSample>) -> f64 {
        sample.as_ref().and_then(|s| s.v).unwrap_or(0.0)
    }
}

/// Check the success sentinel and normalize the feed into a reading.
pub fn normalize_envelope(envelope: AqicnEnvelope) -> Result<AirQualityReading, ProviderError> {
    if envelope.status != SUCCESS_STATUS {
        return Err(ProviderError::Status {
            provider: PROVIDER,
            status: envelope.status,
            reason: envelope.data.as_str().map(str::to_string),
        });
    }

    let feed: AqicnFeed = serde_json::from_value(envelope.data)
        .map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))?;
    normalize_feed(feed)
}

/// Normalize a successful feed body into a reading.
pub fn normalize_feed(feed: AqicnFeed) -> Result<AirQualityReading, ProviderError> {
    let raw_index = feed.aqi.as_f64().ok_or_else(|| {
        ProviderError::malformed(PROVIDER, format!("non-numeric aqi {}", feed.aqi))
    })?;
    if !raw_index.is_finite() || raw_index < 0.0 {
        return Err(ProviderError::malformed(
            PROVIDER,
            format!("aqi out of range: {raw_index}"),
        ));
    }

    let dominant_pollutant = feed
        .dominentpol
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_POLLUTANT.to_string());
    let observed_at = parse_observation_time(&feed.time)?;

    Ok(AirQualityReading::new(
        round_half_up(raw_index) as u32,
        AqicnSample::value(&feed.iaqi.pm25),
        AqicnSample::value(&feed.iaqi.pm10),
        dominant_pollutant,
        observed_at,
        feed.city.name,
    ))
}

/// Prefer the RFC 3339 field, then local time plus offset, then local time as UTC.
fn parse_observation_time(time: &AqicnTime) -> Result<DateTime<FixedOffset>, ProviderError> {
    if let Some(iso) = &time.iso {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(iso) {
            return Ok(parsed);
        }
    }

    if let Some(tz) = &time.tz {
        if let Ok(parsed) =
            DateTime::parse_from_str(&format!("{} {}", time.s, tz), "%Y-%m-%d %H:%M:%S %:z")
        {
            return Ok(parsed);
        }
    }

    NaiveDateTime::parse_from_str(&time.s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|e| {
            ProviderError::malformed(PROVIDER, format!("bad observation time {:?}: {e}", time.s))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> AqicnEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_normalize_full_feed() {
        let reading = normalize_envelope(envelope(json!({
            "status": "ok",
            "data": {
                "aqi": 57,
                "dominentpol": "pm10",
                "iaqi": { "pm25": { "v": 57.0 }, "pm10": { "v": 22.5 } },
                "time": { "s": "2024-03-01 08:00:00", "tz": "+08:00" },
                "city": { "name": "Shanghai" }
            }
        })))
        .unwrap();

        assert_eq!(reading.index(), 57);
        assert_eq!(reading.severity(), Severity::Moderate);
        assert_eq!(reading.pm25(), 57.0);
        assert_eq!(reading.pm10(), 22.5);
        assert_eq!(reading.dominant_pollutant(), "pm10");
        assert_eq!(reading.location_name(), "Shanghai");
        assert_eq!(
            reading.observed_at(),
            DateTime::parse_from_rfc3339("2024-03-01T08:00:00+08:00").unwrap()
        );
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let reading = normalize_envelope(envelope(json!({
            "status": "ok",
            "data": {
                "aqi": 12,
                "time": { "s": "2024-03-01 08:00:00" },
                "city": { "name": "Reykjavik" }
            }
        })))
        .unwrap();

        assert_eq!(reading.pm25(), 0.0);
        assert_eq!(reading.pm10(), 0.0);
        assert_eq!(reading.dominant_pollutant(), "pm25");
        assert_eq!(reading.observed_at().offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_empty_dominant_pollutant_defaults() {
        let reading = normalize_envelope(envelope(json!({
            "status": "ok",
            "data": {
                "aqi": 12,
                "dominentpol": "",
                "time": { "s": "2024-03-01 08:00:00", "iso": "2024-03-01T08:00:00-05:00" },
                "city": { "name": "Boston" }
            }
        })))
        .unwrap();

        assert_eq!(reading.dominant_pollutant(), "pm25");
        assert_eq!(reading.observed_at().offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_error_status_is_provider_error() {
        let err = normalize_envelope(envelope(json!({
            "status": "error",
            "data": "Unknown station"
        })))
        .unwrap_err();

        match err {
            ProviderError::Status { status, reason, .. } => {
                assert_eq!(status, "error");
                assert_eq!(reason.as_deref(), Some("Unknown station"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_index_is_malformed() {
        let err = normalize_envelope(envelope(json!({
            "status": "ok",
            "data": {
                "aqi": "-",
                "time": { "s": "2024-03-01 08:00:00" },
                "city": { "name": "Nowhere" }
            }
        })))
        .unwrap_err();

        assert!(matches!(err, ProviderError::Malformed { .. }));
    }

    #[test]
    fn test_missing_city_is_malformed() {
        let err = normalize_envelope(envelope(json!({
            "status": "ok",
            "data": { "aqi": 10, "time": { "s": "2024-03-01 08:00:00" } }
        })))
        .unwrap_err();

        assert!(matches!(err, ProviderError::Malformed { .. }));
    }

    #[test]
    fn test_severity_matches_classify_for_boundaries() {
        for index in [50, 51, 100, 101, 150, 151, 200, 201] {
            let reading = normalize_envelope(envelope(json!({
                "status": "ok",
                "data": {
                    "aqi": index,
                    "time": { "s": "2024-03-01 08:00:00" },
                    "city": { "name": "Test" }
                }
            })))
            .unwrap();

            assert_eq!(reading.index(), index);
            assert_eq!(reading.severity(), crate::classify::classify(index));
        }
    }
}
