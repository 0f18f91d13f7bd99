//! Domain types for Airwise.
//!
//! Every reading in this module is a *snapshot*: it is produced whole by a
//! provider adapter and replaced whole on the next refresh. Nothing here is
//! updated field by field.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::classify;

/// Maximum number of hourly points kept for the forecast series (next 24 hours).
pub const MAX_FORECAST_POINTS: usize = 24;

/// Air-quality severity band derived from an AQI value.
///
/// See [`classify`] for the breakpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// AQI 0-50.
    Good,
    /// AQI 51-100.
    Moderate,
    /// AQI 101-150.
    Unhealthy,
    /// AQI 151-200.
    VeryUnhealthy,
    /// AQI above 200.
    Hazardous,
}

/// Current air-quality reading for one location.
///
/// Fields are private so that `severity` can only ever be derived from
/// `index`; construct through [`AirQualityReading::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirQualityReading {
    index: u32,
    pm25: f64,
    pm10: f64,
    dominant_pollutant: String,
    observed_at: DateTime<FixedOffset>,
    location_name: String,
    severity: Severity,
}

impl AirQualityReading {
    pub fn new(
        index: u32,
        pm25: f64,
        pm10: f64,
        dominant_pollutant: impl Into<String>,
        observed_at: DateTime<FixedOffset>,
        location_name: impl Into<String>,
    ) -> Self {
        Self {
            index,
            pm25,
            pm10,
            dominant_pollutant: dominant_pollutant.into(),
            observed_at,
            location_name: location_name.into(),
            severity: classify(index),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// PM2.5 sub-index reported by the station.
    pub fn pm25(&self) -> f64 {
        self.pm25
    }

    /// PM10 sub-index reported by the station.
    pub fn pm10(&self) -> f64 {
        self.pm10
    }

    pub fn dominant_pollutant(&self) -> &str {
        &self.dominant_pollutant
    }

    /// When the station took the measurement, in the station's own offset.
    pub fn observed_at(&self) -> DateTime<FixedOffset> {
        self.observed_at
    }

    pub fn location_name(&self) -> &str {
        &self.location_name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

/// Current weather conditions plus the day's UV peak and sun times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Air temperature in °C, rounded.
    pub temperature: i32,
    /// Apparent temperature in °C, rounded.
    pub feels_like: i32,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Mean sea level pressure, rounded.
    pub pressure_hpa: i32,
    pub wind_speed_kph: i32,
    pub wind_gust_kph: i32,
    /// Direction the wind blows from, in `[0, 360)`.
    pub wind_direction_deg: f64,
    /// Maximum UV index for the day.
    pub uv_index: f64,
    pub visibility_km: f64,
    /// Local sunrise time at the location.
    pub sunrise: NaiveDateTime,
    /// Local sunset time at the location.
    pub sunset: NaiveDateTime,
}

/// One hour of the particulate/temperature forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Local time at the location.
    pub time: NaiveDateTime,
    pub temperature: i32,
    /// Coarse AQI estimate (the feed has no native index).
    pub index: u32,
    pub pm25: f64,
    pub pm10: f64,
}

impl ForecastPoint {
    /// Severity band of the estimated index.
    pub fn severity(&self) -> Severity {
        classify(self.index)
    }
}

/// Highest estimated index across a forecast series, if it is non-empty.
pub fn forecast_peak(points: &[ForecastPoint]) -> Option<u32> {
    points.iter().map(|p| p.index).max()
}

/// A resolved place name for a coordinate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub country: String,
}

impl Location {
    /// Placeholder name used when reverse geocoding is unavailable.
    pub const UNKNOWN: &'static str = "Unknown";

    /// The degraded location: original coordinates, unknown names.
    pub fn unknown(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            city: Self::UNKNOWN.to_string(),
            country: Self::UNKNOWN.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.city == Self::UNKNOWN && self.country == Self::UNKNOWN
    }
}

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single message in the assistant conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique, increasing within one store.
    pub id: u64,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Display theme selected by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Everything the display surfaces read.
///
/// Owned exclusively by [`crate::store::Store`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppState {
    pub air_quality: Option<AirQualityReading>,
    pub weather: Option<WeatherSnapshot>,
    pub forecast: Vec<ForecastPoint>,
    pub location: Option<Location>,
    pub chat_messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_chat_open: bool,
    pub theme: Theme,
}

/// Request body for POST /refresh and POST /forecast.
///
/// Both coordinates must be given together; when absent, the configured
/// default location is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordinatesRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Request body for POST /refresh/station.
#[derive(Debug, Clone, Deserialize)]
pub struct StationRequest {
    /// Station identifier or city name understood by the air-quality provider.
    pub station: String,
}

/// Request body for POST /chat and POST /chat/stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

/// Request body for PUT /theme.
#[derive(Debug, Clone, Deserialize)]
pub struct ThemeRequest {
    pub theme: Theme,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_reading_severity_follows_index() {
        let observed = DateTime::parse_from_rfc3339("2024-03-01T08:00:00+08:00").unwrap();
        let reading = AirQualityReading::new(151, 60.0, 40.0, "pm25", observed, "Shanghai");

        assert_eq!(reading.severity(), Severity::VeryUnhealthy);
        assert_eq!(reading.index(), 151);
        assert_eq!(reading.location_name(), "Shanghai");
    }

    fn point(h: u32, index: u32) -> ForecastPoint {
        ForecastPoint {
            time: hour(h),
            temperature: 10 + h as i32,
            index,
            pm25: index as f64 / 2.0,
            pm10: 50.0,
        }
    }

    #[test]
    fn test_forecast_point_severity_and_peak() {
        let points = vec![point(0, 40), point(1, 120), point(2, 90)];

        assert_eq!(points[0].severity(), Severity::Good);
        assert_eq!(points[1].severity(), Severity::Unhealthy);
        assert_eq!(forecast_peak(&points), Some(120));
        assert_eq!(forecast_peak(&[]), None);
    }

    #[test]
    fn test_unknown_location() {
        let location = Location::unknown(31.2, 121.5);
        assert!(location.is_unknown());
        assert_eq!(location.latitude, 31.2);
        assert_eq!(location.longitude, 121.5);
    }

    #[test]
    fn test_severity_serializes_kebab_case() {
        let json = serde_json::to_string(&Severity::VeryUnhealthy).unwrap();
        assert_eq!(json, "\"very-unhealthy\"");
    }

    #[test]
    fn test_theme_default_is_system() {
        assert_eq!(Theme::default(), Theme::System);
        let theme: Theme = serde_json::from_str("\"dark\"").unwrap();
        assert_eq!(theme, Theme::Dark);
    }
}
