//! Open-Meteo client: current weather, hourly air-quality forecast and
//! reverse geocoding.
//!
//! No authentication is required. All three endpoints live on different
//! hosts, so each has its own base URL.
//!
//! # API Reference
//!
//! See: <https://open-meteo.com/en/docs> and
//! <https://open-meteo.com/en/docs/air-quality-api>

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::round_half_up;
use crate::error::ProviderError;
use crate::model::{ForecastPoint, Location, MAX_FORECAST_POINTS, WeatherSnapshot};

/// Base URL for the weather forecast API.
const WEATHER_API_BASE: &str = "https://api.open-meteo.com/v1";

/// Base URL for the air-quality forecast API.
const AIR_QUALITY_API_BASE: &str = "https://air-quality-api.open-meteo.com/v1";

/// Base URL for the geocoding API.
const GEOCODING_API_BASE: &str = "https://geocoding-api.open-meteo.com/v1";

const WEATHER_PROVIDER: &str = "open-meteo";
const GEOCODING_PROVIDER: &str = "open-meteo-geocoding";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,pressure_msl,wind_speed_10m,wind_gusts_10m,wind_direction_10m";
const DAILY_FIELDS: &str = "sunrise,sunset,uv_index_max";
const HOURLY_FIELDS: &str = "temperature_2m,pm2_5,pm10";

/// Number of forecast days requested; only the first 24 hours are kept.
const FORECAST_DAYS: &str = "2";

/// The weather feed has no visibility field; this is reported instead.
const DEFAULT_VISIBILITY_KM: f64 = 10.0;

/// Open-Meteo local time format (`timezone=auto`).
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Client for the Open-Meteo family of APIs.
#[derive(Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    weather_base_url: String,
    air_quality_base_url: String,
    geocoding_base_url: String,
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoClient {
    /// Create a new client with the public endpoints.
    pub fn new() -> Self {
        Self::with_base_urls(WEATHER_API_BASE, AIR_QUALITY_API_BASE, GEOCODING_API_BASE)
    }

    /// Create a client with custom base URLs (for testing).
    pub fn with_base_urls(weather: &str, air_quality: &str, geocoding: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            weather_base_url: weather.trim_end_matches('/').to_string(),
            air_quality_base_url: air_quality.trim_end_matches('/').to_string(),
            geocoding_base_url: geocoding.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch current conditions and today's UV peak and sun times.
    pub async fn get_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let url = format!("{}/forecast", self.weather_base_url);
        let query = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("daily", DAILY_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
        ];

        let result = async {
            let response: ForecastResponse = self.get_json(WEATHER_PROVIDER, &url, &query).await?;
            normalize_weather(response)
        }
        .await;

        if let Err(e) = &result {
            warn!(latitude, longitude, error = %e, "Weather request failed");
        }
        result
    }

    /// Fetch the hourly particulate/temperature series for the next 24 hours.
    pub async fn get_hourly_forecast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<ForecastPoint>, ProviderError> {
        let url = format!("{}/air-quality", self.air_quality_base_url);
        let query = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("forecast_days", FORECAST_DAYS.to_string()),
            ("timezone", "auto".to_string()),
        ];

        let result = async {
            let response: AirQualityResponse =
                self.get_json(WEATHER_PROVIDER, &url, &query).await?;
            normalize_forecast(response.hourly)
        }
        .await;

        if let Err(e) = &result {
            warn!(latitude, longitude, error = %e, "Hourly forecast request failed");
        }
        result
    }

    /// Resolve a coordinate pair to a city and country.
    ///
    /// Never fails: any transport or payload problem degrades to
    /// [`Location::unknown`] with the original coordinates.
    pub async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Location {
        let url = format!("{}/reverse", self.geocoding_base_url);
        let query = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("format", "json".to_string()),
        ];

        match self
            .get_json::<GeocodeResponse>(GEOCODING_PROVIDER, &url, &query)
            .await
        {
            Ok(response) => normalize_location(response, latitude, longitude),
            Err(e) => {
                warn!(
                    latitude,
                    longitude,
                    error = %e,
                    "Reverse geocoding degraded to unknown location"
                );
                Location::unknown(latitude, longitude)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        provider: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        debug!(provider, url, "Fetching Open-Meteo resource");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(provider, e))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<OpenMeteoError>(&body)
                .ok()
                .map(|e| e.reason);
            return Err(ProviderError::Status {
                provider,
                status: status.as_u16().to_string(),
                reason,
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::malformed(provider, e.to_string()))
    }
}

// ============================================================================
// Response types
// ============================================================================

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
struct OpenMeteoError {
    reason: String,
}

/// Response from the `/forecast` endpoint.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    pub current: CurrentConditions,
    pub daily: DailySummary,
}

#[derive(Debug, Deserialize)]
pub struct CurrentConditions {
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub apparent_temperature: f64,
    pub pressure_msl: f64,
    pub wind_speed_10m: f64,
    pub wind_gusts_10m: f64,
    pub wind_direction_10m: f64,
}

/// Daily aggregates; index 0 is today.
#[derive(Debug, Deserialize)]
pub struct DailySummary {
    #[serde(default)]
    pub sunrise: Vec<String>,
    #[serde(default)]
    pub sunset: Vec<String>,
    #[serde(default)]
    pub uv_index_max: Vec<Option<f64>>,
}

/// Response from the `/air-quality` endpoint.
#[derive(Debug, Deserialize)]
pub struct AirQualityResponse {
    pub hourly: HourlySeries,
}

/// Parallel hourly arrays; samples may be null or the array may be missing.
#[derive(Debug, Deserialize)]
pub struct HourlySeries {
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub pm2_5: Vec<Option<f64>>,
    #[serde(default)]
    pub pm10: Vec<Option<f64>>,
}

/// Response from the `/reverse` geocoding endpoint.
#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResult {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Normalize a `/forecast` response into a weather snapshot.
pub fn normalize_weather(response: ForecastResponse) -> Result<WeatherSnapshot, ProviderError> {
    let current = response.current;
    let daily = response.daily;

    let sunrise = first_local_time(&daily.sunrise, "sunrise")?;
    let sunset = first_local_time(&daily.sunset, "sunset")?;
    let uv_index = daily.uv_index_max.first().copied().flatten().unwrap_or(0.0);

    Ok(WeatherSnapshot {
        temperature: round_half_up(current.temperature_2m) as i32,
        feels_like: round_half_up(current.apparent_temperature) as i32,
        humidity: current.relative_humidity_2m,
        pressure_hpa: round_half_up(current.pressure_msl) as i32,
        wind_speed_kph: round_half_up(current.wind_speed_10m) as i32,
        wind_gust_kph: round_half_up(current.wind_gusts_10m) as i32,
        wind_direction_deg: current.wind_direction_10m.rem_euclid(360.0),
        uv_index,
        visibility_km: DEFAULT_VISIBILITY_KM,
        sunrise,
        sunset,
    })
}

/// Normalize the hourly series, keeping at most the first 24 hours.
pub fn normalize_forecast(series: HourlySeries) -> Result<Vec<ForecastPoint>, ProviderError> {
    series
        .time
        .iter()
        .take(MAX_FORECAST_POINTS)
        .enumerate()
        .map(|(i, time)| {
            let pm25 = sample(&series.pm2_5, i);
            Ok(ForecastPoint {
                time: parse_local_time(time, "hourly time")?,
                temperature: round_half_up(sample(&series.temperature_2m, i)) as i32,
                index: round_half_up(pm25 * 2.0).max(0.0) as u32,
                pm25: round_half_up(pm25),
                pm10: round_half_up(sample(&series.pm10, i)),
            })
        })
        .collect()
}

/// Pick the first result; missing names fall back to "Unknown" individually.
pub fn normalize_location(response: GeocodeResponse, latitude: f64, longitude: f64) -> Location {
    let Some(result) = response.results.into_iter().next() else {
        warn!(latitude, longitude, "Reverse geocoding returned no results");
        return Location::unknown(latitude, longitude);
    };

    let non_empty = |value: Option<String>| {
        value
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Location::UNKNOWN.to_string())
    };

    Location {
        latitude,
        longitude,
        city: non_empty(result.name),
        country: non_empty(result.country),
    }
}

fn sample(values: &[Option<f64>], i: usize) -> f64 {
    values.get(i).copied().flatten().unwrap_or(0.0)
}

fn first_local_time(values: &[String], field: &str) -> Result<NaiveDateTime, ProviderError> {
    let value = values.first().ok_or_else(|| {
        ProviderError::malformed(WEATHER_PROVIDER, format!("missing daily {field}"))
    })?;
    parse_local_time(value, field)
}

fn parse_local_time(value: &str, field: &str) -> Result<NaiveDateTime, ProviderError> {
    NaiveDateTime::parse_from_str(value, LOCAL_TIME_FORMAT).map_err(|e| {
        ProviderError::malformed(WEATHER_PROVIDER, format!("bad {field} {value:?}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forecast_response(value: serde_json::Value) -> ForecastResponse {
        serde_json::from_value(value).unwrap()
    }

    fn weather_payload() -> serde_json::Value {
        json!({
            "current": {
                "temperature_2m": 21.5,
                "relative_humidity_2m": 64.0,
                "apparent_temperature": 20.4,
                "pressure_msl": 1013.6,
                "wind_speed_10m": 12.5,
                "wind_gusts_10m": 24.49,
                "wind_direction_10m": 225.0
            },
            "daily": {
                "sunrise": ["2024-03-01T06:21", "2024-03-02T06:20"],
                "sunset": ["2024-03-01T17:58", "2024-03-02T17:59"],
                "uv_index_max": [4.35, 5.1]
            }
        })
    }

    #[test]
    fn test_normalize_weather_rounds_fields() {
        let weather = normalize_weather(forecast_response(weather_payload())).unwrap();

        assert_eq!(weather.temperature, 22);
        assert_eq!(weather.feels_like, 20);
        assert_eq!(weather.humidity, 64.0);
        assert_eq!(weather.pressure_hpa, 1014);
        assert_eq!(weather.wind_speed_kph, 13);
        assert_eq!(weather.wind_gust_kph, 24);
        assert_eq!(weather.wind_direction_deg, 225.0);
        assert_eq!(weather.uv_index, 4.35);
        assert_eq!(weather.visibility_km, 10.0);
        assert_eq!(weather.sunrise.to_string(), "2024-03-01 06:21:00");
        assert_eq!(weather.sunset.to_string(), "2024-03-01 17:58:00");
    }

    #[test]
    fn test_normalize_weather_wraps_direction() {
        let mut payload = weather_payload();
        payload["current"]["wind_direction_10m"] = json!(360.0);

        let weather = normalize_weather(forecast_response(payload)).unwrap();
        assert_eq!(weather.wind_direction_deg, 0.0);
    }

    #[test]
    fn test_normalize_weather_missing_sunrise_is_malformed() {
        let mut payload = weather_payload();
        payload["daily"]["sunrise"] = json!([]);

        let err = normalize_weather(forecast_response(payload)).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }

    #[test]
    fn test_normalize_weather_null_uv_defaults_to_zero() {
        let mut payload = weather_payload();
        payload["daily"]["uv_index_max"] = json!([null]);

        let weather = normalize_weather(forecast_response(payload)).unwrap();
        assert_eq!(weather.uv_index, 0.0);
    }

    #[test]
    fn test_normalize_forecast_truncates_to_24_in_order() {
        let times: Vec<String> = (0..48)
            .map(|h| format!("2024-03-{:02}T{:02}:00", 1 + h / 24, h % 24))
            .collect();
        let pm25: Vec<f64> = (0..48).map(|h| h as f64).collect();
        let series: HourlySeries = serde_json::from_value(json!({
            "time": times,
            "temperature_2m": vec![15.0; 48],
            "pm2_5": pm25,
            "pm10": vec![30.0; 48]
        }))
        .unwrap();

        let points = normalize_forecast(series).unwrap();

        assert_eq!(points.len(), 24);
        assert!(points.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(points[0].time.to_string(), "2024-03-01 00:00:00");
        assert_eq!(points[23].time.to_string(), "2024-03-01 23:00:00");
        assert_eq!(points[10].pm25, 10.0);
        assert_eq!(points[10].index, 20);
    }

    #[test]
    fn test_normalize_forecast_defaults_missing_samples() {
        let series: HourlySeries = serde_json::from_value(json!({
            "time": ["2024-03-01T00:00", "2024-03-01T01:00"],
            "pm2_5": [12.3, null],
            "pm10": [20.0]
        }))
        .unwrap();

        let points = normalize_forecast(series).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].temperature, 0);
        assert_eq!(points[0].index, 25);
        assert_eq!(points[0].pm25, 12.0);
        assert_eq!(points[1].index, 0);
        assert_eq!(points[1].pm25, 0.0);
        assert_eq!(points[1].pm10, 0.0);
    }

    #[test]
    fn test_normalize_location() {
        let response: GeocodeResponse = serde_json::from_value(json!({
            "results": [{ "name": "Lisbon", "country": "Portugal" }]
        }))
        .unwrap();

        let location = normalize_location(response, 38.7, -9.1);
        assert_eq!(location.city, "Lisbon");
        assert_eq!(location.country, "Portugal");
        assert_eq!(location.latitude, 38.7);
    }

    #[test]
    fn test_normalize_location_partial_and_empty() {
        let partial: GeocodeResponse = serde_json::from_value(json!({
            "results": [{ "name": "Atlantis" }]
        }))
        .unwrap();
        let location = normalize_location(partial, 0.0, 0.0);
        assert_eq!(location.city, "Atlantis");
        assert_eq!(location.country, "Unknown");

        let empty: GeocodeResponse = serde_json::from_value(json!({})).unwrap();
        assert!(normalize_location(empty, 1.0, 2.0).is_unknown());
    }

    #[tokio::test]
    async fn test_reverse_geocode_degrades_on_transport_failure() {
        // Nothing listens on port 1.
        let client = OpenMeteoClient::with_base_urls(
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
        );

        let location = client.reverse_geocode(48.85, 2.35).await;

        assert_eq!(location, Location::unknown(48.85, 2.35));
    }

    #[tokio::test]
    async fn test_weather_transport_failure_is_error() {
        let client = OpenMeteoClient::with_base_urls(
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
        );

        let err = client.get_weather(48.85, 2.35).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport { .. }));
        assert!(err.is_retryable());
    }
}
