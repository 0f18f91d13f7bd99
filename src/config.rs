//! Runtime configuration, read once from the environment at startup.
//!
//! Every setting has a default, so the service starts with no environment at
//! all; without a Gemini key the assistant simply answers from its heuristics.

use std::env;
use std::time::Duration;

use crate::assistant::DEFAULT_WORD_DELAY;
use crate::data_sources::gemini::GEMINI_API_URL;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Token accepted by the public aqicn demo endpoint.
const DEFAULT_AQICN_TOKEN: &str = "demo";

const DEFAULT_AQICN_BASE_URL: &str = "https://api.waqi.info";
const DEFAULT_WEATHER_BASE_URL: &str = "https://api.open-meteo.com/v1";
const DEFAULT_AIR_QUALITY_BASE_URL: &str = "https://air-quality-api.open-meteo.com/v1";
const DEFAULT_GEOCODING_BASE_URL: &str = "https://geocoding-api.open-meteo.com/v1";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub aqicn_token: String,
    pub aqicn_base_url: String,
    pub weather_base_url: String,
    pub air_quality_base_url: String,
    pub geocoding_base_url: String,
    /// Without a key, the assistant runs offline.
    pub gemini_api_key: Option<String>,
    pub gemini_endpoint: String,
    /// Delay after each word of a streamed answer.
    pub stream_delay: Duration,
    /// Coordinates used when a refresh request carries none.
    pub default_coordinates: Option<(f64, f64)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            aqicn_token: DEFAULT_AQICN_TOKEN.to_string(),
            aqicn_base_url: DEFAULT_AQICN_BASE_URL.to_string(),
            weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
            air_quality_base_url: DEFAULT_AIR_QUALITY_BASE_URL.to_string(),
            geocoding_base_url: DEFAULT_GEOCODING_BASE_URL.to_string(),
            gemini_api_key: None,
            gemini_endpoint: GEMINI_API_URL.to_string(),
            stream_delay: DEFAULT_WORD_DELAY,
            default_coordinates: None,
        }
    }
}

impl Config {
    /// Load configuration from `AIRWISE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let port = lookup("AIRWISE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let stream_delay = lookup("AIRWISE_STREAM_DELAY_MS")
            .and_then(|ms| ms.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.stream_delay);

        let coordinate = |key: &str| lookup(key).and_then(|v| v.parse::<f64>().ok());
        let default_coordinates = coordinate("AIRWISE_DEFAULT_LATITUDE")
            .zip(coordinate("AIRWISE_DEFAULT_LONGITUDE"));

        Self {
            port,
            aqicn_token: string("AIRWISE_AQICN_TOKEN", defaults.aqicn_token),
            aqicn_base_url: string("AIRWISE_AQICN_BASE_URL", defaults.aqicn_base_url),
            weather_base_url: string("AIRWISE_WEATHER_BASE_URL", defaults.weather_base_url),
            air_quality_base_url: string(
                "AIRWISE_AIR_QUALITY_BASE_URL",
                defaults.air_quality_base_url,
            ),
            geocoding_base_url: string("AIRWISE_GEOCODING_BASE_URL", defaults.geocoding_base_url),
            gemini_api_key: lookup("AIRWISE_GEMINI_API_KEY").filter(|k| !k.is_empty()),
            gemini_endpoint: string("AIRWISE_GEMINI_BASE_URL", defaults.gemini_endpoint),
            stream_delay,
            default_coordinates,
        }
    }
}
