//! External data sources for live environmental readings.
//!
//! Every client issues exactly one request per call and normalizes the
//! response into the domain types in [`crate::model`]. None of them retries
//! or keeps state between calls, so they can all run concurrently.
//!
//! # Data Sources
//!
//! - [`aqicn`]: World Air Quality Index feed (current AQI by station or coordinates)
//! - [`open_meteo`]: Open-Meteo weather, hourly air-quality forecast and reverse geocoding
//! - [`gemini`]: Google Gemini text completions for the assistant

pub mod aqicn;
pub mod gemini;
pub mod open_meteo;

pub use aqicn::AqicnClient;
pub use gemini::GeminiClient;
pub use open_meteo::OpenMeteoClient;

/// Round to the nearest integer, with halves going towards positive infinity.
pub(crate) fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}
