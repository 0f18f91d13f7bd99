//! Classification of AQI values into severity bands, plus the small
//! presentation helpers that hang off a band.
//!
//! # Thresholds
//!
//! Upper bounds are inclusive:
//!
//! - `good`: index <= 50
//! - `moderate`: index <= 100
//! - `unhealthy`: index <= 150
//! - `very-unhealthy`: index <= 200
//! - `hazardous`: index > 200

use std::fmt;

use crate::model::Severity;

/// Compass points in 45° steps, starting at north.
const COMPASS_POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Map an AQI value to its severity band.
pub fn classify(index: u32) -> Severity {
    match index {
        0..=50 => Severity::Good,
        51..=100 => Severity::Moderate,
        101..=150 => Severity::Unhealthy,
        151..=200 => Severity::VeryUnhealthy,
        _ => Severity::Hazardous,
    }
}

impl Severity {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Good => "Good",
            Severity::Moderate => "Moderate",
            Severity::Unhealthy => "Unhealthy",
            Severity::VeryUnhealthy => "Very Unhealthy",
            Severity::Hazardous => "Hazardous",
        }
    }

    /// Palette token used by display surfaces for this band.
    pub fn palette_token(&self) -> &'static str {
        match self {
            Severity::Good => "aqi-good",
            Severity::Moderate => "aqi-moderate",
            Severity::Unhealthy => "aqi-unhealthy",
            Severity::VeryUnhealthy => "aqi-very-unhealthy",
            Severity::Hazardous => "aqi-hazardous",
        }
    }

    /// Hex color behind [`Severity::palette_token`].
    pub fn color_hex(&self) -> &'static str {
        match self {
            Severity::Good => "#B4F65C",
            Severity::Moderate => "#F4E85C",
            Severity::Unhealthy => "#FF9F68",
            Severity::VeryUnhealthy => "#FF6B6B",
            Severity::Hazardous => "#E74C6C",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Palette color for a raw index.
pub fn color_for_index(index: u32) -> &'static str {
    classify(index).color_hex()
}

/// Reduce a wind direction in degrees to one of eight compass points.
///
/// Uses `round(degrees / 45) mod 8`, with halves rounding up; negative
/// inputs wrap around.
pub fn compass_point(degrees: f64) -> &'static str {
    let step = (degrees / 45.0 + 0.5).floor() as i64;
    COMPASS_POINTS[step.rem_euclid(8) as usize]
}
