//! Airwise - live air quality and weather with a health assistant.
//!
//! # Overview
//!
//! Airwise pulls current air-quality and weather readings for a location from
//! public providers, normalizes them into a small domain model, and keeps the
//! latest snapshot in a single state container that display surfaces read.
//! A conversational assistant answers health and safety questions from that
//! snapshot, using a remote language model when one is configured and
//! deterministic rules otherwise.
//!
//! # Modules
//!
//! - [`model`]: Domain types for readings, chat messages and the app state
//! - [`classify`]: AQI severity bands, labels and palette tokens
//! - [`data_sources`]: Provider clients (aqicn, Open-Meteo, Gemini)
//! - [`store`]: The state container and its change notifications
//! - [`assistant`]: Context building, remote completion and heuristic fallback
//! - [`refresh`]: Flows that run providers and update the store
//! - [`api`]: HTTP API handlers
//! - [`config`]: Environment configuration
//! - [`error`]: Error types

pub mod api;
pub mod assistant;
pub mod classify;
pub mod config;
pub mod data_sources;
pub mod error;
pub mod model;
pub mod refresh;
pub mod store;
