//! View-level flows: run provider adapters and push their results into the
//! store, and route user questions through the assistant.
//!
//! Provider errors are recorded in the store's error slot and returned to
//! the caller, which decides whether to retry.

use tracing::{info, instrument, warn};

use crate::assistant::Assistant;
use crate::data_sources::{AqicnClient, OpenMeteoClient};
use crate::error::ProviderError;
use crate::model::{AirQualityReading, ChatMessage, ChatRole, WeatherSnapshot};
use crate::store::SharedStore;

/// The data provider clients used by the refresh flows.
#[derive(Clone)]
pub struct Providers {
    pub aqicn: AqicnClient,
    pub open_meteo: OpenMeteoClient,
}

/// Refresh the dashboard for a coordinate pair.
///
/// Air quality, weather and the place name are fetched concurrently. Both
/// readings are applied together, and only if no newer refresh has landed
/// in the meantime.
///
/// # Returns
///
/// Whether the result was applied (`false` means it was stale).
#[instrument(skip(store, providers))]
pub async fn refresh_dashboard(
    store: &SharedStore,
    providers: &Providers,
    latitude: f64,
    longitude: f64,
) -> Result<bool, ProviderError> {
    let ticket = {
        let mut store = store.lock().await;
        store.set_loading(true);
        store.begin_refresh()
    };

    let (air_quality, weather, location) = tokio::join!(
        providers.aqicn.get_by_coordinates(latitude, longitude),
        providers.open_meteo.get_weather(latitude, longitude),
        providers.open_meteo.reverse_geocode(latitude, longitude),
    );

    let mut store = store.lock().await;
    let outcome = match (air_quality, weather) {
        (Ok(reading), Ok(weather)) => {
            let applied = store.complete_refresh(ticket, reading, weather);
            if applied {
                store.set_location(location);
                store.set_error(None);
                info!(latitude, longitude, "Dashboard refreshed");
            } else {
                warn!(latitude, longitude, "Dashboard refresh superseded by a newer one");
            }
            Ok(applied)
        }
        (Err(e), _) | (_, Err(e)) => {
            if store.is_stale(ticket) {
                warn!(provider = e.provider(), error = %e, "Stale dashboard refresh failed");
            } else {
                store.set_error(Some(e.to_string()));
            }
            Err(e)
        }
    };
    // A newer refresh still in flight owns the loading flag.
    if store.is_latest(ticket) {
        store.set_loading(false);
    }
    outcome
}

/// Refresh air quality for a station identifier or city name.
#[instrument(skip(store, providers))]
pub async fn refresh_station(
    store: &SharedStore,
    providers: &Providers,
    station: &str,
) -> Result<(), ProviderError> {
    store.lock().await.set_loading(true);

    let result = providers.aqicn.get_by_station(station).await;

    let mut store = store.lock().await;
    let outcome = match result {
        Ok(reading) => {
            info!(station, index = reading.index(), "Station reading refreshed");
            store.set_air_quality(reading);
            store.set_error(None);
            Ok(())
        }
        Err(e) => {
            store.set_error(Some(e.to_string()));
            Err(e)
        }
    };
    store.set_loading(false);
    outcome
}

/// Refresh the 24-hour forecast series. Returns the number of points stored.
#[instrument(skip(store, providers))]
pub async fn refresh_forecast(
    store: &SharedStore,
    providers: &Providers,
    latitude: f64,
    longitude: f64,
) -> Result<usize, ProviderError> {
    let result = providers
        .open_meteo
        .get_hourly_forecast(latitude, longitude)
        .await;

    let mut store = store.lock().await;
    match result {
        Ok(points) => {
            let count = points.len();
            store.set_forecast(points);
            info!(count, "Forecast refreshed");
            Ok(count)
        }
        Err(e) => {
            store.set_error(Some(e.to_string()));
            Err(e)
        }
    }
}

/// Record a user question and return the snapshot to answer it from.
///
/// Returns `None`, and records nothing, while either reading is missing.
pub async fn begin_ask(
    store: &SharedStore,
    query: &str,
) -> Option<(AirQualityReading, WeatherSnapshot)> {
    let mut store = store.lock().await;
    let state = store.snapshot();
    let snapshot = (state.air_quality.clone()?, state.weather.clone()?);

    let message = store.new_message(ChatRole::User, query);
    store.append_chat_message(message);
    Some(snapshot)
}

/// Record the assistant's answer.
pub async fn finish_ask(store: &SharedStore, answer: String) -> ChatMessage {
    let mut store = store.lock().await;
    let message = store.new_message(ChatRole::Assistant, answer);
    store.append_chat_message(message.clone());
    message
}

/// Ask the assistant a question and record both sides of the exchange.
///
/// Returns `None` when there is no complete snapshot to answer from.
#[instrument(skip(store, assistant))]
pub async fn ask(store: &SharedStore, assistant: &Assistant, query: &str) -> Option<ChatMessage> {
    let Some((reading, weather)) = begin_ask(store, query).await else {
        warn!("Question asked before air quality and weather were loaded");
        return None;
    };

    let answer = assistant.answer(&reading, &weather, query).await;
    Some(finish_ask(store, answer).await)
}
