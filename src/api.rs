//! HTTP API for display surfaces.
//!
//! Display surfaces read the store through `GET /state` and `GET /events`,
//! and change it only through the endpoints below, each of which maps to one
//! store operation or refresh flow.
//!
//! - `GET /health` - Health check
//! - `GET /state` - Current snapshot
//! - `GET /events` - Server-Sent Events feed of state changes
//! - `POST /refresh` - Refresh air quality, weather and location for coordinates
//! - `POST /refresh/station` - Refresh air quality for a station
//! - `POST /forecast` - Refresh the 24-hour forecast
//! - `POST /chat` - Ask the assistant
//! - `POST /chat/stream` - Ask the assistant, answer streamed word by word
//! - `DELETE /chat` - Clear the conversation
//! - `POST /chat/toggle` - Toggle the chat panel
//! - `PUT /theme` - Set the display theme

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post, put},
};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, instrument, warn};

use crate::assistant::{Assistant, reassemble};
use crate::classify::{color_for_index, compass_point};
use crate::error::ProviderError;
use crate::model::{
    AppState, ChatMessage, ChatRequest, CoordinatesRequest, StationRequest, ThemeRequest,
    forecast_peak,
};
use crate::refresh::{self, Providers};
use crate::store::SharedStore;

/// Keep-alive interval for SSE connections.
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: SharedStore,
    pub providers: Providers,
    pub assistant: Assistant,
    /// Stand-in for device geolocation when a request carries no coordinates.
    pub default_coordinates: Option<(f64, f64)>,
}

/// Error response with a JSON `{ "error": ... }` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Snapshot payload: the app state plus values derived for display.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub state: AppState,
    pub display: DisplayHints,
}

/// Presentation values derived from the snapshot. Each is `null` until the
/// reading it depends on has loaded.
#[derive(Debug, Default, Serialize)]
pub struct DisplayHints {
    pub severity_label: Option<&'static str>,
    pub palette_token: Option<&'static str>,
    pub color: Option<&'static str>,
    pub wind_compass: Option<&'static str>,
    pub forecast_peak: Option<u32>,
    pub forecast_peak_color: Option<&'static str>,
}

impl From<AppState> for StateResponse {
    fn from(state: AppState) -> Self {
        let severity = state.air_quality.as_ref().map(|reading| reading.severity());
        let peak = forecast_peak(&state.forecast);

        let display = DisplayHints {
            severity_label: severity.map(|s| s.label()),
            palette_token: severity.map(|s| s.palette_token()),
            color: severity.map(|s| s.color_hex()),
            wind_compass: state
                .weather
                .as_ref()
                .map(|weather| compass_point(weather.wind_direction_deg)),
            forecast_peak: peak,
            forecast_peak_color: peak.map(color_for_index),
        };

        Self { state, display }
    }
}

/// Build the router with every endpoint.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/state", get(get_state))
        .route("/events", get(get_events))
        .route("/refresh", post(post_refresh))
        .route("/refresh/station", post(post_refresh_station))
        .route("/forecast", post(post_forecast))
        .route("/chat", post(post_chat).delete(delete_chat))
        .route("/chat/stream", post(post_chat_stream))
        .route("/chat/toggle", post(post_chat_toggle))
        .route("/theme", put(put_theme))
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /state - The full current snapshot.
///
/// # Response
///
/// ```json
/// {
///   "air_quality": { "index": 57, "severity": "moderate", ... },
///   "weather": { ... },
///   "forecast": [ ... ],
///   "display": {
///     "severity_label": "Moderate",
///     "palette_token": "aqi-moderate",
///     "color": "#F4E85C",
///     "wind_compass": "SW",
///     "forecast_peak": 66,
///     "forecast_peak_color": "#F4E85C"
///   }
/// }
/// ```
pub async fn get_state(State(state): State<ApiState>) -> Json<StateResponse> {
    current_snapshot(&state).await
}

/// GET /events - One `state` event per store update.
///
/// # Event data
///
/// ```json
/// "air_quality"
/// ```
///
/// Clients re-read `GET /state` on each event. Lagging clients skip the
/// events they missed.
pub async fn get_events(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.store.lock().await.subscribe();

    let events = BroadcastStream::new(receiver).filter_map(|change| async move {
        let change = change.ok()?;
        Event::default()
            .event("state")
            .json_data(change)
            .ok()
            .map(Ok::<_, Infallible>)
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE).text("ping"))
}

/// POST /refresh - Refresh the dashboard for a coordinate pair.
///
/// # Request Body
///
/// ```json
/// { "latitude": 31.23, "longitude": 121.47 }
/// ```
///
/// Both fields are optional together; the configured default location is
/// used when they are absent.
///
/// # Response
///
/// The new snapshot, or `502` with the provider error (also recorded in the
/// snapshot's `error` field).
#[instrument(skip(state))]
pub async fn post_refresh(
    State(state): State<ApiState>,
    body: Option<Json<CoordinatesRequest>>,
) -> Result<Json<StateResponse>, ApiError> {
    let (latitude, longitude) = resolve_coordinates(&state, body)?;

    let applied = refresh::refresh_dashboard(&state.store, &state.providers, latitude, longitude)
        .await
        .inspect_err(|e| {
            warn!(
                provider = e.provider(),
                error = %e,
                retryable = e.is_retryable(),
                "Dashboard refresh failed"
            )
        })?;
    info!(applied, "Dashboard refresh handled");

    Ok(current_snapshot(&state).await)
}

/// POST /refresh/station - Refresh air quality for a station or city.
///
/// # Request Body
///
/// ```json
/// { "station": "shanghai" }
/// ```
#[instrument(skip(state))]
pub async fn post_refresh_station(
    State(state): State<ApiState>,
    Json(request): Json<StationRequest>,
) -> Result<Json<StateResponse>, ApiError> {
    if request.station.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "station must not be empty"));
    }

    refresh::refresh_station(&state.store, &state.providers, &request.station)
        .await
        .inspect_err(|e| warn!(station = %request.station, error = %e, "Station refresh failed"))?;

    Ok(current_snapshot(&state).await)
}

/// POST /forecast - Refresh the 24-hour forecast series.
#[instrument(skip(state))]
pub async fn post_forecast(
    State(state): State<ApiState>,
    body: Option<Json<CoordinatesRequest>>,
) -> Result<Json<StateResponse>, ApiError> {
    let (latitude, longitude) = resolve_coordinates(&state, body)?;

    refresh::refresh_forecast(&state.store, &state.providers, latitude, longitude)
        .await
        .inspect_err(|e| warn!(error = %e, "Forecast refresh failed"))?;

    Ok(current_snapshot(&state).await)
}

/// POST /chat - Ask the assistant.
///
/// # Request Body
///
/// ```json
/// { "query": "Do I need a mask?" }
/// ```
///
/// # Response
///
/// The assistant's message. `409` when air quality or weather has not been
/// loaded yet.
#[instrument(skip(state, request))]
pub async fn post_chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    let query = validate_query(&request)?;

    refresh::ask(&state.store, &state.assistant, query)
        .await
        .map(Json)
        .ok_or_else(snapshot_missing)
}

/// POST /chat/stream - Ask the assistant, answer delivered as SSE.
///
/// Emits one `word` event per word and a final `done` event carrying the
/// recorded assistant message. If the client disconnects early, nothing is
/// recorded for the answer.
#[instrument(skip(state, request))]
pub async fn post_chat_stream(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let query = validate_query(&request)?.to_string();

    let (reading, weather) = refresh::begin_ask(&state.store, &query)
        .await
        .ok_or_else(snapshot_missing)?;

    let mut words = state.assistant.answer_stream(reading, weather, query);
    let store = state.store.clone();

    let events = async_stream::stream! {
        let mut chunks = Vec::new();
        while let Some(word) = words.next().await {
            yield Ok::<_, Infallible>(Event::default().event("word").data(word.clone()));
            chunks.push(word);
        }

        let message = refresh::finish_ask(&store, reassemble(&chunks)).await;
        match Event::default().event("done").json_data(&message) {
            Ok(event) => yield Ok(event),
            Err(e) => warn!(error = %e, "Failed to encode final chat event"),
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

/// DELETE /chat - Clear the conversation.
pub async fn delete_chat(State(state): State<ApiState>) -> impl IntoResponse {
    state.store.lock().await.clear_chat();
    StatusCode::NO_CONTENT
}

/// POST /chat/toggle - Toggle chat panel visibility.
///
/// # Response
///
/// ```json
/// { "is_chat_open": true }
/// ```
pub async fn post_chat_toggle(State(state): State<ApiState>) -> impl IntoResponse {
    let is_chat_open = state.store.lock().await.toggle_chat_panel();
    Json(json!({ "is_chat_open": is_chat_open }))
}

/// PUT /theme - Set the display theme (`light`, `dark` or `system`).
pub async fn put_theme(
    State(state): State<ApiState>,
    Json(request): Json<ThemeRequest>,
) -> impl IntoResponse {
    state.store.lock().await.set_theme(request.theme);
    StatusCode::NO_CONTENT
}

async fn current_snapshot(state: &ApiState) -> Json<StateResponse> {
    let snapshot = state.store.lock().await.snapshot().clone();
    Json(snapshot.into())
}

fn resolve_coordinates(
    state: &ApiState,
    body: Option<Json<CoordinatesRequest>>,
) -> Result<(f64, f64), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    match (request.latitude, request.longitude) {
        (Some(latitude), Some(longitude)) => Ok((latitude, longitude)),
        (None, None) => state.default_coordinates.ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "no coordinates given and no default location configured",
            )
        }),
        _ => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "latitude and longitude must be given together",
        )),
    }
}

/// Reject blank queries; the query itself is passed on verbatim.
fn validate_query(request: &ChatRequest) -> Result<&str, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "query must not be empty"));
    }
    Ok(&request.query)
}

fn snapshot_missing() -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "air quality and weather must be loaded before asking",
    )
}
