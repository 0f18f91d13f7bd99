//! Airwise - live air quality and weather with a health assistant.
//!
//! # API Endpoints
//!
//! - `GET /state` - Current snapshot
//! - `GET /events` - State change notifications (SSE)
//! - `POST /refresh` - Refresh air quality and weather for coordinates
//! - `POST /chat` - Ask the assistant
//! - `GET /health` - Health check
//!
//! See [`airwise::api`] for the full list.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use airwise::api::{self, ApiState};
use airwise::assistant::{Assistant, CompletionProvider};
use airwise::config::Config;
use airwise::data_sources::{AqicnClient, GeminiClient, OpenMeteoClient};
use airwise::refresh::{self, Providers};
use airwise::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("airwise=info".parse()?))
        .init();

    let config = Config::from_env();
    info!(
        port = config.port,
        assistant_online = config.gemini_api_key.is_some(),
        default_location = config.default_coordinates.is_some(),
        "Starting Airwise"
    );

    let providers = Providers {
        aqicn: AqicnClient::with_base_url(&config.aqicn_base_url, config.aqicn_token.clone()),
        open_meteo: OpenMeteoClient::with_base_urls(
            &config.weather_base_url,
            &config.air_quality_base_url,
            &config.geocoding_base_url,
        ),
    };

    let completion = config.gemini_api_key.as_ref().map(|key| {
        Arc::new(GeminiClient::with_endpoint(&config.gemini_endpoint, key.clone()))
            as Arc<dyn CompletionProvider>
    });
    let assistant = Assistant::new(completion, config.stream_delay);

    // The store lives as long as the process; it is never persisted.
    let store = Store::shared();

    // Initial load, like a dashboard mounting. Failures stay in the error slot.
    if let Some((latitude, longitude)) = config.default_coordinates {
        let store = store.clone();
        let providers = providers.clone();
        tokio::spawn(async move {
            if let Err(e) =
                refresh::refresh_dashboard(&store, &providers, latitude, longitude).await
            {
                warn!(error = %e, "Initial dashboard refresh failed");
            }
            if let Err(e) =
                refresh::refresh_forecast(&store, &providers, latitude, longitude).await
            {
                warn!(error = %e, "Initial forecast refresh failed");
            }
        });
    }

    let state = ApiState {
        store,
        providers,
        assistant,
        default_coordinates: config.default_coordinates,
    };

    let app = api::router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Airwise is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
