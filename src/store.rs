//! The state container read by every display surface.
//!
//! A [`Store`] owns one [`AppState`]. Its update methods are the only way to
//! change that state, and each one replaces exactly the field it names.
//! After every update the store broadcasts a [`StateChange`] so subscribers
//! can re-read the snapshot.
//!
//! The entry point creates one store and shares it as a [`SharedStore`];
//! there is no global instance.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::model::{
    AirQualityReading, AppState, ChatMessage, ChatRole, ForecastPoint, Location,
    MAX_FORECAST_POINTS, Theme, WeatherSnapshot,
};

/// Buffered notifications per subscriber before it starts lagging.
const NOTIFY_CAPACITY: usize = 64;

/// A store shared between request handlers.
pub type SharedStore = Arc<Mutex<Store>>;

/// Which field an update replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateChange {
    AirQuality,
    Weather,
    Forecast,
    Location,
    ChatMessageAppended,
    ChatCleared,
    Loading,
    Error,
    ChatPanel,
    Theme,
}

/// Identifies one dashboard refresh, in the order refreshes were started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

pub struct Store {
    state: AppState,
    notifier: broadcast::Sender<StateChange>,
    next_message_id: u64,
    issued_refreshes: u64,
    applied_refresh: Option<RefreshTicket>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            state: AppState::default(),
            notifier,
            next_message_id: 1,
            issued_refreshes: 0,
            applied_refresh: None,
        }
    }

    /// Wrap a fresh store for sharing.
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Read access to the current state.
    pub fn snapshot(&self) -> &AppState {
        &self.state
    }

    /// Receive a notification after every subsequent update.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.notifier.subscribe()
    }

    pub fn set_air_quality(&mut self, reading: AirQualityReading) {
        self.state.air_quality = Some(reading);
        self.notify(StateChange::AirQuality);
    }

    pub fn set_weather(&mut self, weather: WeatherSnapshot) {
        self.state.weather = Some(weather);
        self.notify(StateChange::Weather);
    }

    /// Replace the forecast series; anything past 24 points is dropped.
    pub fn set_forecast(&mut self, mut forecast: Vec<ForecastPoint>) {
        forecast.truncate(MAX_FORECAST_POINTS);
        self.state.forecast = forecast;
        self.notify(StateChange::Forecast);
    }

    pub fn set_location(&mut self, location: Location) {
        self.state.location = Some(location);
        self.notify(StateChange::Location);
    }

    /// Build a message stamped now, with an id no earlier message has used.
    pub fn new_message(&mut self, role: ChatRole, content: impl Into<String>) -> ChatMessage {
        let id = self.next_message_id;
        self.next_message_id += 1;
        ChatMessage {
            id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn append_chat_message(&mut self, message: ChatMessage) {
        self.next_message_id = self.next_message_id.max(message.id.saturating_add(1));
        self.state.chat_messages.push(message);
        self.notify(StateChange::ChatMessageAppended);
    }

    pub fn clear_chat(&mut self) {
        self.state.chat_messages.clear();
        self.notify(StateChange::ChatCleared);
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.state.is_loading = loading;
        self.notify(StateChange::Loading);
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.state.error = error;
        self.notify(StateChange::Error);
    }

    /// Flip chat panel visibility and return the new value.
    pub fn toggle_chat_panel(&mut self) -> bool {
        self.state.is_chat_open = !self.state.is_chat_open;
        self.notify(StateChange::ChatPanel);
        self.state.is_chat_open
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.state.theme = theme;
        self.notify(StateChange::Theme);
    }

    /// Start a dashboard refresh. Tickets increase with every call.
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.issued_refreshes += 1;
        RefreshTicket(self.issued_refreshes)
    }

    /// Apply the result of a dashboard refresh unless a newer one already
    /// landed. Returns whether the result was applied.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        reading: AirQualityReading,
        weather: WeatherSnapshot,
    ) -> bool {
        if self.is_stale(ticket) {
            debug!(ticket = ticket.0, "Discarding stale refresh result");
            return false;
        }

        self.applied_refresh = Some(ticket);
        self.set_air_quality(reading);
        self.set_weather(weather);
        true
    }

    /// Whether a newer refresh than `ticket` has already been applied.
    pub fn is_stale(&self, ticket: RefreshTicket) -> bool {
        self.applied_refresh.is_some_and(|applied| applied > ticket)
    }

    /// Whether `ticket` belongs to the most recently started refresh.
    pub fn is_latest(&self, ticket: RefreshTicket) -> bool {
        ticket.0 == self.issued_refreshes
    }

    fn notify(&self, change: StateChange) {
        // An error only means nobody is subscribed right now.
        let _ = self.notifier.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};

    fn reading(index: u32) -> AirQualityReading {
        let observed = DateTime::parse_from_rfc3339("2024-03-01T08:00:00+00:00").unwrap();
        AirQualityReading::new(index, 12.0, 20.0, "pm25", observed, "Testville")
    }

    fn weather(temperature: i32) -> WeatherSnapshot {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        WeatherSnapshot {
            temperature,
            feels_like: temperature,
            humidity: 50.0,
            pressure_hpa: 1013,
            wind_speed_kph: 10,
            wind_gust_kph: 20,
            wind_direction_deg: 90.0,
            uv_index: 3.0,
            visibility_km: 10.0,
            sunrise: day.and_hms_opt(6, 0, 0).unwrap(),
            sunset: day.and_hms_opt(18, 0, 0).unwrap(),
        }
    }

    fn point(hour: u32) -> ForecastPoint {
        ForecastPoint {
            time: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::hours(i64::from(hour)),
            temperature: 10,
            index: hour,
            pm25: 1.0,
            pm10: 1.0,
        }
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = Store::new();
        let state = store.snapshot();

        assert!(state.air_quality.is_none());
        assert!(state.weather.is_none());
        assert!(state.forecast.is_empty());
        assert!(state.chat_messages.is_empty());
        assert!(!state.is_loading);
        assert!(state.error.is_none());
        assert!(!state.is_chat_open);
        assert_eq!(state.theme, Theme::System);
    }

    #[test]
    fn test_set_air_quality_is_idempotent() {
        let mut store = Store::new();
        store.set_air_quality(reading(80));
        let once = store.snapshot().clone();

        store.set_air_quality(reading(80));

        assert_eq!(store.snapshot(), &once);
        assert_eq!(store.snapshot().air_quality, Some(reading(80)));
    }

    #[test]
    fn test_set_air_quality_replaces_whole_reading() {
        let mut store = Store::new();
        store.set_air_quality(reading(30));
        store.set_air_quality(reading(180));

        let current = store.snapshot().air_quality.as_ref().unwrap();
        assert_eq!(current.index(), 180);
        assert_eq!(current.severity(), crate::model::Severity::VeryUnhealthy);
    }

    #[test]
    fn test_append_preserves_order_and_clear_empties() {
        let mut store = Store::new();
        for i in 0..5 {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            let message = store.new_message(role, format!("message {i}"));
            store.append_chat_message(message);
        }

        let contents: Vec<&str> = store
            .snapshot()
            .chat_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            contents,
            ["message 0", "message 1", "message 2", "message 3", "message 4"]
        );
        let ids: Vec<u64> = store.snapshot().chat_messages.iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        store.clear_chat();
        assert!(store.snapshot().chat_messages.is_empty());

        store.clear_chat();
        assert!(store.snapshot().chat_messages.is_empty());
    }

    #[test]
    fn test_message_ids_stay_ahead_of_appended_ids() {
        let mut store = Store::new();
        store.append_chat_message(ChatMessage {
            id: 41,
            role: ChatRole::User,
            content: "external".to_string(),
            timestamp: Utc::now(),
        });

        assert_eq!(store.new_message(ChatRole::Assistant, "next").id, 42);
    }

    #[test]
    fn test_append_accepts_largest_id() {
        let mut store = Store::new();
        store.append_chat_message(ChatMessage {
            id: u64::MAX,
            role: ChatRole::User,
            content: "edge".to_string(),
            timestamp: Utc::now(),
        });

        assert_eq!(store.snapshot().chat_messages.len(), 1);
    }

    #[test]
    fn test_set_forecast_caps_length() {
        let mut store = Store::new();
        store.set_forecast((0..30).map(point).collect());

        let forecast = &store.snapshot().forecast;
        assert_eq!(forecast.len(), MAX_FORECAST_POINTS);
        assert_eq!(forecast[0].index, 0);
        assert_eq!(forecast[23].index, 23);
    }

    #[test]
    fn test_scalar_updates() {
        let mut store = Store::new();

        store.set_loading(true);
        store.set_error(Some("boom".to_string()));
        store.set_theme(Theme::Dark);
        assert!(store.toggle_chat_panel());

        let state = store.snapshot();
        assert!(state.is_loading);
        assert_eq!(state.error.as_deref(), Some("boom"));
        assert_eq!(state.theme, Theme::Dark);
        assert!(state.is_chat_open);

        assert!(!store.toggle_chat_panel());
        store.set_error(None);
        assert!(store.snapshot().error.is_none());
    }

    #[test]
    fn test_subscribers_notified_in_update_order() {
        let mut store = Store::new();
        let mut rx = store.subscribe();

        store.set_loading(true);
        store.set_air_quality(reading(10));
        store.set_weather(weather(20));
        store.set_loading(false);

        assert_eq!(rx.try_recv().unwrap(), StateChange::Loading);
        assert_eq!(rx.try_recv().unwrap(), StateChange::AirQuality);
        assert_eq!(rx.try_recv().unwrap(), StateChange::Weather);
        assert_eq!(rx.try_recv().unwrap(), StateChange::Loading);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_refresh_is_discarded() {
        let mut store = Store::new();
        let older = store.begin_refresh();
        let newer = store.begin_refresh();

        assert!(store.complete_refresh(newer, reading(120), weather(25)));
        assert!(!store.complete_refresh(older, reading(20), weather(5)));

        let state = store.snapshot();
        assert_eq!(state.air_quality.as_ref().unwrap().index(), 120);
        assert_eq!(state.weather.as_ref().unwrap().temperature, 25);
    }

    #[test]
    fn test_staleness_and_latest_ticket() {
        let mut store = Store::new();
        let older = store.begin_refresh();
        let newer = store.begin_refresh();

        assert!(!store.is_stale(older));
        assert!(!store.is_latest(older));
        assert!(store.is_latest(newer));

        store.complete_refresh(newer, reading(120), weather(25));
        assert!(store.is_stale(older));
        assert!(!store.is_stale(newer));
    }

    #[test]
    fn test_in_order_refreshes_apply() {
        let mut store = Store::new();
        let first = store.begin_refresh();
        assert!(store.complete_refresh(first, reading(20), weather(5)));

        let second = store.begin_refresh();
        assert!(store.complete_refresh(second, reading(60), weather(8)));
        assert_eq!(store.snapshot().air_quality.as_ref().unwrap().index(), 60);
    }

    #[test]
    fn test_plain_setter_is_last_write_wins() {
        let mut store = Store::new();
        let ticket = store.begin_refresh();
        store.complete_refresh(ticket, reading(120), weather(25));

        store.set_air_quality(reading(15));
        assert_eq!(store.snapshot().air_quality.as_ref().unwrap().index(), 15);
    }
}
