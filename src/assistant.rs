//! Health and safety assistant.
//!
//! An answer is produced in two stages: one remote completion call over a
//! fixed-shape context built from the latest snapshot, and, if that fails for
//! any reason, a deterministic keyword heuristic. Callers always get text
//! back; failures are logged here and go no further.
//!
//! Each query is answered from the current snapshot alone. Chat history is
//! never sent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{info, warn};

use crate::error::CompletionError;
use crate::model::{AirQualityReading, WeatherSnapshot};

/// Index above which outdoor exercise and general exposure are discouraged.
const EXERCISE_LIMIT: u32 = 150;

/// Index above which a respirator mask is recommended.
const MASK_LIMIT: u32 = 100;

/// Default per-word delay for incremental delivery.
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(50);

/// A remote text-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Answers user questions about the current conditions.
#[derive(Clone)]
pub struct Assistant {
    provider: Option<Arc<dyn CompletionProvider>>,
    word_delay: Duration,
}

impl Assistant {
    /// Create an assistant. With no provider, every answer comes from the
    /// local heuristics.
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>, word_delay: Duration) -> Self {
        Self {
            provider,
            word_delay,
        }
    }

    /// An assistant that never calls out.
    pub fn offline(word_delay: Duration) -> Self {
        Self::new(None, word_delay)
    }

    /// Answer a query in one piece.
    pub async fn answer(
        &self,
        reading: &AirQualityReading,
        weather: &WeatherSnapshot,
        query: &str,
    ) -> String {
        let Some(provider) = &self.provider else {
            return fallback_answer(reading, query);
        };

        let context = build_context(reading, weather, query);
        match provider.complete(&context).await {
            Ok(text) => {
                info!(provider = provider.name(), "Assistant answered remotely");
                text
            }
            Err(e) => {
                warn!(
                    provider = provider.name(),
                    error = %e,
                    "Completion failed, answering from heuristics"
                );
                fallback_answer(reading, query)
            }
        }
    }

    /// Answer a query word by word.
    ///
    /// Each word is yielded with one trailing space and followed by the
    /// configured delay. The answer is computed when the stream is first
    /// polled; dropping the stream early cancels whatever is pending.
    pub fn answer_stream(
        &self,
        reading: AirQualityReading,
        weather: WeatherSnapshot,
        query: String,
    ) -> BoxStream<'static, String> {
        let delay = self.word_delay;
        let start = Delivery::Pending {
            assistant: self.clone(),
            reading,
            weather,
            query,
        };

        stream::unfold(start, move |delivery| async move {
            let mut words = match delivery {
                Delivery::Pending {
                    assistant,
                    reading,
                    weather,
                    query,
                } => {
                    let answer = assistant.answer(&reading, &weather, &query).await;
                    split_words(&answer).into_iter()
                }
                Delivery::Words(words) => {
                    tokio::time::sleep(delay).await;
                    words
                }
            };

            let word = words.next()?;
            Some((word, Delivery::Words(words)))
        })
        .boxed()
    }
}

enum Delivery {
    Pending {
        assistant: Assistant,
        reading: AirQualityReading,
        weather: WeatherSnapshot,
        query: String,
    },
    Words(std::vec::IntoIter<String>),
}

/// Build the prompt sent to the completion provider.
pub fn build_context(
    reading: &AirQualityReading,
    weather: &WeatherSnapshot,
    query: &str,
) -> String {
    format!(
        "Current Air Quality:\n\
         - AQI: {index} ({severity})\n\
         - PM2.5: {pm25}\n\
         - PM10: {pm10}\n\
         - Location: {location}\n\
         \n\
         Current Weather:\n\
         - Temperature: {temperature}°C (Feels like {feels_like}°C)\n\
         - Humidity: {humidity}%\n\
         - Wind: {wind} km/h\n\
         - UV Index: {uv}\n\
         \n\
         User Question: {query}\n\
         \n\
         Provide a concise, helpful response focused on health and safety recommendations.\n",
        index = reading.index(),
        severity = reading.severity().label(),
        pm25 = reading.pm25(),
        pm10 = reading.pm10(),
        location = reading.location_name(),
        temperature = weather.temperature,
        feels_like = weather.feels_like,
        humidity = weather.humidity,
        wind = weather.wind_speed_kph,
        uv = weather.uv_index,
        query = query,
    )
}

/// Answer from keyword heuristics. The first matching class wins:
/// exercise, then commute timing, then masks, then a general summary.
pub fn fallback_answer(reading: &AirQualityReading, query: &str) -> String {
    let query = query.to_lowercase();
    let index = reading.index();

    if query.contains("run") || query.contains("exercise") {
        return if index > EXERCISE_LIMIT {
            "Not recommended. The AQI is unhealthy. Consider indoor exercise or postpone until air quality improves."
        } else {
            "Air quality is acceptable for outdoor exercise. Stay hydrated and monitor how you feel."
        }
        .to_string();
    }

    if query.contains("commute") || query.contains("time") {
        return "Based on current trends, air quality tends to improve after 10 AM. Consider commuting during mid-morning or early afternoon.".to_string();
    }

    if query.contains("mask") {
        return if index > MASK_LIMIT {
            "Yes, wearing an N95 or KN95 mask is recommended for outdoor activities."
        } else {
            "A mask is not necessary at current air quality levels, but sensitive individuals may still benefit from wearing one."
        }
        .to_string();
    }

    let advice = if index > EXERCISE_LIMIT {
        "Stay indoors and use air purifiers if available."
    } else {
        "Air quality is moderate. Sensitive groups should limit prolonged outdoor activities."
    };
    format!(
        "Current AQI is {} ({}). {}",
        index,
        reading.severity().label(),
        advice
    )
}

/// Split an answer on single spaces, giving each piece one trailing space.
pub fn split_words(answer: &str) -> Vec<String> {
    answer.split(' ').map(|word| format!("{word} ")).collect()
}

/// Undo [`split_words`]: concatenate and drop the final trailing space.
pub fn reassemble<S: AsRef<str>>(chunks: &[S]) -> String {
    let mut text: String = chunks.iter().map(|chunk| chunk.as_ref()).collect();
    if text.ends_with(' ') {
        text.pop();
    }
    text
}
