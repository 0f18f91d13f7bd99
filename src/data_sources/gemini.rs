//! Google Gemini `generateContent` client.
//!
//! Only single-turn text prompts are sent; the response's first candidate's
//! first text part is the completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assistant::CompletionProvider;
use crate::error::CompletionError;

/// Default completion endpoint.
pub const GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// Client for Gemini text completions.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client for the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(GEMINI_API_URL, api_key)
    }

    /// Create a client with a custom endpoint (for testing).
    pub fn with_endpoint(endpoint: &str, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.into(),
        }
    }

    fn build_request(prompt: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        if self.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        debug!(prompt_len = prompt.len(), "Sending Gemini completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::build_request(prompt))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&body).map_err(|_| CompletionError::MissingCompletion)?;
        extract_text(parsed).ok_or(CompletionError::MissingCompletion)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// `candidates[0].content.parts[0].text`, if non-blank.
fn extract_text(response: GeminiResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
        .filter(|text| !text.trim().is_empty())
}

// Gemini API types

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
