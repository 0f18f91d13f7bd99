//! Error types for provider and completion calls.
//!
//! Provider errors propagate to whoever asked for the refresh. Completion
//! errors never leave the assistant: it answers from its heuristics instead.

use thiserror::Error;

/// Failure to obtain a usable reading from a data provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced a readable response.
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered, but not with its success status.
    #[error("{provider} returned status {status}: {}", reason.as_deref().unwrap_or("no reason given"))]
    Status {
        provider: &'static str,
        status: String,
        reason: Option<String>,
    },

    /// The payload does not have the documented shape.
    #[error("{provider} returned a malformed payload: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },
}

impl ProviderError {
    pub(crate) fn transport(provider: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { provider, source }
    }

    pub(crate) fn malformed(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            provider,
            reason: reason.into(),
        }
    }

    /// Name of the provider that failed.
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Transport { provider, .. }
            | Self::Status { provider, .. }
            | Self::Malformed { provider, .. } => provider,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Transport failures, rate limits and 5xx responses are retryable;
    /// provider-level rejections and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => {
                matches!(status.parse::<u16>(), Ok(429) | Ok(500..=599))
            }
            Self::Malformed { .. } => false,
        }
    }
}

/// Failure of the remote completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no completion API key configured")]
    MissingApiKey,

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("completion response carried no text")]
    MissingCompletion,
}
