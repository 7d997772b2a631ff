//! Failures of the generation transport

use thiserror::Error;

/// Errors raised while calling Gemini or the proxy
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Neither `GEMINI_API_KEY` nor the keyring holds a key
    #[error("API key not configured. Set GEMINI_API_KEY or run `npvision key set`")]
    ApiKeyNotFound,

    /// Keyring backend failure
    #[error("Keyring unavailable: {0}")]
    KeyringError(String),

    /// Connection, TLS or body read failure
    #[error("Request to the generation service failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Non-success HTTP status from Gemini or the proxy
    #[error("Gemini returned {status}: {message}")]
    ApiError {
        status: u16,
        /// Error text from the response body
        message: String,
    },

    /// HTTP 429
    #[error("Too many requests, retry in {retry_after_seconds}s")]
    RateLimited {
        /// From the `retry-after` header, 60 when absent
        retry_after_seconds: u64,
    },

    /// The response carried no candidate text
    #[error("No Gemini response")]
    EmptyResponse,

    /// The proxy reported an error event mid-stream
    #[error("Upstream stream error: {0}")]
    Upstream(String),

    /// The caller cancelled the stream
    #[error("Generation cancelled")]
    Cancelled,

    /// Rejected by [`ApiKeyManager::set_api_key`](super::ApiKeyManager::set_api_key)
    #[error("Invalid API key format. Gemini keys start with 'AIza'")]
    InvalidApiKey,

    #[error("Invalid JSON from the generation service: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl GeminiError {
    /// Whether the same request may succeed if sent again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::RequestError(_)
                | Self::Cancelled
                | Self::EmptyResponse
                | Self::Upstream(_)
        )
    }

    /// Whether the key is missing or was refused
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::ApiKeyNotFound | Self::InvalidApiKey | Self::ApiError { status: 401 | 403, .. }
        )
    }
}
