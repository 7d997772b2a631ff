//! Gemini API integration module
//!
//! Provides API key management, a direct HTTP client, a client for a
//! running proxy, and streaming support. Callers depend on the
//! [`TextGenerator`] capability rather than a concrete client.

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod proxy;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use auth::ApiKeyManager;
pub use client::GeminiClient;
pub use error::GeminiError;
pub use models::{GeminiModel, GenerateRequest, StreamEvent};
pub use proxy::ProxyClient;

/// Remote text generation: `generate(prompt) -> text` and
/// `generate_stream(prompt) -> ordered chunks`
pub trait TextGenerator: Send + Sync + 'static {
    /// Buffered generation
    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl Future<Output = Result<String, GeminiError>> + Send;

    /// Streamed generation
    ///
    /// Sends chunks in arrival order followed by [`StreamEvent::Done`].
    /// Returns `Err(GeminiError::Cancelled)` once the token fires; chunks
    /// already sent stay delivered.
    fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> impl Future<Output = Result<(), GeminiError>> + Send;
}

impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GeminiError> {
        GeminiClient::generate(self, request).await
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> Result<(), GeminiError> {
        GeminiClient::generate_stream(self, request, tx, cancel_token).await
    }
}

impl TextGenerator for ProxyClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GeminiError> {
        ProxyClient::generate(self, request).await
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> Result<(), GeminiError> {
        ProxyClient::generate_stream(self, request, tx, cancel_token).await
    }
}

/// Either transport, chosen from configuration at startup
#[derive(Clone)]
pub enum Backend {
    /// Call the Gemini API directly
    Direct(GeminiClient),
    /// Go through a running proxy
    Proxy(ProxyClient),
}

impl Backend {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Direct(client) => format!("Gemini API ({})", client.model()),
            Self::Proxy(proxy) => format!("proxy at {}", proxy.base_url()),
        }
    }
}

impl TextGenerator for Backend {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GeminiError> {
        match self {
            Self::Direct(client) => client.generate(request).await,
            Self::Proxy(proxy) => proxy.generate(request).await,
        }
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> Result<(), GeminiError> {
        match self {
            Self::Direct(client) => client.generate_stream(request, tx, cancel_token).await,
            Self::Proxy(proxy) => proxy.generate_stream(request, tx, cancel_token).await,
        }
    }
}
