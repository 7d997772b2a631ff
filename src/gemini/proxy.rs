//! Client for a running `npvision serve` proxy

use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::client::check_status;
use super::error::GeminiError;
use super::models::{ErrorReply, GenerateReply, GenerateRequest, StreamEvent};
use super::streaming;

/// Talks to the proxy's `/api/generate` and `/api/gemini-stream` routes
#[derive(Clone)]
pub struct ProxyClient {
    client: Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GeminiError> {
        let client = Client::builder().timeout(std::time::Duration::from_secs(300)).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Buffered generation through the proxy
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String, GeminiError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorReply>(&body).map_or(body, |r| r.error);
            return Err(GeminiError::ApiError { status: status.as_u16(), message });
        }

        let reply: GenerateReply = serde_json::from_str(&body)?;
        Ok(reply.content)
    }

    /// Streamed generation through the proxy
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> Result<(), GeminiError> {
        let send = self
            .client
            .post(format!("{}/api/gemini-stream", self.base_url))
            .json(request)
            .send();

        let response = tokio::select! {
            biased;

            _ = cancel_token.cancelled() => return Err(GeminiError::Cancelled),
            response = send => check_status(response?).await?,
        };

        streaming::process_proxy_stream(response, tx, cancel_token).await
    }
}
