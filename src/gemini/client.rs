//! HTTP client for the Gemini API

use reqwest::{Client, Response};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::GeminiError;
use super::models::{GeminiModel, GeminiRequest, GeminiResponse, GenerateRequest, StreamEvent};
use super::streaming;

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    /// HTTP client
    client: Client,
    /// API key for authentication
    api_key: String,
    /// Models endpoint base
    base_url: String,
    /// Model for buffered requests without an override
    model: String,
    /// Model for streamed requests without an override
    stream_model: String,
}

impl GeminiClient {
    /// Gemini models endpoint
    const API_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta/models";

    /// Create a new Gemini client with the given API key
    pub fn new(api_key: String) -> Result<Self, GeminiError> {
        let client = Client::builder().timeout(std::time::Duration::from_secs(300)).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: Self::API_URL.to_string(),
            model: GeminiModel::Flash20.model_id().to_string(),
            stream_model: GeminiModel::Flash25.model_id().to_string(),
        })
    }

    /// Set the default buffered and streaming models
    pub fn with_models(mut self, model: &str, stream_model: &str) -> Self {
        self.model = GeminiModel::resolve_id(model);
        self.stream_model = GeminiModel::resolve_id(stream_model);
        self
    }

    /// Point the client at a different models endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Default buffered model id
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, model, method)
    }

    async fn post(&self, url: &str, prompt: &str) -> Result<Response, GeminiError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await?;

        check_status(response).await
    }

    /// Send a buffered generation request and return the candidate text
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String, GeminiError> {
        let model = request.model.as_deref().map_or_else(|| self.model.clone(), GeminiModel::resolve_id);
        tracing::debug!("generateContent with {}", model);

        let response = self.post(&self.endpoint(&model, "generateContent"), &request.prompt).await?;
        let body = response.text().await?;
        let parsed: GeminiResponse = serde_json::from_str(&body)?;

        parsed.text().ok_or(GeminiError::EmptyResponse)
    }

    /// Send a streaming generation request
    ///
    /// Events are delivered through the channel in arrival order. Use the
    /// cancellation token to interrupt the request.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> Result<(), GeminiError> {
        let model =
            request.model.as_deref().map_or_else(|| self.stream_model.clone(), GeminiModel::resolve_id);
        tracing::debug!("streamGenerateContent with {}", model);

        let url = format!("{}?alt=sse", self.endpoint(&model, "streamGenerateContent"));
        let response = tokio::select! {
            biased;

            _ = cancel_token.cancelled() => return Err(GeminiError::Cancelled),
            response = self.post(&url, &request.prompt) => response?,
        };

        streaming::process_stream(response, tx, cancel_token).await
    }
}

/// Map non-success statuses to errors
pub(crate) async fn check_status(response: Response) -> Result<Response, GeminiError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return Err(GeminiError::RateLimited { retry_after_seconds: retry_after });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(GeminiError::ApiError {
            status: status.as_u16(),
            message: "Invalid API key".to_string(),
        });
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(GeminiError::ApiError { status: status.as_u16(), message });
    }

    Ok(response)
}
