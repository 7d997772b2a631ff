//! HTTP proxy in front of the generation service
//!
//! Routes:
//! - `POST /api/generate`, `POST /api/gemini`: `{prompt, model?}` to
//!   `{success: true, content}`
//! - `POST /api/gemini-stream`: same body, answered as `text/event-stream`
//!   carrying raw provider chunks, then `[DONE]`; failures are sent as
//!   `event: error`
//! - `GET /healthz`

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

use crate::gemini::streaming::DONE_SENTINEL;
use crate::gemini::{GeminiError, GenerateRequest, StreamEvent, TextGenerator};
use crate::gemini::models::GenerateReply;

/// Shared handler state
pub struct ServerState<G> {
    generator: Arc<G>,
}

impl<G> Clone for ServerState<G> {
    fn clone(&self) -> Self {
        Self { generator: Arc::clone(&self.generator) }
    }
}

impl<G: TextGenerator> ServerState<G> {
    pub fn new(generator: G) -> Self {
        Self { generator: Arc::new(generator) }
    }
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn serve<G: TextGenerator>(addr: SocketAddr, generator: G) -> Result<()> {
    let app = router(ServerState::new(generator));

    info!(%addr, "Binding HTTP listener");
    let listener =
        TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("HTTP server exited");
    Ok(())
}

/// Build the application router
pub fn router<G: TextGenerator>(state: ServerState<G>) -> Router {
    Router::new()
        .route("/api/generate", post(generate::<G>))
        .route("/api/gemini", post(gemini::<G>))
        .route("/api/gemini-stream", post(gemini_stream::<G>))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<GeminiError> for ApiError {
    fn from(err: GeminiError) -> Self {
        let status = match &err {
            GeminiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GeminiError::ApiError { .. } | GeminiError::RequestError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!("Generation failed: {}", err);
        Self { status, message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn require_prompt(request: &GenerateRequest) -> Result<(), ApiError> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt missing"));
    }
    Ok(())
}

fn reply(content: String) -> Json<GenerateReply> {
    Json(GenerateReply { success: true, content })
}

/// Buffered generation; an empty candidate list yields empty content
async fn generate<G: TextGenerator>(
    State(state): State<ServerState<G>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateReply>, ApiError> {
    require_prompt(&request)?;
    match state.generator.generate(&request).await {
        Ok(content) => Ok(reply(content)),
        Err(GeminiError::EmptyResponse) => Ok(reply(String::new())),
        Err(e) => Err(e.into()),
    }
}

/// Buffered generation; an empty candidate list is an error
async fn gemini<G: TextGenerator>(
    State(state): State<ServerState<G>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateReply>, ApiError> {
    require_prompt(&request)?;
    let content = state.generator.generate(&request).await?;
    Ok(reply(content))
}

async fn gemini_stream<G: TextGenerator>(
    State(state): State<ServerState<G>>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Err(e) = require_prompt(&request) {
        return e.into_response();
    }

    let (tx, rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();
    let generator = Arc::clone(&state.generator);
    let producer_cancel = cancel.clone();

    tokio::spawn(async move {
        let errors = tx.clone();
        match generator.generate_stream(&request, tx, producer_cancel).await {
            Ok(()) => {}
            Err(GeminiError::Cancelled) => tracing::debug!("Stream cancelled by client"),
            Err(e) => {
                tracing::warn!("Stream failed: {}", e);
                let _ = errors.send(StreamEvent::Error { message: e.to_string() }).await;
            }
        }
    });

    // Dropping the response body (client went away) cancels the producer
    let guard = cancel.drop_guard();
    let events = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(to_sse(event)), (rx, guard)))
    });

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn to_sse(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Chunk { raw, .. } => Event::default().data(raw.replace('\r', "")),
        StreamEvent::Done => Event::default().data(DONE_SENTINEL),
        StreamEvent::Error { message } => {
            Event::default().event("error").data(message.replace('\r', ""))
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "npvision" }))
}
