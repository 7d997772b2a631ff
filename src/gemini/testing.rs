//! In-process generator used by tests

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::GeminiError;
use super::models::{GenerateRequest, StreamEvent};
use super::TextGenerator;

#[derive(Clone)]
enum Behavior {
    Reply(Vec<String>),
    Fail(String),
    FailStream { chunks: Vec<String>, message: String },
    Hang,
}

/// Scripted generator that records the prompts it receives
#[derive(Clone)]
pub struct FakeGenerator {
    behavior: Behavior,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeGenerator {
    fn with(behavior: Behavior) -> Self {
        Self { behavior, prompts: Arc::default() }
    }

    /// Reply with `text` (streamed as a single chunk)
    pub fn replying(text: &str) -> Self {
        Self::with(Behavior::Reply(vec![text.to_string()]))
    }

    /// Stream the given chunks; buffered calls get their concatenation
    pub fn streaming(chunks: &[&str]) -> Self {
        Self::with(Behavior::Reply(chunks.iter().map(|c| c.to_string()).collect()))
    }

    /// Fail every call with a transport-style error
    pub fn failing(message: &str) -> Self {
        Self::with(Behavior::Fail(message.to_string()))
    }

    /// Stream some chunks, then fail
    pub fn failing_stream(chunks: &[&str], message: &str) -> Self {
        Self::with(Behavior::FailStream {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            message: message.to_string(),
        })
    }

    /// Stream one chunk, then wait until cancelled
    pub fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, request: &GenerateRequest) {
        self.prompts.lock().unwrap().push(request.prompt.clone());
    }
}

fn chunk(text: &str) -> StreamEvent {
    let raw = serde_json::json!({"candidates":[{"content":{"parts":[{"text":text}]}}]}).to_string();
    StreamEvent::Chunk { raw, text: text.to_string() }
}

impl TextGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, GeminiError> {
        self.record(request);
        match &self.behavior {
            Behavior::Reply(chunks) => Ok(chunks.concat()),
            Behavior::Fail(message) | Behavior::FailStream { message, .. } => {
                Err(GeminiError::ApiError { status: 503, message: message.clone() })
            }
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> Result<(), GeminiError> {
        self.record(request);
        match &self.behavior {
            Behavior::Reply(chunks) => {
                for text in chunks {
                    if tx.send(chunk(text)).await.is_err() {
                        return Ok(());
                    }
                }
                let _ = tx.send(StreamEvent::Done).await;
                Ok(())
            }
            Behavior::Fail(message) => {
                Err(GeminiError::ApiError { status: 503, message: message.clone() })
            }
            Behavior::FailStream { chunks, message } => {
                for text in chunks {
                    let _ = tx.send(chunk(text)).await;
                }
                Err(GeminiError::Upstream(message.clone()))
            }
            Behavior::Hang => {
                let _ = tx.send(chunk("thinking")).await;
                cancel_token.cancelled().await;
                Err(GeminiError::Cancelled)
            }
        }
    }
}
