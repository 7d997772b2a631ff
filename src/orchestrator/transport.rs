//! Buffered and streamed calls through a [`TextGenerator`]

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::gemini::{GeminiError, GenerateRequest, StreamEvent, TextGenerator};

/// How an action reaches the generator
#[derive(Debug, Clone, Default)]
pub enum Transport {
    /// Single request, full text in one reply
    #[default]
    Buffered,
    /// Streamed request; chunk texts are forwarded to `progress` as they
    /// arrive and concatenated into the final text
    Streamed {
        cancel: CancellationToken,
        progress: Option<mpsc::Sender<String>>,
    },
}

impl Transport {
    /// Streamed transport without progress reporting
    pub fn streamed(cancel: CancellationToken) -> Self {
        Self::Streamed { cancel, progress: None }
    }

    /// Streamed transport forwarding chunks to `progress`
    pub fn streamed_with_progress(cancel: CancellationToken, progress: mpsc::Sender<String>) -> Self {
        Self::Streamed { cancel, progress: Some(progress) }
    }
}

/// Run a request over `transport` and return the complete text
pub async fn call<G: TextGenerator>(
    generator: &G,
    request: &GenerateRequest,
    transport: &Transport,
) -> Result<String, GeminiError> {
    match transport {
        Transport::Buffered => generator.generate(request).await,
        Transport::Streamed { cancel, progress } => {
            collect_stream(generator, request, cancel, progress.as_ref()).await
        }
    }
}

/// Drive a streamed request to completion
///
/// Chunks are appended in arrival order. An error event from the stream
/// fails the whole call; cancellation returns `GeminiError::Cancelled`
/// after the chunks already forwarded.
pub async fn collect_stream<G: TextGenerator>(
    generator: &G,
    request: &GenerateRequest,
    cancel: &CancellationToken,
    progress: Option<&mpsc::Sender<String>>,
) -> Result<String, GeminiError> {
    let (tx, mut rx) = mpsc::channel(32);
    let producer = generator.generate_stream(request, tx, cancel.clone());

    let consumer = async {
        let mut text = String::new();
        let mut failure = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk { text: chunk, .. } => {
                    if let Some(progress) = progress {
                        let _ = progress.send(chunk.clone()).await;
                    }
                    text.push_str(&chunk);
                }
                StreamEvent::Done => {}
                StreamEvent::Error { message } => failure = Some(message),
            }
        }
        (text, failure)
    };

    let (result, (text, failure)) = tokio::join!(producer, consumer);
    result?;
    if let Some(message) = failure {
        return Err(GeminiError::Upstream(message));
    }
    Ok(text)
}

/// A live streamed call handed to the caller
pub struct TutorCall {
    /// Ordered stream events
    pub events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<(), GeminiError>>,
}

impl TutorCall {
    pub(crate) fn spawn<G: TextGenerator>(generator: Arc<G>, request: GenerateRequest) -> Self {
        let (tx, events) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle =
            tokio::spawn(async move { generator.generate_stream(&request, tx, token).await });
        Self { events, cancel, handle }
    }

    /// Stop further delivery; chunks already received stay delivered
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this call
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the producer to finish
    pub async fn finish(self) -> Result<(), GeminiError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(GeminiError::Cancelled),
            Err(e) => Err(GeminiError::Upstream(format!("Tutor task failed: {}", e))),
        }
    }
}
