//! Server-Sent Events (SSE) parsing for streamed generations

use futures_util::StreamExt;
use reqwest::Response;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::GeminiError;
use super::models::{StreamEvent, chunk_text};

/// Terminal sentinel sent by the proxy
pub const DONE_SENTINEL: &str = "[DONE]";

/// One dispatched SSE event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the last `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental SSE decoder
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks decode correctly. A frame is
/// dispatched on each blank line.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every frame completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.pending.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame not terminated by a blank line
    pub fn finish(mut self) -> Option<SseFrame> {
        if !self.pending.is_empty() {
            let rest = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
            self.process_line(rest.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }

        if let Some(event) = field_value(line, "event") {
            self.event = Some(event.to_string());
        } else if let Some(data) = field_value(line, "data") {
            self.data.push(data.to_string());
        }
        // Comments (lines starting with ':') and unknown fields are ignored
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// What to do with a decoded frame
enum Dispatch {
    Send(StreamEvent),
    Skip,
    Finish,
    Fail(GeminiError),
}

/// Frames from the provider: every data payload is a JSON chunk
fn classify_provider(frame: SseFrame) -> Dispatch {
    match chunk_text(&frame.data) {
        Some(text) => Dispatch::Send(StreamEvent::Chunk { raw: frame.data, text }),
        None if frame.data.trim().is_empty() => Dispatch::Skip,
        None => {
            tracing::debug!("Chunk without candidate text: {}", frame.data);
            Dispatch::Send(StreamEvent::Chunk { raw: frame.data, text: String::new() })
        }
    }
}

/// Frames from the proxy: raw chunks, a `[DONE]` sentinel and `error` events
fn classify_proxy(frame: SseFrame) -> Dispatch {
    if frame.event.as_deref() == Some("error") {
        return Dispatch::Fail(GeminiError::Upstream(frame.data));
    }
    if frame.data.trim() == DONE_SENTINEL {
        return Dispatch::Finish;
    }

    let text = chunk_text(&frame.data).unwrap_or_else(|| frame.data.clone());
    Dispatch::Send(StreamEvent::Chunk { raw: frame.data, text })
}

/// Process an SSE stream from the Gemini API
///
/// Sends a [`StreamEvent::Chunk`] per event and [`StreamEvent::Done`] at
/// the end of the body. Respects the cancellation token.
pub async fn process_stream(
    response: Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel_token: CancellationToken,
) -> Result<(), GeminiError> {
    pump(response, tx, cancel_token, classify_provider).await
}

/// Process an SSE stream re-emitted by the proxy endpoint
pub async fn process_proxy_stream(
    response: Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel_token: CancellationToken,
) -> Result<(), GeminiError> {
    pump(response, tx, cancel_token, classify_proxy).await
}

async fn pump(
    response: Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel_token: CancellationToken,
    classify: fn(SseFrame) -> Dispatch,
) -> Result<(), GeminiError> {
    let mut stream = response.bytes_stream();
    let mut decoder = SseBuffer::new();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                return Err(GeminiError::Cancelled);
            }

            chunk = stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        for frame in decoder.push(&bytes) {
                            match classify(frame) {
                                Dispatch::Send(event) => {
                                    // Exit quietly if the receiver is gone
                                    if tx.send(event).await.is_err() {
                                        return Ok(());
                                    }
                                }
                                Dispatch::Skip => {}
                                Dispatch::Finish => {
                                    let _ = tx.send(StreamEvent::Done).await;
                                    return Ok(());
                                }
                                Dispatch::Fail(e) => return Err(e),
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(GeminiError::RequestError(e));
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        match classify(frame) {
            Dispatch::Send(event) => {
                if tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
            Dispatch::Fail(e) => return Err(e),
            Dispatch::Skip | Dispatch::Finish => {}
        }
    }

    let _ = tx.send(StreamEvent::Done).await;
    Ok(())
}
