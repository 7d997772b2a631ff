//! Data models for Gemini API requests and responses

use serde::{Deserialize, Serialize};

/// Known Gemini models
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.0 Flash - default for buffered generation
    #[default]
    Flash20,
    /// Gemini 2.5 Flash - default for streaming
    Flash25,
    /// Gemini 2.5 Pro - most capable
    Pro25,
}

impl GeminiModel {
    /// Get the API model identifier
    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Flash20 => "gemini-2.0-flash",
            Self::Flash25 => "gemini-2.5-flash",
            Self::Pro25 => "gemini-2.5-pro",
        }
    }

    /// Get a human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Flash20 => "Gemini 2.0 Flash",
            Self::Flash25 => "Gemini 2.5 Flash",
            Self::Pro25 => "Gemini 2.5 Pro",
        }
    }

    /// Parse model from a short name or model ID
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "flash" | "flash2" | "flash-2.0" | "gemini-2.0-flash" => Some(Self::Flash20),
            "flash2.5" | "flash-2.5" | "gemini-2.5-flash" => Some(Self::Flash25),
            "pro" | "pro2.5" | "gemini-2.5-pro" => Some(Self::Pro25),
            _ => None,
        }
    }

    /// List all known models
    pub fn all() -> &'static [GeminiModel] {
        &[Self::Flash20, Self::Flash25, Self::Pro25]
    }

    /// Resolve a configured model name to an API identifier
    ///
    /// Unknown names are passed through so newer models work without an
    /// update.
    pub fn resolve_id(name: &str) -> String {
        Self::parse(name).map_or_else(|| name.trim().to_string(), |m| m.model_id().to_string())
    }
}

/// A generation request as accepted by the proxy endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Prompt text
    #[serde(default)]
    pub prompt: String,
    /// Optional model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerateRequest {
    /// Request with the default model
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), model: None }
    }
}

/// Successful buffered reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateReply {
    pub success: bool,
    pub content: String,
}

/// Error reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Request body for `generateContent` / `streamGenerateContent`
#[derive(Debug, Clone, Serialize)]
pub struct GeminiRequest {
    pub contents: Vec<Content>,
}

impl GeminiRequest {
    /// Single-turn request for a prompt
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self { contents: vec![Content { role: None, parts: vec![Part { text: Some(prompt.into()) }] }] }
    }
}

/// A content turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part (only text parts are used)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Response body, also the shape of every streamed chunk
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// A response candidate
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl GeminiResponse {
    /// Text of the first candidate, if any
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }
}

/// Extract the text from a raw streamed chunk payload
pub fn chunk_text(raw: &str) -> Option<String> {
    serde_json::from_str::<GeminiResponse>(raw).ok()?.text()
}

/// Events delivered by a streaming generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk arrived
    Chunk {
        /// Payload as received from the provider
        raw: String,
        /// Text carried by the chunk
        text: String,
    },
    /// The stream completed
    Done,
    /// The stream failed
    Error {
        /// Error message
        message: String,
    },
}
