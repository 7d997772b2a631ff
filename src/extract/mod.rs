//! Structured extraction from generated text
//!
//! Generated responses mix free text with tagged regions: a full HTML
//! document or a `<visualjson>` block for the visual, a `<description>` block
//! and optionally a `<quiz>` block. Each category is extracted independently;
//! a missing or broken block never prevents the others from being read.

pub mod quiz;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::workspace::model::{TopicContent, VisualPayload};

pub use quiz::{Question, Quiz, parse_quiz_block};

/// `visualType` value used for full HTML documents
pub const HTML_VISUAL: &str = "html";

static HTML_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<!DOCTYPE html>.*?</html>").unwrap());
static VISUAL_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<visualjson\s+type="([^"]+)"\s*>(.*?)</visualjson>"#).unwrap()
});
static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<description>(.*?)</description>").unwrap());
static QUIZ: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<quiz>(.*?)</quiz>").unwrap());

/// Blocks recovered from a generated response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedBlocks {
    /// HTML document or parsed visual JSON
    pub visual: Option<VisualPayload>,
    /// `html` or the `<visualjson>` type attribute
    pub visual_type: Option<String>,
    /// Description markup
    pub description: Option<String>,
    /// Parsed quiz
    pub quiz: Option<Quiz>,
}

impl ExtractedBlocks {
    /// True when a visual or a description was recovered
    ///
    /// A `<visualjson>` whose payload failed to parse only sets
    /// `visual_type` and does not count.
    pub fn has_content(&self) -> bool {
        self.visual.is_some() || self.description.is_some()
    }

    /// Content record for a topic (quiz is stored separately)
    pub fn to_content(&self) -> TopicContent {
        TopicContent {
            visual_html: self.visual.clone(),
            visual_type: self.visual_type.clone(),
            description: self.description.clone(),
        }
    }
}

/// Inner text of the first `<quiz>` region, if present
pub fn quiz_region(output: &str) -> Option<&str> {
    QUIZ.captures(output).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Extract all recognized blocks from generated output
pub fn extract_blocks(output: &str) -> ExtractedBlocks {
    let mut blocks = ExtractedBlocks::default();

    if let Some(m) = HTML_DOCUMENT.find(output) {
        blocks.visual = Some(VisualPayload::Html(m.as_str().to_string()));
        blocks.visual_type = Some(HTML_VISUAL.to_string());
    } else if let Some(caps) = VISUAL_JSON.captures(output) {
        let visual_type = caps[1].trim().to_string();
        let json_text = caps[2].trim();
        match serde_json::from_str::<serde_json::Value>(json_text) {
            Ok(value) => blocks.visual = Some(VisualPayload::Json(value)),
            Err(e) => tracing::warn!("Visual JSON ({}) failed to parse: {}", visual_type, e),
        }
        blocks.visual_type = Some(visual_type);
    }

    if let Some(inner) = DESCRIPTION.captures(output).and_then(|c| c.get(1)) {
        if !inner.as_str().is_empty() {
            blocks.description = Some(inner.as_str().trim().to_string());
        }
    }

    if let Some(inner) = quiz_region(output) {
        if !inner.is_empty() {
            blocks.quiz = parse_quiz_block(inner);
            if blocks.quiz.is_none() {
                tracing::warn!("Quiz block present but could not be parsed");
            }
        }
    }

    blocks
}
