//! Workspace data model
//!
//! A workspace owns an ordered list of root topics. The same recursive
//! [`Topic`] node is used at every level of the hierarchy; its role is derived
//! from nesting depth (0 = unit, 1 = chapter, 2+ = topic).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::Quiz;

/// Note key used for the workspace-wide notepad
pub const GENERAL_NOTE: &str = "general";

/// Generation status of a topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    /// No content generated yet
    #[default]
    Pending,
    /// Content has been attached
    Ready,
}

/// Visual payload attached to a topic
///
/// Either a complete HTML document or a typed JSON document rendered by a
/// template on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisualPayload {
    /// Full `<!DOCTYPE html>` document
    Html(String),
    /// JSON payload from a `<visualjson>` block
    Json(serde_json::Value),
}

impl VisualPayload {
    /// Render the payload as text for prompt grounding
    pub fn to_prompt_text(&self) -> String {
        match self {
            Self::Html(html) => html.clone(),
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// Generated content attached to a topic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicContent {
    /// Visual block (HTML document or JSON payload)
    #[serde(rename = "visualHTML", default, skip_serializing_if = "Option::is_none")]
    pub visual_html: Option<VisualPayload>,
    /// `html` or the `type` attribute of the `<visualjson>` block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_type: Option<String>,
    /// Description markup (pages of HTML-ish text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A node in the workspace tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique identifier within the workspace
    pub id: String,
    /// Display name
    pub name: String,
    /// Generation status
    #[serde(default)]
    pub status: TopicStatus,
    /// Learning objective (from AI-generated outlines)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    /// Generated content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<TopicContent>,
    /// Generated quiz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Quiz>,
    /// Child nodes
    #[serde(default)]
    pub subtopics: Vec<Topic>,
}

impl Topic {
    /// Create a pending node with no children
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: TopicStatus::Pending,
            objective: None,
            content: None,
            quiz: None,
            subtopics: Vec::new(),
        }
    }

    /// Set the learning objective
    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    /// Append a child node
    pub fn with_child(mut self, child: Topic) -> Self {
        self.subtopics.push(child);
        self
    }

    /// Attach generated content and mark the node ready
    pub fn attach_content(&mut self, content: TopicContent) {
        self.content = Some(content);
        self.status = TopicStatus::Ready;
    }

    /// Whether content has been generated for this node
    pub fn is_ready(&self) -> bool {
        self.status == TopicStatus::Ready
    }

    /// Description markup, if any
    pub fn description(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.description.as_deref())
    }
}

/// A study workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    /// Timestamp-derived identifier
    pub id: u64,
    /// Display title
    pub title: String,
    /// Set on the automatically seeded workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    /// Root nodes (units)
    #[serde(default)]
    pub topics: Vec<Topic>,
    /// Free-form notes by key
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// Create an empty workspace with a fresh id
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: next_workspace_id(),
            title: title.into(),
            is_default: None,
            topics: Vec::new(),
            notes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether this is the protected default workspace
    pub fn is_default(&self) -> bool {
        self.is_default.unwrap_or(false)
    }

    /// Set a note
    pub fn set_note(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.notes.insert(key.into(), text.into());
    }

    /// Get a note
    pub fn note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}

static LAST_WORKSPACE_ID: AtomicU64 = AtomicU64::new(0);
static NODE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Next workspace id: current time in milliseconds, strictly increasing within
/// the process
pub fn next_workspace_id() -> u64 {
    let now = now_millis();
    let mut last = LAST_WORKSPACE_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_WORKSPACE_ID.compare_exchange_weak(
            last,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Generate a node id such as `topic-1700000000000-3`
pub fn node_id(prefix: &str) -> String {
    let seq = NODE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, now_millis(), seq)
}
