//! Action lifecycle, failures and user-facing notifications

use std::fmt;

use thiserror::Error;

use crate::gemini::GeminiError;

/// User-triggered generation actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Generate visual + description content for a topic
    Content,
    /// Correct previously generated content
    Fix,
    /// Generate a quiz from existing content
    Quiz,
    /// Generate the context paragraph for a topic
    AutoContext,
    /// Build a workspace from a syllabus
    Structure,
    /// Send free-form context
    SendContext,
    /// Apply an externally obtained response
    Apply,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Content => "content",
            Self::Fix => "fix",
            Self::Quiz => "quiz",
            Self::AutoContext => "auto-context",
            Self::Structure => "structure",
            Self::SendContext => "send-context",
            Self::Apply => "apply",
        };
        f.write_str(label)
    }
}

/// Per-action state
///
/// `Idle -> Requesting -> Parsing -> Applied`, or `Failed` from either
/// of the middle states. Terminal states return to `Idle` when
/// acknowledged or when the action runs again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActionState {
    #[default]
    Idle,
    Requesting,
    Parsing,
    Applied,
    Failed,
}

impl ActionState {
    /// The action has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied | Self::Failed)
    }
}

/// Why an action failed
///
/// None of these leave stored state modified.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Rejected before any call was made
    #[error("{0}")]
    Validation(String),

    /// The generation call failed
    #[error("Generation failed: {0}")]
    Transport(#[from] GeminiError),

    /// The response could not be interpreted; the raw text is kept for retry
    #[error("Could not read the response: {reason}")]
    Malformed {
        /// What was missing or invalid
        reason: String,
        /// Raw response text
        raw: String,
    },

    /// Reading or writing the workspace store failed
    #[error("Failed to save: {0:#}")]
    Persistence(anyhow::Error),

    /// The target workspace or topic no longer exists
    #[error("{0} not found")]
    NotFound(String),
}

impl ActionError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::Malformed { reason: reason.into(), raw: raw.to_string() }
    }

    /// Whether retrying the same action may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Malformed { .. } => true,
            Self::Transport(e) => e.is_recoverable(),
            Self::Persistence(_) | Self::NotFound(_) => false,
        }
    }

    /// Raw response retained by a malformed failure
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Malformed { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Message surfaced to the user after an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Info, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NotificationLevel::Error, message: message.into() }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

impl From<&ActionError> for Notification {
    fn from(err: &ActionError) -> Self {
        let message = match err {
            ActionError::Transport(e) if e.requires_reauth() => {
                format!("{}. Check the configured API key", err)
            }
            _ => err.to_string(),
        };
        Self::error(message)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
