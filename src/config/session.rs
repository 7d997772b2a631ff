//! Session state persistence
//!
//! Remembers the open workspace, the selected topic and the last
//! prompt/response pair so a later command (or a later run) can pick up
//! where the previous one stopped. A single shared value, last write wins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::Config;

/// Current selection and scratch state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Open workspace
    pub workspace_id: Option<u64>,
    /// Selected topic within the open workspace
    pub topic_id: Option<String>,
    /// User-supplied or auto-generated context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_context: Option<String>,
    /// Last prompt sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_prompt: Option<String>,
    /// Last raw response received, kept for fixes and manual apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_response: Option<String>,
}

impl Session {
    /// Load session from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::session_path()?)
    }

    /// Load session from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read session from {:?}", path))?;
            serde_json::from_str(&contents).with_context(|| "Failed to parse session.json")
        } else {
            Ok(Self::default())
        }
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::session_path()?)
    }

    /// Save session to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize session")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write session to {:?}", path))?;

        Ok(())
    }

    /// Get the path to the session file
    fn session_path() -> Result<PathBuf> {
        Ok(Config::data_dir()?.join("session.json"))
    }

    /// Open a workspace, clearing the topic selection when it changes
    pub fn open_workspace(&mut self, workspace_id: u64) {
        if self.workspace_id != Some(workspace_id) {
            self.topic_id = None;
        }
        self.workspace_id = Some(workspace_id);
    }

    /// Select a topic in a workspace
    pub fn select(&mut self, workspace_id: u64, topic_id: &str) {
        self.workspace_id = Some(workspace_id);
        self.topic_id = Some(topic_id.to_string());
    }

    /// Custom context, if non-blank
    pub fn context(&self) -> Option<&str> {
        self.custom_context.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}
