//! Configuration management for NPVision

pub mod session;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::prompt::{Complexity, DEFAULT_QUESTION_COUNT, PromptContext, VisualTemplate};

/// Settings applied to every generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Visual template (`surprise-me`, `graph`, `presentation`, ...)
    pub template: VisualTemplate,
    /// Visualization style, e.g. `2d-animation`
    pub visualization: String,
    /// Concept complexity level (1-4)
    pub complexity: u8,
    /// Language of slides and descriptions
    pub content_language: String,
    /// Locale of the narration
    pub narration_language: String,
    /// Questions per generated quiz
    pub question_count: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            template: VisualTemplate::SurpriseMe,
            visualization: "2d-animation".to_string(),
            complexity: 2,
            content_language: "English".to_string(),
            narration_language: "en-IN".to_string(),
            question_count: DEFAULT_QUESTION_COUNT,
        }
    }
}

impl GenerationSettings {
    /// Complexity for the configured level; out-of-range levels fall back
    /// to the default
    pub fn complexity(&self) -> Complexity {
        Complexity::from_level(self.complexity).unwrap_or_default()
    }

    /// Copy the language and complexity settings onto a prompt context
    pub fn apply_to(&self, ctx: &mut PromptContext) {
        ctx.complexity = self.complexity();
        ctx.content_language = self.content_language.clone();
        ctx.narration_language = self.narration_language.clone();
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port for `npvision serve`
    pub port: u16,

    /// Model for buffered requests
    pub model: String,

    /// Model for streamed requests
    pub stream_model: String,

    /// Use a running proxy instead of calling the Gemini API directly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    /// Generation settings
    pub generation: GenerationSettings,

    /// Mirror topic descriptions into the files table
    pub mirror_files: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            model: "gemini-2.0-flash".to_string(),
            stream_model: "gemini-2.5-flash".to_string(),
            proxy_url: None,
            generation: GenerationSettings::default(),
            mirror_files: true,
        }
    }
}

impl Config {
    /// Load configuration from disk, or create default if not exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;
            serde_json::from_str(&contents).with_context(|| "Failed to parse config.json")
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let contents =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "npvision").context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.json"))
    }

    /// Get the data directory path (`workspaces.json`, `files.json`,
    /// `session.json`)
    pub fn data_dir() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "npvision").context("Failed to determine data directory")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.model, "gemini-2.0-flash");
        assert!(config.proxy_url.is_none());
        assert!(config.mirror_files);
        assert_eq!(config.generation.template, VisualTemplate::SurpriseMe);
        assert_eq!(config.generation.visualization, "2d-animation");
        assert_eq!(config.generation.question_count, 5);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let json = r#"{"port":8080,"generation":{"template":"graph","complexity":4}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.generation.template, VisualTemplate::Graph);
        assert_eq!(config.generation.complexity(), Complexity::Expert);
        assert_eq!(config.generation.content_language, "English");
    }

    #[test]
    fn out_of_range_complexity_falls_back() {
        let settings = GenerationSettings { complexity: 9, ..Default::default() };
        assert_eq!(settings.complexity(), Complexity::Intermediate);
    }

    #[test]
    fn apply_to_copies_languages() {
        let settings = GenerationSettings {
            complexity: 1,
            content_language: "Hindi".into(),
            narration_language: "hi-IN".into(),
            ..Default::default()
        };
        let mut ctx = PromptContext::for_topic("T", "C", "U", "W");
        settings.apply_to(&mut ctx);
        assert_eq!(ctx.complexity, Complexity::Basic);
        assert_eq!(ctx.content_language, "Hindi");
        assert_eq!(ctx.narration_language, "hi-IN");
    }

    #[test]
    fn load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.json");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let mut changed = config.clone();
        changed.proxy_url = Some("http://localhost:3000".into());
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
    }
}
