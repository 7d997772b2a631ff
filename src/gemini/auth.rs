//! API key management using the environment and the system keyring

use keyring::Entry;

use super::error::GeminiError;

/// Environment variable checked before the keyring
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Service name for keyring storage
const SERVICE_NAME: &str = "npvision";
/// Entry name for the API key
const API_KEY_ENTRY: &str = "gemini-api-key";

/// Where an API key was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Keyring,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => write!(f, "environment ({})", API_KEY_ENV),
            Self::Keyring => write!(f, "system keyring"),
        }
    }
}

/// Manages Gemini API key storage
pub struct ApiKeyManager;

impl ApiKeyManager {
    /// Get the API key, preferring `GEMINI_API_KEY` over the keyring
    pub fn get_api_key() -> Result<String, GeminiError> {
        Self::resolve().map(|(key, _)| key)
    }

    /// Get the API key together with where it came from
    pub fn resolve() -> Result<(String, KeySource), GeminiError> {
        if let Some(key) = Self::from_env_value(std::env::var(API_KEY_ENV).ok()) {
            return Ok((key, KeySource::Environment));
        }

        let entry = Entry::new(SERVICE_NAME, API_KEY_ENTRY)
            .map_err(|e| GeminiError::KeyringError(e.to_string()))?;

        let key = entry.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => GeminiError::ApiKeyNotFound,
            _ => GeminiError::KeyringError(e.to_string()),
        })?;
        Ok((key, KeySource::Keyring))
    }

    fn from_env_value(value: Option<String>) -> Option<String> {
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    /// Store the API key in system keyring
    pub fn set_api_key(key: &str) -> Result<(), GeminiError> {
        let key = key.trim();
        if !Self::validate_key_format(key) {
            return Err(GeminiError::InvalidApiKey);
        }

        let entry = Entry::new(SERVICE_NAME, API_KEY_ENTRY)
            .map_err(|e| GeminiError::KeyringError(e.to_string()))?;

        entry.set_password(key).map_err(|e| GeminiError::KeyringError(e.to_string()))
    }

    /// Check if an API key is available
    pub fn has_api_key() -> bool {
        Self::get_api_key().is_ok()
    }

    /// Delete the stored API key
    pub fn delete_api_key() -> Result<(), GeminiError> {
        let entry = Entry::new(SERVICE_NAME, API_KEY_ENTRY)
            .map_err(|e| GeminiError::KeyringError(e.to_string()))?;

        entry.delete_credential().map_err(|e| GeminiError::KeyringError(e.to_string()))
    }

    /// Validate API key format
    fn validate_key_format(key: &str) -> bool {
        // Google API keys start with "AIza" and are 39 characters long
        key.starts_with("AIza") && key.len() >= 30
    }

    /// Mask an API key for display (show first 8 and last 4 chars)
    pub fn mask_key(key: &str) -> String {
        if key.len() <= 12 {
            return "*".repeat(key.len());
        }
        let prefix = &key[..8];
        let suffix = &key[key.len() - 4..];
        format!("{}...{}", prefix, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_key_format() {
        assert!(ApiKeyManager::validate_key_format("AIzaSyA1234567890abcdefghijklmnopqrs"));
        assert!(!ApiKeyManager::validate_key_format("sk-ant-REDACTED"));
        assert!(!ApiKeyManager::validate_key_format("AIzaShort"));
    }

    #[test]
    fn env_value_is_trimmed_and_ignored_when_blank() {
        assert_eq!(ApiKeyManager::from_env_value(Some("  AIzaKey ".into())).as_deref(), Some("AIzaKey"));
        assert_eq!(ApiKeyManager::from_env_value(Some("   ".into())), None);
        assert_eq!(ApiKeyManager::from_env_value(None), None);
    }

    #[test]
    fn mask_key() {
        let masked = ApiKeyManager::mask_key("AIzaSyA1234567890abcdefghijklmnopqrs");
        assert!(masked.starts_with("AIzaSyA1"));
        assert!(masked.ends_with("pqrs"));
        assert!(masked.contains("..."));
        assert_eq!(ApiKeyManager::mask_key("short"), "*****");
    }
}
