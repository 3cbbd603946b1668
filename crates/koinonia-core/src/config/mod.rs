//! Configuration loading and validation.
//!
//! JSON5 format with camelCase keys.
//! Config location: `~/.koinonia/koinonia.json`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::storage::KeyPattern;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Hosted auth/database service.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Session and profile behaviour.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Route guard settings.
    #[serde(default)]
    pub routes: RoutesConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("KOINONIA_SERVICE_URL") {
            self.service.url = Some(url);
        }
        if let Ok(key) = std::env::var("KOINONIA_ANON_KEY") {
            self.service.anon_key = Some(key);
        }
        self
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("koinonia.json")
    }

    /// Get the Koinonia state directory.
    ///
    /// Uses `KOINONIA_STATE_DIR` env var if set, otherwise `~/.koinonia`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("KOINONIA_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".koinonia")
        } else {
            PathBuf::from(".koinonia")
        }
    }

    /// Get the persisted session storage directory.
    #[must_use]
    pub fn storage_dir() -> PathBuf {
        Self::state_dir().join("storage")
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.sign_out_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Sign-out timeout cannot be 0".to_string(),
            ));
        }

        if self.auth.profile_table.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Profile table name cannot be empty".to_string(),
            ));
        }

        if !self.routes.login_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "Login path '{}' must start with '/'",
                self.routes.login_path
            )));
        }

        if self.routes.redirect_param.is_empty() {
            return Err(ConfigError::Validation(
                "Redirect parameter name cannot be empty".to_string(),
            ));
        }

        if let Some(url) = &self.service.url {
            url::Url::parse(url)
                .map_err(|e| ConfigError::Validation(format!("Invalid service URL '{url}': {e}")))?;
        }

        Ok(())
    }
}

/// Hosted service connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Base URL (e.g. `https://abcd.supabase.co`).
    #[serde(default)]
    pub url: Option<String>,

    /// Public anonymous API key.
    #[serde(default)]
    pub anon_key: Option<String>,
}

impl ServiceConfig {
    /// Get the URL or fail with a helpful error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` if unset.
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        self.url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("service.url".to_string()))
    }

    /// Get the anon key or fail with a helpful error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingField` if unset.
    pub fn require_anon_key(&self) -> Result<&str, ConfigError> {
        self.anon_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("service.anonKey".to_string()))
    }
}

/// Session and profile behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// How long sign-out waits for the service before clearing local state.
    #[serde(default = "default_sign_out_timeout")]
    pub sign_out_timeout_secs: u64,

    /// Table holding profile rows.
    #[serde(default = "default_profile_table")]
    pub profile_table: String,

    /// Fall back to looking up profiles by email when the id lookup misses.
    #[serde(default = "default_true")]
    pub legacy_email_lookup: bool,

    /// Service-name token in persisted key names.
    #[serde(default = "default_service_token")]
    pub persisted_key_service_token: String,

    /// Auth token in persisted key names.
    #[serde(default = "default_auth_token")]
    pub persisted_key_auth_token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            sign_out_timeout_secs: default_sign_out_timeout(),
            profile_table: default_profile_table(),
            legacy_email_lookup: true,
            persisted_key_service_token: default_service_token(),
            persisted_key_auth_token: default_auth_token(),
        }
    }
}

impl AuthConfig {
    /// Get the sign-out timeout as Duration.
    #[must_use]
    pub fn sign_out_timeout(&self) -> Duration {
        Duration::from_secs(self.sign_out_timeout_secs)
    }

    /// Pattern matching persisted auth keys.
    #[must_use]
    pub fn key_pattern(&self) -> KeyPattern {
        KeyPattern::new(
            self.persisted_key_service_token.clone(),
            self.persisted_key_auth_token.clone(),
        )
    }
}

const fn default_sign_out_timeout() -> u64 {
    6
}

fn default_profile_table() -> String {
    "profiles".to_string()
}

fn default_service_token() -> String {
    "sb-".to_string()
}

fn default_auth_token() -> String {
    "auth".to_string()
}

const fn default_true() -> bool {
    true
}

/// Route guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesConfig {
    /// Login page path.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Query parameter carrying the original destination.
    #[serde(default = "default_redirect_param")]
    pub redirect_param: String,

    /// Where to land after login when no destination was captured.
    #[serde(default = "default_landing")]
    pub default_landing: String,

    /// Page to send under-privileged users to. When unset the guard reports
    /// an access-denied decision instead of redirecting.
    #[serde(default)]
    pub access_denied_path: Option<String>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            redirect_param: default_redirect_param(),
            default_landing: default_landing(),
            access_denied_path: None,
        }
    }
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_redirect_param() -> String {
    "redirect".to_string()
}

fn default_landing() -> String {
    "/".to_string()
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.sign_out_timeout_secs, 6);
        assert_eq!(config.auth.profile_table, "profiles");
        assert_eq!(config.routes.login_path, "/login");
        assert_eq!(config.routes.redirect_param, "redirect");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("koinonia.json");

        let mut config = Config::default();
        config.service.url = Some("https://abcd.supabase.co".to_string());
        config.routes.access_denied_path = Some("/403".to_string());

        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.service.url.as_deref(), Some("https://abcd.supabase.co"));
        assert_eq!(loaded.routes.access_denied_path.as_deref(), Some("/403"));
    }

    #[test]
    fn test_json5_parsing() {
        let json5_content = r#"{
            // Hosted project
            service: {
                url: "https://abcd.supabase.co",
                anonKey: "public-anon",
            },
            auth: {
                signOutTimeoutSecs: 3,
            },
            settings: { logFormat: "json" },
        }"#;

        let config: Config = json5::from_str(json5_content).unwrap();
        assert_eq!(config.auth.sign_out_timeout_secs, 3);
        assert_eq!(config.auth.profile_table, "profiles");
        assert_eq!(config.service.anon_key.as_deref(), Some("public-anon"));
        assert_eq!(config.settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.auth.sign_out_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.routes.login_path = "login".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.service.url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_service_fields() {
        let config = Config::default();
        assert!(matches!(
            config.service.require_url(),
            Err(ConfigError::MissingField(_))
        ));
        assert!(config.service.require_anon_key().is_err());
    }

    #[test]
    fn test_key_pattern_from_config() {
        let config = AuthConfig::default();
        let pattern = config.key_pattern();
        assert!(pattern.matches("sb-abcd-auth-token"));
        assert_eq!(config.sign_out_timeout(), Duration::from_secs(6));
    }
}
