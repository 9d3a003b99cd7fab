//! Configuration loading
//!
//! Resolution order is env > config file > default. The config file lives at
//! `~/.config/lazarillo/config.toml`; all of its fields are optional, so it
//! acts as a partial overlay on the defaults.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::settings;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default API base URL
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default hard timeout for one model request, in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key (never logged)
    pub api_key: SecretString,

    /// Model identifier (e.g. "gemini-2.5-flash")
    pub model: String,

    /// API base URL
    pub api_base: String,

    /// Hard timeout for one model request
    pub request_timeout: Duration,

    /// User settings file, when one is configured or discoverable
    pub settings_path: Option<PathBuf>,
}

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Model configuration
    #[serde(default)]
    pub model: ModelFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// User settings file location
    #[serde(default)]
    pub settings: SettingsLocationFileConfig,
}

/// Model-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// Model identifier
    pub name: Option<String>,

    /// API base URL override
    pub api_base: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
}

/// User settings file location
#[derive(Debug, Default, Deserialize)]
pub struct SettingsLocationFileConfig {
    /// Path to the user settings file
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from env vars and the config file
    #[must_use]
    pub fn load() -> Self {
        Self::resolve(load_config_file())
    }

    /// Merge a parsed config file with env overrides and defaults
    fn resolve(fc: ConfigFile) -> Self {
        let api_key = std::env::var("LAZARILLO_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .ok()
            .or(fc.api_keys.gemini)
            .unwrap_or_default();

        let model = std::env::var("LAZARILLO_MODEL")
            .ok()
            .or(fc.model.name)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_base = std::env::var("LAZARILLO_API_BASE")
            .ok()
            .or(fc.model.api_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let timeout_secs = std::env::var("LAZARILLO_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .or(fc.model.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let settings_path = std::env::var("LAZARILLO_SETTINGS")
            .ok()
            .or(fc.settings.path)
            .map(PathBuf::from)
            .or_else(settings::settings_file_path);

        Self {
            api_key: SecretString::new(api_key.into()),
            model,
            api_base,
            request_timeout: Duration::from_secs(timeout_secs),
            settings_path,
        }
    }
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/lazarillo/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lazarillo").join("config.toml"))
}
