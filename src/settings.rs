//! User preferences and the settings provider seam
//!
//! The orchestrator reads a fresh [`UserPreferences`] snapshot at the start
//! of every turn through [`SettingsProvider`], so a settings screen can flip
//! a toggle mid-session and the very next turn honors it. Nothing here is
//! cached.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Reply language for prompts, warnings, and canned phrases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    /// Spanish (deployment default)
    #[default]
    #[serde(rename = "es")]
    Es,

    /// English
    #[serde(rename = "en")]
    En,

    /// Portuguese
    #[serde(rename = "pt")]
    Pt,
}

impl Language {
    /// Two-letter code used in config files and on the CLI
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::En => "en",
            Self::Pt => "pt",
        }
    }

    /// Parse a language code; unknown codes fall back to Spanish
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Self::En,
            "pt" => Self::Pt,
            _ => Self::Es,
        }
    }

    /// Language name as interpolated into the persona prompt (in Spanish,
    /// because the persona instruction itself is written in Spanish)
    #[must_use]
    pub const fn prompt_name(self) -> &'static str {
        match self {
            Self::Es => "español",
            Self::En => "inglés",
            Self::Pt => "portugués",
        }
    }
}

/// Per-user accessibility preferences
///
/// Defaults are maximally assistive: everything on, Spanish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Reply language
    pub voice_language: Language,

    /// Speak replies aloud
    pub voice_enabled: bool,

    /// Allow vibration pulses
    pub haptic_enabled: bool,

    /// Master switch for hazard warnings
    pub obstacle_alerts: bool,

    /// Warn about ground-level obstacles (holes, steps, potholes)
    pub floor_alerts: bool,

    /// Warn about head-height obstacles (branches, signs, low frames)
    pub head_alerts: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            voice_language: Language::Es,
            voice_enabled: true,
            haptic_enabled: true,
            obstacle_alerts: true,
            floor_alerts: true,
            head_alerts: true,
        }
    }
}

/// Read-only source of user preferences
///
/// Implementations must be cheap to call: the orchestrator snapshots on
/// every turn instead of caching.
pub trait SettingsProvider: Send + Sync {
    /// Current preferences
    fn snapshot(&self) -> UserPreferences;
}

/// In-process settings store, the default provider and the test seam
#[derive(Debug, Default)]
pub struct InMemorySettings {
    prefs: RwLock<UserPreferences>,
}

impl InMemorySettings {
    #[must_use]
    pub fn new(prefs: UserPreferences) -> Self {
        Self {
            prefs: RwLock::new(prefs),
        }
    }

    /// Replace the stored preferences
    pub fn update(&self, prefs: UserPreferences) {
        *self.prefs.write().unwrap_or_else(PoisonError::into_inner) = prefs;
    }
}

impl SettingsProvider for InMemorySettings {
    fn snapshot(&self) -> UserPreferences {
        self.prefs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// File-backed settings, re-read on every snapshot
///
/// A companion app can rewrite the file between turns. A missing file or a
/// parse failure logs a warning and yields defaults rather than killing the
/// turn.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for SettingsFile {
    fn snapshot(&self) -> UserPreferences {
        if !self.path.exists() {
            return UserPreferences::default();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(prefs) => prefs,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "failed to parse settings file, using defaults"
                    );
                    UserPreferences::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read settings file"
                );
                UserPreferences::default()
            }
        }
    }
}

/// Return the default settings file path: `~/.config/lazarillo/settings.toml`
#[must_use]
pub fn settings_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lazarillo").join("settings.toml"))
}
