//! Lazarillo - voice assistant orchestration core for visually-impaired users
//!
//! This library is the engine of the assistant:
//! - Gemini model client (text + inline camera frames)
//! - Hazard classification of replies (protocol markers + keyword fallback)
//! - Reply composition (marker stripping, localized warnings, haptic intent)
//! - Turn orchestration over injected speech, haptic, and settings services
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Embedding app                       │
//! │   Microphone  │  Speaker  │  Camera  │  Screen      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ SpeechInput / SpeechOutput / Haptics / UiEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Orchestrator                        │
//! │   Turn state  │  Hazard flags  │  Reply composer    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ ModelClient
//! ┌────────────────────▼────────────────────────────────┐
//! │            Gemini generateContent API                │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod hazard;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod reply;
pub mod settings;
pub mod speech;

pub use config::Config;
pub use error::{Error, Result};
pub use hazard::{DangerFlags, classify};
pub use model::{GeminiClient, ModelClient};
pub use orchestrator::{Orchestrator, TurnState, UiEvent};
pub use reply::{ComposedReply, compose};
pub use settings::{
    InMemorySettings, Language, SettingsFile, SettingsProvider, UserPreferences,
};
pub use speech::{Haptics, SpeechInput, SpeechOutput};
