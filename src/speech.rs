//! Speech and haptic service seams
//!
//! The platform engines (recognizer, synthesizer, vibration motor) live in
//! the embedding app. The orchestrator drives them through these traits and
//! never learns which engine sits behind them.

use async_trait::async_trait;

use crate::Result;

/// One-shot speech capture
#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Capture a single utterance and return its transcript
    ///
    /// # Errors
    ///
    /// `Recognition` when the engine failed to produce a transcript;
    /// `Cancelled` when the capture was deliberately aborted.
    async fn listen(&self) -> Result<String>;

    /// Abort an in-flight `listen`
    ///
    /// Idempotent; a no-op when nothing is being captured.
    fn stop(&self);
}

/// Speech synthesis
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Queue text for speaking
    ///
    /// Implementations return promptly and log their own failures; a turn
    /// never fails because the voice did.
    async fn speak(&self, text: &str);
}

/// Vibration pulses
pub trait Haptics: Send + Sync {
    /// Fire one pulse. Strong pulses accompany hazard warnings; soft pulses
    /// are for ambient cues.
    fn pulse(&self, strong: bool);
}
