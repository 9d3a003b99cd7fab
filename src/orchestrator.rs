//! Turn orchestration
//!
//! The state machine at the center of the assistant. One turn at a time
//! walks through Listening, Processing, and Speaking; every pipeline
//! failure degrades into an error event plus a spoken apology rather than a
//! crash, because the user may not be able to read a broken screen. UI
//! concerns stay on the far side of an event channel.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::model::ModelClient;
use crate::reply::{ComposedReply, compose};
use crate::settings::{Language, SettingsProvider, UserPreferences};
use crate::speech::{Haptics, SpeechInput, SpeechOutput};
use crate::{Error, Result, hazard};

/// Where the current turn is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnState {
    /// Ready for a new turn
    #[default]
    Idle,

    /// Capturing an utterance
    Listening,

    /// Waiting on the model
    Processing,

    /// Delivering the reply
    Speaking,
}

/// Events for a UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Localized status label changed
    StateChanged(String),

    /// A reply is being delivered; carries the display text
    Speaking(String),

    /// A turn failed; carries a human-readable description
    Error(String),
}

/// Turn state plus the cancellation token for the capture in flight
///
/// The two update together under one lock, so a stop request can only reach
/// the capture it was aimed at. The token dies with its turn: a notification
/// left on it after the capture already resolved is discarded along with it
/// instead of leaking into the next turn.
#[derive(Default)]
struct TurnSlot {
    state: TurnState,
    cancel_listen: Option<Arc<Notify>>,
}

/// Drives one turn at a time through the model and speech services
///
/// Injected trait objects keep the orchestrator testable: scripted fakes
/// stand in for the model, the recognizer, the voice, and the motor.
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    settings: Arc<dyn SettingsProvider>,
    input: Arc<dyn SpeechInput>,
    output: Arc<dyn SpeechOutput>,
    haptics: Arc<dyn Haptics>,
    turn: Mutex<TurnSlot>,
    events: UnboundedSender<UiEvent>,
}

impl Orchestrator {
    /// Create an orchestrator and the UI event stream it feeds
    #[must_use]
    pub fn new(
        model: Arc<dyn ModelClient>,
        settings: Arc<dyn SettingsProvider>,
        input: Arc<dyn SpeechInput>,
        output: Arc<dyn SpeechOutput>,
        haptics: Arc<dyn Haptics>,
    ) -> (Self, UnboundedReceiver<UiEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        (
            Self {
                model,
                settings,
                input,
                output,
                haptics,
                turn: Mutex::new(TurnSlot::default()),
                events,
            },
            receiver,
        )
    }

    /// Current turn state
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Run one turn for an already-captured question
    ///
    /// Pipeline failures (network, auth, refusal, parse) are not returned:
    /// they become a `UiEvent::Error` plus a spoken apology, and the
    /// orchestrator goes back to `Idle`. The `Err` case is strictly turn
    /// admission.
    ///
    /// # Errors
    ///
    /// `TurnInProgress` when a turn is already processing or speaking.
    pub async fn process_question(&self, question: &str, image: Option<&[u8]>) -> Result<()> {
        if !self.try_transition(
            &[TurnState::Idle, TurnState::Listening],
            TurnState::Processing,
        ) {
            return Err(Error::TurnInProgress);
        }

        // One consistent snapshot per turn; a toggle flipped mid-turn
        // applies from the next turn.
        let prefs = self.settings.snapshot();
        let lang = prefs.voice_language;
        let turn = Uuid::new_v4();

        tracing::info!(turn = %turn, with_image = image.is_some(), "processing question");
        self.emit(UiEvent::StateChanged(thinking_label(lang).to_string()));

        match self.model.generate(question, image, lang).await {
            Ok(text) => {
                let flags = hazard::classify(&text);
                let reply = compose(&text, flags, &prefs);
                tracing::debug!(
                    turn = %turn,
                    ground = flags.ground,
                    head = flags.head,
                    haptic = reply.trigger_haptic,
                    "reply composed"
                );
                self.deliver(&reply, &prefs).await;
            }
            Err(e) => {
                tracing::error!(turn = %turn, error = %e, "turn failed");
                self.emit(UiEvent::Error(e.to_string()));

                let phrase = match e {
                    Error::Parse(_) => parse_fallback_phrase(lang),
                    _ => apology_phrase(lang),
                };
                if prefs.voice_enabled {
                    self.output.speak(phrase).await;
                }
            }
        }

        self.set_state(TurnState::Idle);
        self.emit(UiEvent::StateChanged(ready_label(lang).to_string()));
        Ok(())
    }

    /// Capture one utterance and run it as a turn
    ///
    /// A recognition failure does not abort the turn: the localized retry
    /// prompt is substituted as the transcript and flows to the model, so
    /// the user hears an answer either way. Deliberate cancellation (see
    /// [`stop_listening`](Self::stop_listening)) ends the turn quietly.
    ///
    /// # Errors
    ///
    /// `TurnInProgress` when a turn is already running.
    pub async fn run_voice_turn(&self, image: Option<&[u8]>) -> Result<()> {
        let Some(cancel) = self.begin_listening() else {
            return Err(Error::TurnInProgress);
        };

        let lang = self.settings.snapshot().voice_language;
        self.emit(UiEvent::StateChanged(listening_label(lang).to_string()));

        let transcript = tokio::select! {
            result = self.input.listen() => result,
            () = cancel.notified() => Err(Error::Cancelled),
        };

        let question = match transcript {
            Ok(text) => text,
            Err(Error::Cancelled) => {
                tracing::debug!("listening cancelled");
                self.set_state(TurnState::Idle);
                self.emit(UiEvent::StateChanged(ready_label(lang).to_string()));
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech capture failed, substituting retry prompt");
                misheard_phrase(lang).to_string()
            }
        };

        self.process_question(&question, image).await
    }

    /// Cancel a pending voice capture, if any
    ///
    /// Safe to call at any time; does nothing unless a capture is in flight.
    pub fn stop_listening(&self) {
        let cancel = self
            .turn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_listen
            .clone();

        if let Some(cancel) = cancel {
            self.input.stop();
            // notify_one stores a permit, so the cancel lands even when the
            // capture future has not been polled yet.
            cancel.notify_one();
        }
    }

    /// Speak arbitrary text, honoring the voice preference. Emits no events.
    pub async fn say(&self, text: &str) {
        if self.settings.snapshot().voice_enabled {
            self.output.speak(text).await;
        }
    }

    /// Announce readiness and greet the user
    pub async fn greet(&self) {
        let lang = self.settings.snapshot().voice_language;
        self.emit(UiEvent::StateChanged(ready_label(lang).to_string()));
        self.say(greeting_phrase(lang)).await;
    }

    /// Pulse, announce, and speak one composed reply
    async fn deliver(&self, reply: &ComposedReply, prefs: &UserPreferences) {
        self.set_state(TurnState::Speaking);

        // Pulse lands before the voice starts so the warning is felt first.
        if reply.trigger_haptic && prefs.haptic_enabled {
            self.haptics.pulse(true);
        }

        self.emit(UiEvent::Speaking(reply.display_text.clone()));

        if prefs.voice_enabled {
            self.output.speak(&reply.spoken_text).await;
        }
    }

    /// Enter `Listening` from `Idle` and install a fresh capture token
    fn begin_listening(&self) -> Option<Arc<Notify>> {
        let mut slot = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.state == TurnState::Idle {
            let cancel = Arc::new(Notify::new());
            slot.state = TurnState::Listening;
            slot.cancel_listen = Some(cancel.clone());
            Some(cancel)
        } else {
            None
        }
    }

    /// Atomically move to `to` when currently in one of `from`
    ///
    /// Leaving `Listening` through here also retires the capture token.
    fn try_transition(&self, from: &[TurnState], to: TurnState) -> bool {
        let mut slot = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        if from.contains(&slot.state) {
            slot.state = to;
            slot.cancel_listen = None;
            true
        } else {
            false
        }
    }

    fn set_state(&self, to: TurnState) {
        let mut slot = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        slot.state = to;
        slot.cancel_listen = None;
    }

    /// Fire-and-forget event publish; a dropped receiver never fails a turn
    fn emit(&self, event: UiEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("UI event receiver dropped, event discarded");
        }
    }
}

fn listening_label(language: Language) -> &'static str {
    match language {
        Language::Es => "Te escucho...",
        Language::En => "Listening...",
        Language::Pt => "Estou ouvindo...",
    }
}

fn thinking_label(language: Language) -> &'static str {
    match language {
        Language::Es | Language::Pt => "Pensando...",
        Language::En => "Thinking...",
    }
}

fn ready_label(language: Language) -> &'static str {
    match language {
        Language::Es => "Listo",
        Language::En => "Ready",
        Language::Pt => "Pronto",
    }
}

fn greeting_phrase(language: Language) -> &'static str {
    match language {
        Language::Es => "Hola, soy Lazarillo. ¿En qué puedo ayudarte?",
        Language::En => "Hi, I'm Lazarillo. How can I help you?",
        Language::Pt => "Olá, sou o Lazarillo. Como posso ajudar?",
    }
}

fn apology_phrase(language: Language) -> &'static str {
    match language {
        Language::Es => "Lo siento, ha ocurrido un error. Inténtalo de nuevo.",
        Language::En => "Sorry, something went wrong. Please try again.",
        Language::Pt => "Desculpe, ocorreu um erro. Tente de novo.",
    }
}

/// Spoken when the model answered but the reply could not be read
fn parse_fallback_phrase(language: Language) -> &'static str {
    match language {
        Language::Es => "Recibí la imagen pero no pude leer la descripción.",
        Language::En => "I received the image but could not read the description.",
        Language::Pt => "Recebi a imagem mas não consegui ler a descrição.",
    }
}

/// Substituted as the transcript when speech capture fails
fn misheard_phrase(language: Language) -> &'static str {
    match language {
        Language::Es => "No te escuché bien, intenta de nuevo.",
        Language::En => "I didn't hear you well, please try again.",
        Language::Pt => "Não ouvi bem, tente de novo.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(TurnState::default(), TurnState::Idle);
    }

    #[test]
    fn phrases_are_localized() {
        for lang in [Language::Es, Language::En, Language::Pt] {
            assert!(!listening_label(lang).is_empty());
            assert!(!greeting_phrase(lang).is_empty());
            assert!(!apology_phrase(lang).is_empty());
        }
        assert_eq!(misheard_phrase(Language::Es), "No te escuché bien, intenta de nuevo.");
        assert_ne!(ready_label(Language::Es), ready_label(Language::En));
    }
}
