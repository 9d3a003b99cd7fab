//! Assistant turn integration tests
//!
//! Drives the orchestrator end to end with scripted service fakes, no
//! network and no audio hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lazarillo::{
    Error, Haptics, InMemorySettings, Language, ModelClient, Orchestrator, SpeechInput,
    SpeechOutput, TurnState, UiEvent, UserPreferences,
};
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

/// Scripted model: records every call, pops canned results in order
struct ScriptedModel {
    replies: Mutex<VecDeque<lazarillo::Result<String>>>,
    calls: Mutex<Vec<ModelCall>>,
    delay: Option<Duration>,
}

#[derive(Debug, Clone)]
struct ModelCall {
    question: String,
    has_image: bool,
    language: Language,
}

impl ScriptedModel {
    fn new(replies: Vec<lazarillo::Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn with_delay(replies: Vec<lazarillo::Result<String>>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(replies)
        }
    }

    async fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(
        &self,
        question: &str,
        image: Option<&[u8]>,
        language: Language,
    ) -> lazarillo::Result<String> {
        self.calls.lock().await.push(ModelCall {
            question: question.to_string(),
            has_image: image.is_some(),
            language,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.replies
            .lock()
            .await
            .pop_front()
            .expect("model script exhausted")
    }
}

/// Records everything spoken
#[derive(Default)]
struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSpeech {
    async fn spoken(&self) -> Vec<String> {
        self.spoken.lock().await.clone()
    }
}

#[async_trait]
impl SpeechOutput for RecordingSpeech {
    async fn speak(&self, text: &str) {
        self.spoken.lock().await.push(text.to_string());
    }
}

/// Records haptic pulses
#[derive(Default)]
struct RecordingHaptics {
    pulses: std::sync::Mutex<Vec<bool>>,
}

impl RecordingHaptics {
    fn pulses(&self) -> Vec<bool> {
        self.pulses.lock().unwrap().clone()
    }
}

impl Haptics for RecordingHaptics {
    fn pulse(&self, strong: bool) {
        self.pulses.lock().unwrap().push(strong);
    }
}

/// Scripted microphone: pops canned capture results in order
struct ScriptedMic {
    utterances: Mutex<VecDeque<lazarillo::Result<String>>>,
}

impl ScriptedMic {
    fn new(utterances: Vec<lazarillo::Result<String>>) -> Self {
        Self {
            utterances: Mutex::new(utterances.into()),
        }
    }
}

#[async_trait]
impl SpeechInput for ScriptedMic {
    async fn listen(&self) -> lazarillo::Result<String> {
        self.utterances
            .lock()
            .await
            .pop_front()
            .expect("mic script exhausted")
    }

    fn stop(&self) {}
}

/// Microphone that never returns, for cancellation tests
#[derive(Default)]
struct HangingMic {
    stopped: AtomicBool,
}

#[async_trait]
impl SpeechInput for HangingMic {
    async fn listen(&self) -> lazarillo::Result<String> {
        std::future::pending::<()>().await;
        unreachable!("pending future resolved")
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Microphone that hangs on the first capture, then pops scripted results
struct StubbornMic {
    first_taken: AtomicBool,
    rest: Mutex<VecDeque<lazarillo::Result<String>>>,
}

impl StubbornMic {
    fn new(rest: Vec<lazarillo::Result<String>>) -> Self {
        Self {
            first_taken: AtomicBool::new(false),
            rest: Mutex::new(rest.into()),
        }
    }
}

#[async_trait]
impl SpeechInput for StubbornMic {
    async fn listen(&self) -> lazarillo::Result<String> {
        if !self.first_taken.swap(true, Ordering::SeqCst) {
            std::future::pending::<()>().await;
            unreachable!("pending future resolved");
        }

        self.rest
            .lock()
            .await
            .pop_front()
            .expect("mic script exhausted")
    }

    fn stop(&self) {}
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    events: UnboundedReceiver<UiEvent>,
    model: Arc<ScriptedModel>,
    speech: Arc<RecordingSpeech>,
    haptics: Arc<RecordingHaptics>,
    settings: Arc<InMemorySettings>,
}

/// Wire an orchestrator to scripted fakes
fn build(model: ScriptedModel, mic: Arc<dyn SpeechInput>, prefs: UserPreferences) -> Harness {
    let model = Arc::new(model);
    let speech = Arc::new(RecordingSpeech::default());
    let haptics = Arc::new(RecordingHaptics::default());
    let settings = Arc::new(InMemorySettings::new(prefs));

    let (orchestrator, events) = Orchestrator::new(
        model.clone(),
        settings.clone(),
        mic,
        speech.clone(),
        haptics.clone(),
    );

    Harness {
        orchestrator: Arc::new(orchestrator),
        events,
        model,
        speech,
        haptics,
        settings,
    }
}

fn no_mic() -> Arc<dyn SpeechInput> {
    Arc::new(ScriptedMic::new(vec![]))
}

/// Collect every event queued so far
fn drain(events: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Poll until the orchestrator reaches `target` or give up
async fn wait_for_state(orchestrator: &Orchestrator, target: TurnState) {
    for _ in 0..200 {
        if orchestrator.state() == target {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("orchestrator never reached {target:?}");
}

#[tokio::test]
async fn test_hazard_turn_warns_pulses_and_speaks() {
    let model = ScriptedModel::new(vec![Ok(
        "Hay una escalera justo delante. PELIGRO_SUELO".to_string()
    )]);
    let mut h = build(model, no_mic(), UserPreferences::default());

    h.orchestrator
        .process_question("¿qué hay delante?", None)
        .await
        .unwrap();

    let expected =
        "Cuidado: hay un obstáculo a nivel del suelo.\n\nHay una escalera justo delante.";
    assert_eq!(
        drain(&mut h.events),
        vec![
            UiEvent::StateChanged("Pensando...".to_string()),
            UiEvent::Speaking(expected.to_string()),
            UiEvent::StateChanged("Listo".to_string()),
        ]
    );
    assert_eq!(h.speech.spoken().await, vec![expected.to_string()]);
    assert_eq!(h.haptics.pulses(), vec![true]);
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
}

#[tokio::test]
async fn test_clean_turn_passes_through() {
    let model = ScriptedModel::new(vec![Ok("La mesa está a tu derecha. SIN_PELIGRO".to_string())]);
    let mut h = build(model, no_mic(), UserPreferences::default());

    h.orchestrator
        .process_question("¿dónde está la mesa?", None)
        .await
        .unwrap();

    let events = drain(&mut h.events);
    assert_eq!(
        events[1],
        UiEvent::Speaking("La mesa está a tu derecha.".to_string())
    );
    assert!(h.haptics.pulses().is_empty());

    let calls = h.model.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].question, "¿dónde está la mesa?");
    assert!(!calls[0].has_image);
    assert_eq!(calls[0].language, Language::Es);
}

#[tokio::test]
async fn test_image_reaches_model() {
    let model = ScriptedModel::new(vec![Ok("Veo un pasillo despejado. SIN_PELIGRO".to_string())]);
    let h = build(model, no_mic(), UserPreferences::default());

    h.orchestrator
        .process_question("¿qué ves?", Some(&[0xFF, 0xD8, 0xFF]))
        .await
        .unwrap();

    assert!(h.model.calls().await[0].has_image);
}

#[tokio::test]
async fn test_auth_error_becomes_apology() {
    let model = ScriptedModel::new(vec![Err(Error::Auth(
        "401 Unauthorized: API key not valid".to_string(),
    ))]);
    let mut h = build(model, no_mic(), UserPreferences::default());

    // Pipeline failures are absorbed, not returned
    h.orchestrator
        .process_question("¿qué hay delante?", None)
        .await
        .unwrap();

    assert_eq!(
        drain(&mut h.events),
        vec![
            UiEvent::StateChanged("Pensando...".to_string()),
            UiEvent::Error("auth error: 401 Unauthorized: API key not valid".to_string()),
            UiEvent::StateChanged("Listo".to_string()),
        ]
    );
    assert_eq!(
        h.speech.spoken().await,
        vec!["Lo siento, ha ocurrido un error. Inténtalo de nuevo.".to_string()]
    );
    assert!(h.haptics.pulses().is_empty());
    assert_eq!(h.orchestrator.state(), TurnState::Idle);
}

#[tokio::test]
async fn test_parse_error_speaks_fallback() {
    let model = ScriptedModel::new(vec![Err(Error::Parse(
        "no candidates in response".to_string(),
    ))]);
    let h = build(model, no_mic(), UserPreferences::default());

    h.orchestrator.process_question("¿qué ves?", None).await.unwrap();

    assert_eq!(
        h.speech.spoken().await,
        vec!["Recibí la imagen pero no pude leer la descripción.".to_string()]
    );
}

#[tokio::test]
async fn test_second_turn_rejected_while_busy() {
    let model = ScriptedModel::with_delay(
        vec![Ok("Todo despejado. SIN_PELIGRO".to_string())],
        Duration::from_millis(200),
    );
    let h = build(model, no_mic(), UserPreferences::default());

    let first = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.process_question("primera", None).await })
    };
    wait_for_state(&h.orchestrator, TurnState::Processing).await;

    let second = h.orchestrator.process_question("segunda", None).await;
    assert!(matches!(second, Err(Error::TurnInProgress)));

    first.await.unwrap().unwrap();
    assert_eq!(h.orchestrator.state(), TurnState::Idle);

    // The rejected turn never reached the model
    assert_eq!(h.model.calls().await.len(), 1);
}

#[tokio::test]
async fn test_voice_turn_uses_transcript() {
    let model = ScriptedModel::new(vec![Ok("La puerta está al frente. SIN_PELIGRO".to_string())]);
    let mic = Arc::new(ScriptedMic::new(vec![Ok(
        "¿dónde está la puerta?".to_string()
    )]));
    let mut h = build(model, mic, UserPreferences::default());

    h.orchestrator.run_voice_turn(None).await.unwrap();

    assert_eq!(h.model.calls().await[0].question, "¿dónde está la puerta?");
    assert_eq!(
        drain(&mut h.events),
        vec![
            UiEvent::StateChanged("Te escucho...".to_string()),
            UiEvent::StateChanged("Pensando...".to_string()),
            UiEvent::Speaking("La puerta está al frente.".to_string()),
            UiEvent::StateChanged("Listo".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_stop_listening_cancels_quietly() {
    let model = ScriptedModel::new(vec![]);
    let mic = Arc::new(HangingMic::default());
    let mut h = build(model, mic.clone(), UserPreferences::default());

    let turn = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_voice_turn(None).await })
    };
    wait_for_state(&h.orchestrator, TurnState::Listening).await;

    h.orchestrator.stop_listening();
    turn.await.unwrap().unwrap();

    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    assert!(mic.stopped.load(Ordering::SeqCst));
    assert!(h.model.calls().await.is_empty());

    // No error, no reply: just back to ready
    assert_eq!(
        drain(&mut h.events),
        vec![
            UiEvent::StateChanged("Te escucho...".to_string()),
            UiEvent::StateChanged("Listo".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_mic_cancel_ends_turn_without_model_call() {
    let model = ScriptedModel::new(vec![]);
    let mic = Arc::new(ScriptedMic::new(vec![Err(Error::Cancelled)]));
    let mut h = build(model, mic, UserPreferences::default());

    h.orchestrator.run_voice_turn(None).await.unwrap();

    assert!(h.model.calls().await.is_empty());
    assert_eq!(
        drain(&mut h.events),
        vec![
            UiEvent::StateChanged("Te escucho...".to_string()),
            UiEvent::StateChanged("Listo".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_recognition_failure_substitutes_retry_prompt() {
    let model = ScriptedModel::new(vec![Ok("Claro, dime. SIN_PELIGRO".to_string())]);
    let mic = Arc::new(ScriptedMic::new(vec![Err(Error::Recognition(
        "engine died".to_string(),
    ))]));
    let h = build(model, mic, UserPreferences::default());

    h.orchestrator.run_voice_turn(None).await.unwrap();

    assert_eq!(
        h.model.calls().await[0].question,
        "No te escuché bien, intenta de nuevo."
    );
}

#[tokio::test]
async fn test_voice_disabled_shows_text_without_speaking() {
    let model = ScriptedModel::new(vec![Ok("Cuidado con el bache. PELIGRO_SUELO".to_string())]);
    let prefs = UserPreferences {
        voice_enabled: false,
        ..UserPreferences::default()
    };
    let mut h = build(model, no_mic(), prefs);

    h.orchestrator.process_question("¿cómo sigo?", None).await.unwrap();

    assert!(h.speech.spoken().await.is_empty());

    // The display text still carries the full reply
    let events = drain(&mut h.events);
    assert!(matches!(&events[1], UiEvent::Speaking(text) if text.starts_with("Cuidado:")));
    assert_eq!(h.haptics.pulses(), vec![true]);
}

#[tokio::test]
async fn test_haptics_disabled_skips_pulse() {
    let model = ScriptedModel::new(vec![Ok("Hay una rama baja. PELIGRO_CABEZA".to_string())]);
    let prefs = UserPreferences {
        haptic_enabled: false,
        ..UserPreferences::default()
    };
    let h = build(model, no_mic(), prefs);

    h.orchestrator.process_question("¿puedo pasar?", None).await.unwrap();

    assert!(h.haptics.pulses().is_empty());
    assert_eq!(
        h.speech.spoken().await,
        vec![
            "Cuidado: hay un obstáculo a la altura de la cabeza.\n\nHay una rama baja."
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_obstacle_alerts_off_suppresses_warning() {
    let model = ScriptedModel::new(vec![Ok(
        "El camino sigue recto. PELIGRO_SUELO".to_string()
    )]);
    let prefs = UserPreferences {
        obstacle_alerts: false,
        ..UserPreferences::default()
    };
    let mut h = build(model, no_mic(), prefs);

    h.orchestrator.process_question("¿por dónde voy?", None).await.unwrap();

    let events = drain(&mut h.events);
    assert_eq!(
        events[1],
        UiEvent::Speaking("El camino sigue recto.".to_string())
    );
    assert!(h.haptics.pulses().is_empty());
}

#[tokio::test]
async fn test_english_preferences_localize_turn() {
    let model = ScriptedModel::new(vec![Ok(
        "There is a low branch ahead. PELIGRO_CABEZA".to_string()
    )]);
    let prefs = UserPreferences {
        voice_language: Language::En,
        ..UserPreferences::default()
    };
    let mut h = build(model, no_mic(), prefs);

    h.orchestrator.process_question("can I walk on?", None).await.unwrap();

    let expected = "Careful: there is an obstacle at head height.\n\nThere is a low branch ahead.";
    assert_eq!(
        drain(&mut h.events),
        vec![
            UiEvent::StateChanged("Thinking...".to_string()),
            UiEvent::Speaking(expected.to_string()),
            UiEvent::StateChanged("Ready".to_string()),
        ]
    );
    assert_eq!(h.model.calls().await[0].language, Language::En);
}

#[tokio::test]
async fn test_greeting_announces_and_speaks() {
    let model = ScriptedModel::new(vec![]);
    let mut h = build(model, no_mic(), UserPreferences::default());

    h.orchestrator.greet().await;

    assert_eq!(
        drain(&mut h.events),
        vec![UiEvent::StateChanged("Listo".to_string())]
    );
    assert_eq!(
        h.speech.spoken().await,
        vec!["Hola, soy Lazarillo. ¿En qué puedo ayudarte?".to_string()]
    );
}

#[tokio::test]
async fn test_settings_update_applies_next_turn() {
    let model = ScriptedModel::new(vec![
        Ok("Hay un pozo abierto. PELIGRO_SUELO".to_string()),
        Ok("Hay un pozo abierto. PELIGRO_SUELO".to_string()),
    ]);
    let mut h = build(model, no_mic(), UserPreferences::default());

    h.orchestrator.process_question("¿qué hay?", None).await.unwrap();
    let first = drain(&mut h.events);
    assert!(matches!(&first[1], UiEvent::Speaking(text) if text.starts_with("Cuidado:")));

    h.settings.update(UserPreferences {
        obstacle_alerts: false,
        ..UserPreferences::default()
    });

    h.orchestrator.process_question("¿qué hay?", None).await.unwrap();
    let second = drain(&mut h.events);
    assert_eq!(
        second[1],
        UiEvent::Speaking("Hay un pozo abierto.".to_string())
    );
}

#[tokio::test]
async fn test_stop_after_finished_turn_leaves_next_capture_alone() {
    let model = ScriptedModel::new(vec![
        Ok("La puerta está al frente. SIN_PELIGRO".to_string()),
        Ok("Sigue recto. SIN_PELIGRO".to_string()),
    ]);
    let mic = Arc::new(ScriptedMic::new(vec![
        Ok("¿dónde está la puerta?".to_string()),
        Ok("¿sigo recto?".to_string()),
    ]));
    let h = build(model, mic, UserPreferences::default());

    h.orchestrator.run_voice_turn(None).await.unwrap();

    // A stop aimed at the finished capture lands nowhere
    h.orchestrator.stop_listening();

    h.orchestrator.run_voice_turn(None).await.unwrap();

    let calls = h.model.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].question, "¿sigo recto?");
}

#[tokio::test]
async fn test_repeated_stop_only_cancels_the_current_capture() {
    let model = ScriptedModel::new(vec![Ok("Sigue recto. SIN_PELIGRO".to_string())]);
    let mic = Arc::new(StubbornMic::new(vec![Ok("¿sigo recto?".to_string())]));
    let h = build(model, mic, UserPreferences::default());

    let turn = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_voice_turn(None).await })
    };
    wait_for_state(&h.orchestrator, TurnState::Listening).await;

    // The second press targets a capture that the first one already ended;
    // no notification may survive into the next turn
    h.orchestrator.stop_listening();
    h.orchestrator.stop_listening();
    turn.await.unwrap().unwrap();
    assert_eq!(h.orchestrator.state(), TurnState::Idle);

    h.orchestrator.run_voice_turn(None).await.unwrap();
    assert_eq!(h.model.calls().await[0].question, "¿sigo recto?");
}

#[tokio::test]
async fn test_stop_listening_outside_capture_is_noop() {
    let model = ScriptedModel::new(vec![]);
    let mic = Arc::new(HangingMic::default());
    let h = build(model, mic.clone(), UserPreferences::default());

    h.orchestrator.stop_listening();

    assert_eq!(h.orchestrator.state(), TurnState::Idle);
    assert!(!mic.stopped.load(Ordering::SeqCst));
}
