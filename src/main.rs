use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use dialoguer::{Input, Select};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use lazarillo::{
    Config, GeminiClient, Haptics, InMemorySettings, Language, Orchestrator, SettingsFile,
    SettingsProvider, SpeechInput, SpeechOutput, UiEvent, UserPreferences,
};

/// Lazarillo - voice assistant for visually-impaired users
#[derive(Parser)]
#[command(name = "lazarillo", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question and print the reply
    Ask {
        /// The question to send
        question: String,

        /// JPEG frame to attach
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Reply language override (es, en, pt)
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Interactive session: every line is one utterance
    Talk {
        /// JPEG frame to attach to every turn
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Reply language override (es, en, pt)
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Classify a reply text and compose the result offline (no API call)
    Classify {
        /// Model reply text to analyze
        text: String,

        /// Reply language override (es, en, pt)
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Interactive first-run setup
    Setup,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lazarillo=info",
        1 => "info,lazarillo=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Ask {
            question,
            image,
            language,
        }) => cmd_ask(&question, image.as_deref(), language.as_deref()).await,
        Some(Command::Talk { image, language }) => {
            cmd_talk(image.as_deref(), language.as_deref()).await
        }
        Some(Command::Classify { text, language }) => cmd_classify(&text, language.as_deref()),
        Some(Command::Setup) => run_setup(),
        None => cmd_talk(None, None).await,
    }
}

/// One text turn against the real API
async fn cmd_ask(
    question: &str,
    image: Option<&Path>,
    language: Option<&str>,
) -> anyhow::Result<()> {
    let config = Config::load();
    let model = Arc::new(GeminiClient::new(&config)?);
    let settings = resolve_settings(&config, language);

    let (orchestrator, events) = Orchestrator::new(
        model,
        settings,
        Arc::new(StdinInput::default()),
        Arc::new(TerminalSpeech),
        Arc::new(TerminalHaptics),
    );
    let printer = tokio::spawn(print_events(events));

    let frame = load_frame(image)?;
    orchestrator
        .process_question(question, frame.as_deref())
        .await?;

    drop(orchestrator);
    printer.await?;
    Ok(())
}

/// Interactive loop: greeting, then one turn per stdin line
async fn cmd_talk(image: Option<&Path>, language: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load();
    let model = Arc::new(GeminiClient::new(&config)?);
    let settings = resolve_settings(&config, language);
    let input = Arc::new(StdinInput::default());

    let (orchestrator, events) = Orchestrator::new(
        model,
        settings,
        input.clone(),
        Arc::new(TerminalSpeech),
        Arc::new(TerminalHaptics),
    );
    let printer = tokio::spawn(print_events(events));

    let frame = load_frame(image)?;

    orchestrator.greet().await;
    println!("Type a question and press Enter (Ctrl-D to end).");

    while !input.is_closed() {
        orchestrator.run_voice_turn(frame.as_deref()).await?;
    }

    drop(orchestrator);
    printer.await?;
    Ok(())
}

/// Offline diagnostic: hazard flags and composed reply for a given text
fn cmd_classify(text: &str, language: Option<&str>) -> anyhow::Result<()> {
    let prefs = UserPreferences {
        voice_language: language.map_or_else(Language::default, Language::from_code),
        ..UserPreferences::default()
    };

    let flags = lazarillo::classify(text);
    let reply = lazarillo::compose(text, flags, &prefs);

    println!("ground hazard: {}", flags.ground);
    println!("head hazard:   {}", flags.head);
    println!("haptic pulse:  {}", reply.trigger_haptic);
    println!("---");
    println!("{}", reply.display_text);

    Ok(())
}

/// Interactive setup wizard: API key, model, reply language
fn run_setup() -> anyhow::Result<()> {
    println!("Lazarillo Setup\n");

    let existing = lazarillo::config::load_config_file();
    let config_path = lazarillo::config::config_file_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // 1. API key (masked reveal of an existing one)
    let existing_key = existing.api_keys.gemini.as_deref();
    let masked = existing_key.map(|k| {
        if k.len() > 8 {
            format!("{}...{}", &k[..4], &k[k.len() - 4..])
        } else {
            "****".to_string()
        }
    });

    let prompt = masked.as_ref().map_or_else(
        || "Gemini API key (GEMINI_API_KEY)".to_string(),
        |m| format!("Gemini API key (current: {m}, leave blank to keep)"),
    );

    let key_input: String = Input::new()
        .with_prompt(&prompt)
        .allow_empty(true)
        .interact_text()?;
    let api_key = if key_input.is_empty() {
        existing_key.map(str::to_string)
    } else {
        Some(key_input)
    };

    // 2. Model
    let default_model = existing
        .model
        .name
        .as_deref()
        .unwrap_or(lazarillo::config::DEFAULT_MODEL);
    let model: String = Input::new()
        .with_prompt("Model")
        .default(default_model.to_string())
        .interact_text()?;

    // 3. Reply language
    let labels = ["español (es)", "inglés (en)", "portugués (pt)"];
    let languages = [Language::Es, Language::En, Language::Pt];

    let settings_path = lazarillo::settings::settings_file_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine settings directory"))?;
    let current_prefs = SettingsFile::new(&settings_path).snapshot();

    let default_lang = languages
        .iter()
        .position(|l| *l == current_prefs.voice_language)
        .unwrap_or(0);
    let lang_idx = Select::new()
        .with_prompt("Reply language")
        .items(&labels)
        .default(default_lang)
        .interact()?;

    // 4. Write config and settings
    write_config(&config_path, api_key.as_deref(), &model)?;
    println!("\nConfig written to {}", config_path.display());

    let prefs = UserPreferences {
        voice_language: languages[lang_idx],
        ..current_prefs
    };
    write_settings(&settings_path, &prefs)?;
    println!("Settings written to {}", settings_path.display());

    println!("\nSetup complete! Run `lazarillo talk` to start.");

    Ok(())
}

/// Serialize and write the config file
fn write_config(path: &Path, api_key: Option<&str>, model: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = String::new();
    out.push_str("[model]\n");
    out.push_str(&format!("name = \"{model}\"\n\n"));

    if let Some(key) = api_key {
        out.push_str("[api_keys]\n");
        out.push_str(&format!("gemini = \"{key}\"\n"));
    }

    std::fs::write(path, out)?;
    Ok(())
}

/// Serialize and write the user settings file
fn write_settings(path: &Path, prefs: &UserPreferences) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, toml::to_string_pretty(prefs)?)?;
    Ok(())
}

/// Settings provider for a session: file-backed when a path resolves,
/// defaults otherwise, with an optional CLI language override on top
fn resolve_settings(config: &Config, language: Option<&str>) -> Arc<dyn SettingsProvider> {
    let base: Arc<dyn SettingsProvider> = match &config.settings_path {
        Some(path) => Arc::new(SettingsFile::new(path)),
        None => Arc::new(InMemorySettings::default()),
    };

    if let Some(code) = language {
        Arc::new(LanguageOverride {
            inner: base,
            language: Language::from_code(code),
        })
    } else {
        base
    }
}

/// Applies a CLI language override on top of another provider
struct LanguageOverride {
    inner: Arc<dyn SettingsProvider>,
    language: Language,
}

impl SettingsProvider for LanguageOverride {
    fn snapshot(&self) -> UserPreferences {
        UserPreferences {
            voice_language: self.language,
            ..self.inner.snapshot()
        }
    }
}

/// Load the optional JPEG frame for a turn
fn load_frame(path: Option<&Path>) -> anyhow::Result<Option<Vec<u8>>> {
    let Some(p) = path else {
        return Ok(None);
    };

    let bytes = std::fs::read(p)
        .map_err(|e| anyhow::anyhow!("failed to read image {}: {e}", p.display()))?;
    tracing::debug!(path = %p.display(), bytes = bytes.len(), "loaded image frame");
    Ok(Some(bytes))
}

/// Print UI events as labeled terminal lines
async fn print_events(mut events: UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UiEvent::StateChanged(label) => eprintln!("[state] {label}"),
            UiEvent::Speaking(text) => println!("[display] {text}"),
            UiEvent::Error(message) => eprintln!("[error] {message}"),
        }
    }
}

/// Speech output that prints to the terminal
struct TerminalSpeech;

#[async_trait]
impl SpeechOutput for TerminalSpeech {
    async fn speak(&self, text: &str) {
        println!("[voice] {text}");
    }
}

/// Haptic sink that prints to the terminal
struct TerminalHaptics;

impl Haptics for TerminalHaptics {
    fn pulse(&self, strong: bool) {
        if strong {
            println!("[haptic] strong pulse");
        } else {
            println!("[haptic] soft pulse");
        }
    }
}

/// Speech input that reads one stdin line per utterance
///
/// EOF maps to a deliberate cancel so the session ends without a turn.
#[derive(Default)]
struct StdinInput {
    closed: AtomicBool,
}

impl StdinInput {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechInput for StdinInput {
    async fn listen(&self) -> lazarillo::Result<String> {
        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            let n = std::io::stdin().read_line(&mut line)?;
            Ok::<_, std::io::Error>((n, line))
        })
        .await
        .map_err(|e| lazarillo::Error::Recognition(format!("stdin task failed: {e}")))?;

        match read {
            Ok((0, _)) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(lazarillo::Error::Cancelled)
            }
            Ok((_, line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    Err(lazarillo::Error::Recognition("empty utterance".to_string()))
                } else {
                    Ok(line)
                }
            }
            Err(e) => Err(lazarillo::Error::Recognition(e.to_string())),
        }
    }

    fn stop(&self) {}
}
