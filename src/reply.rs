//! Reply composition
//!
//! Takes the raw model reply plus the hazard flags and produces what the
//! user actually sees and hears: protocol markers and formatting characters
//! stripped, a localized warning prepended when the preferences allow it,
//! and the haptic intent for the turn.

use crate::hazard::{DangerFlags, MARKERS};
use crate::settings::{Language, UserPreferences};

/// A reply ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedReply {
    /// Text for the screen
    pub display_text: String,

    /// Text for the speech engine (same as display today, kept separate so
    /// a UI can shorten one without touching the other)
    pub spoken_text: String,

    /// Fire a strong haptic pulse before speaking
    pub trigger_haptic: bool,
}

/// Compose the final reply for one turn
///
/// Preference gating: a warning (and the haptic intent) requires the master
/// `obstacle_alerts` switch, the per-kind toggle, and the flag itself. The
/// `haptic_enabled` preference is deliberately not consulted here; the
/// orchestrator applies it at the moment of pulsing.
#[must_use]
pub fn compose(model_text: &str, flags: DangerFlags, prefs: &UserPreferences) -> ComposedReply {
    let cleaned = clean_text(model_text);

    let effective = DangerFlags {
        ground: prefs.obstacle_alerts && prefs.floor_alerts && flags.ground,
        head: prefs.obstacle_alerts && prefs.head_alerts && flags.head,
    };

    let warning = warning_text(effective, prefs.voice_language);

    let text = match (warning, cleaned.is_empty()) {
        (Some(warning), false) => format!("{warning}\n\n{cleaned}"),
        (Some(warning), true) => warning.to_string(),
        (None, false) => cleaned,
        // Nothing survived stripping: deliver the original rather than
        // silence.
        (None, true) => model_text.to_string(),
    };

    ComposedReply {
        display_text: text.clone(),
        spoken_text: text,
        trigger_haptic: effective.any(),
    }
}

/// Strip protocol markers (any case), `*` and `#`, and surrounding whitespace
fn clean_text(text: &str) -> String {
    let mut cleaned = text.to_string();
    for marker in MARKERS {
        cleaned = remove_token_ignore_ascii_case(&cleaned, marker);
    }
    cleaned.retain(|c| c != '*' && c != '#');
    cleaned.trim().to_string()
}

/// Remove every occurrence of an ASCII token, ignoring ASCII case
///
/// Offsets in the ASCII-lowercased copy map one-to-one onto the original,
/// and a match can only cover ASCII bytes, so the slicing below stays on
/// char boundaries even in accented text.
fn remove_token_ignore_ascii_case(text: &str, token: &str) -> String {
    let lower_text = text.to_ascii_lowercase();
    let lower_token = token.to_ascii_lowercase();

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in lower_text.match_indices(&lower_token) {
        if start >= last {
            out.push_str(&text[last..start]);
            last = start + token.len();
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Localized warning for the effective hazard flags, if any
fn warning_text(flags: DangerFlags, language: Language) -> Option<&'static str> {
    match (flags.ground, flags.head) {
        (true, true) => Some(match language {
            Language::Es => "Cuidado: hay obstáculos en el suelo y a la altura de la cabeza.",
            Language::En => "Careful: there are obstacles at ground level and at head height.",
            Language::Pt => "Cuidado: há obstáculos no chão e à altura da cabeça.",
        }),
        (true, false) => Some(match language {
            Language::Es => "Cuidado: hay un obstáculo a nivel del suelo.",
            Language::En => "Careful: there is an obstacle at ground level.",
            Language::Pt => "Cuidado: há um obstáculo ao nível do chão.",
        }),
        (false, true) => Some(match language {
            Language::Es => "Cuidado: hay un obstáculo a la altura de la cabeza.",
            Language::En => "Careful: there is an obstacle at head height.",
            Language::Pt => "Cuidado: há um obstáculo à altura da cabeça.",
        }),
        (false, false) => None,
    }
}
