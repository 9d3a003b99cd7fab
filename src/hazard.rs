//! Hazard classification of model replies
//!
//! Vision prompts instruct the model to end its reply with exactly one
//! uppercase protocol marker. Models drop or mangle the marker often enough
//! that a Spanish keyword fallback backs it up; markers and keywords are
//! additive, so either can raise a flag.

/// Marker for a ground-level hazard (hole, step, pothole)
pub const MARKER_GROUND: &str = "PELIGRO_SUELO";

/// Marker for a head-height hazard (branch, sign, low frame)
pub const MARKER_HEAD: &str = "PELIGRO_CABEZA";

/// Marker for both hazards at once
pub const MARKER_BOTH: &str = "AMBOS_PELIGROS";

/// Marker for an explicitly hazard-free scene
pub const MARKER_NONE: &str = "SIN_PELIGRO";

/// Every protocol marker, in stripping order
pub const MARKERS: [&str; 4] = [MARKER_BOTH, MARKER_GROUND, MARKER_HEAD, MARKER_NONE];

/// Ground-hazard vocabulary for the keyword fallback (lowercase)
const GROUND_KEYWORDS: [&str; 8] = [
    "hueco",
    "bache",
    "escalera",
    "escalones",
    "desnivel",
    "pozo",
    "obstáculo en el suelo",
    "obstaculo en el suelo",
];

/// Head-hazard vocabulary for the keyword fallback (lowercase)
const HEAD_KEYWORDS: [&str; 7] = [
    "rama",
    "ramas",
    "letrero",
    "señal",
    "señales",
    "marco bajo",
    "objeto a la altura de la cabeza",
];

/// Hazard flags derived from one model reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DangerFlags {
    /// Ground-level obstacle detected
    pub ground: bool,

    /// Head-height obstacle detected
    pub head: bool,
}

impl DangerFlags {
    /// True when either hazard is flagged
    #[must_use]
    pub const fn any(self) -> bool {
        self.ground || self.head
    }
}

/// Classify a model reply for hazards
///
/// Markers match case-insensitively anywhere in the text. `AMBOS_PELIGROS`
/// raises both flags; `SIN_PELIGRO` asserts nothing, so a reply carrying it
/// can still be flagged through the keyword fallback.
#[must_use]
pub fn classify(text: &str) -> DangerFlags {
    let lower = text.to_lowercase();

    let mut flags = DangerFlags::default();

    if lower.contains(&MARKER_BOTH.to_ascii_lowercase()) {
        flags.ground = true;
        flags.head = true;
    }
    if lower.contains(&MARKER_GROUND.to_ascii_lowercase()) {
        flags.ground = true;
    }
    if lower.contains(&MARKER_HEAD.to_ascii_lowercase()) {
        flags.head = true;
    }

    flags.ground |= GROUND_KEYWORDS.iter().any(|k| lower.contains(k));
    flags.head |= HEAD_KEYWORDS.iter().any(|k| lower.contains(k));

    flags
}
