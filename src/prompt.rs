//! Persona prompt construction
//!
//! Every turn sends one self-contained prompt: the persona instruction, the
//! hazard marker protocol when an image rides along, and the user's
//! question. The instruction itself is written in Spanish; the model is told
//! which language to answer in.

use crate::hazard::{MARKER_BOTH, MARKER_GROUND, MARKER_HEAD, MARKER_NONE};
use crate::settings::Language;

/// Build the full prompt for one turn
#[must_use]
pub fn build_prompt(question: &str, language: Language, with_image: bool) -> String {
    let mut prompt = String::with_capacity(768);

    prompt.push_str(
        "Actúa como Lazarillo, un asistente leal y empático para personas con \
         discapacidad visual. DEBES RESPONDER SIEMPRE EN ",
    );
    prompt.push_str(language.prompt_name());
    prompt.push_str(
        ". REGLAS OBLIGATORIAS: \
         1. RESPUESTAS CORTAS: máximo dos frases; solo puedes extenderte \
         cuando te pidan leer un texto. \
         2. CERO FORMATO: nada de asteriscos, listas ni emojis; habla en \
         frases simples. \
         3. CONTEXTO: cuando recibas una imagen, descríbela enfocándote en \
         lo práctico (obstáculos, objetos, textos).",
    );

    if with_image {
        prompt.push_str(
            " PROTOCOLO DE SEGURIDAD: termina tu respuesta con EXACTAMENTE \
             UNA de estas marcas en MAYÚSCULAS, sola en la última línea y \
             sin explicarla: ",
        );
        prompt.push_str(MARKER_GROUND);
        prompt.push_str(" si hay un obstáculo a nivel del suelo, ");
        prompt.push_str(MARKER_HEAD);
        prompt.push_str(" si hay un obstáculo a la altura de la cabeza, ");
        prompt.push_str(MARKER_BOTH);
        prompt.push_str(" si aparecen los dos, ");
        prompt.push_str(MARKER_NONE);
        prompt.push_str(" si no hay ninguno.");
    }

    prompt.push_str(" El usuario te dice: \"");
    prompt.push_str(question);
    prompt.push('"');

    prompt
}
