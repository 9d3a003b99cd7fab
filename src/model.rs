//! Gemini model client
//!
//! One `generateContent` request per turn. No conversation state lives on
//! the wire; the prompt carries the persona, the marker protocol, and the
//! question every time.

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::prompt::build_prompt;
use crate::settings::Language;
use crate::{Config, Error, Result};

/// Camera frames arrive as JPEG
const JPEG_MIME: &str = "image/jpeg";

/// Key value shipped in the sample config, never valid
const PLACEHOLDER_API_KEY: &str = "TU_API_KEY_AQUI";

/// Model backend seam
///
/// The orchestrator only sees this trait, so tests inject scripted fakes.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one question, with an optional JPEG frame, and return the raw
    /// reply text
    ///
    /// # Errors
    ///
    /// Returns `Network`, `Auth`, `ModelRefusal`, or `Parse` depending on
    /// where the call failed.
    async fn generate(
        &self,
        question: &str,
        image: Option<&[u8]>,
        language: Language,
    ) -> Result<String>;
}

/// Client for the Gemini `generateContent` API
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    api_base: String,
}

/// `generateContent` request body
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

/// A single content entry holding the prompt parts
#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

/// Request part: prompt text or an inline image
#[derive(Debug, Serialize)]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
}

/// Base64-encoded inline image payload
#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

/// `generateContent` response body (response side is camelCase)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,

    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,

    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

impl GeminiClient {
    /// Create a client from configuration
    ///
    /// The HTTP client carries a hard request timeout so a turn can never
    /// hang past it.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the HTTP client cannot be
    /// built.
    pub fn new(config: &Config) -> Result<Self> {
        let key = config.api_key.expose_secret();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            return Err(Error::Config(
                "Gemini API key required (set LAZARILLO_API_KEY or run `lazarillo setup`)"
                    .to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_base: config.api_base.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        question: &str,
        image: Option<&[u8]>,
        language: Language,
    ) -> Result<String> {
        let prompt = build_prompt(question, language, image.is_some());

        let mut parts = vec![Part {
            text: Some(&prompt),
            inline_data: None,
        }];
        if let Some(bytes) = image {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: JPEG_MIME,
                    data: base64::engine::general_purpose::STANDARD.encode(bytes),
                }),
            });
        }

        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        // The key rides in the query string, so strip the URL from any
        // transport error before it reaches logs.
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base.trim_end_matches('/'),
            self.model,
            self.api_key.expose_secret(),
        );

        tracing::debug!(
            model = %self.model,
            with_image = image.is_some(),
            "sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                if e.is_timeout() {
                    Error::Network(format!("request timed out: {e}"))
                } else {
                    Error::Network(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("invalid response JSON: {e}")))?;

        extract_text(body)
    }
}

/// Map a non-success HTTP status to the error taxonomy
fn classify_status(status: reqwest::StatusCode, body: &str) -> Error {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Error::Auth(format!("{status}: {body}"))
    } else {
        Error::Network(format!("API error {status}: {body}"))
    }
}

/// Pull the reply text out of a decoded response
///
/// Refusals (prompt blocked, candidate stopped for safety) map to
/// `ModelRefusal`; a response that simply lacks the expected shape maps to
/// `Parse`.
fn extract_text(response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(Error::ModelRefusal(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(Error::Parse("no candidates in response".to_string()));
    };

    let safety_stop = candidate.finish_reason.as_deref() == Some("SAFETY");

    let text = candidate
        .content
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .filter(|t| !t.is_empty());

    match text {
        Some(text) => Ok(text),
        None if safety_stop => Err(Error::ModelRefusal(
            "candidate blocked for safety".to_string(),
        )),
        None => Err(Error::Parse("no text in first candidate".to_string())),
    }
}
