//! Synthesis request model and input validation.
//!
//! A [`SynthesisRequest`] can only be obtained through validation, so every
//! instance downstream of the HTTP layer is known to carry non-empty text,
//! language and gender, a bounded text length and a usable `alpha`.

use serde::Serialize;
use thiserror::Error;

/// Default upper bound on the text length, in characters.
pub const MAX_TEXT_CHARS: usize = 300;

/// Speaking-rate factor used when the caller does not provide one.
pub const DEFAULT_ALPHA: f32 = 1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Text length exceeds maximum limit of {max} characters for free tier")]
    TextTooLong { max: usize },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Validated, immutable text-to-speech request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    text: String,
    language: String,
    gender: String,
    alpha: f32,
}

impl SynthesisRequest {
    pub fn new(
        text: impl Into<String>,
        language: impl Into<String>,
        gender: impl Into<String>,
        alpha: Option<f32>,
    ) -> Result<Self, ValidationError> {
        Self::with_max_len(text, language, gender, alpha, MAX_TEXT_CHARS)
    }

    /// Same as [`SynthesisRequest::new`] with a caller-chosen text limit.
    pub fn with_max_len(
        text: impl Into<String>,
        language: impl Into<String>,
        gender: impl Into<String>,
        alpha: Option<f32>,
        max_chars: usize,
    ) -> Result<Self, ValidationError> {
        let text = text.into();
        let language = language.into();
        let gender = gender.into();

        if text.is_empty() || language.is_empty() || gender.is_empty() {
            return Err(ValidationError::MissingParameters);
        }
        if text.chars().count() > max_chars {
            return Err(ValidationError::TextTooLong { max: max_chars });
        }
        check_filename_component("language", &language)?;
        check_filename_component("gender", &gender)?;

        let alpha = alpha.unwrap_or(DEFAULT_ALPHA);
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(ValidationError::InvalidParameter {
                name: "alpha",
                reason: format!("expected a positive number, got {}", alpha),
            });
        }

        Ok(Self {
            text,
            language,
            gender,
            alpha,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn gender(&self) -> &str {
        &self.gender
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Output filename for this request at the given UNIX second.
    pub fn output_filename(&self, unix_ts: i64) -> String {
        output_filename(&self.language, &self.gender, unix_ts)
    }
}

/// `output_{language}_{gender}_{ts}.wav`
pub fn output_filename(language: &str, gender: &str, unix_ts: i64) -> String {
    format!("output_{}_{}_{}.wav", language, gender, unix_ts)
}

// Language and gender end up inside a filesystem path.
fn check_filename_component(name: &'static str, value: &str) -> Result<(), ValidationError> {
    let ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidParameter {
            name,
            reason: "only ASCII letters, digits, '-' and '_' are allowed".to_string(),
        })
    }
}
