//! `POST /synthesize`
//!
//! The request flows through three stages, each usable on its own:
//! [`validate`] turns form fields into a [`SynthesisRequest`], [`prepare`]
//! picks the output file, sweeps stale audio and builds the job, and
//! [`respond`] maps the job outcome to an HTTP response. [`synthesize`]
//! composes them around the dispatcher wait.
//!
//! Fields are read from either an urlencoded or a `multipart/form-data` body.

use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use speechgate_core::{
    janitor, unix_timestamp, JobOutcome, SynthesisJob, SynthesisRequest, ValidationError,
};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

/// URL prefix under which generated files are served.
pub const AUDIO_URL_PREFIX: &str = "/static/audio";

/// Raw form fields; absence is decided by validation, not by the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct SynthesizeForm {
    pub text: Option<String>,
    pub language: Option<String>,
    pub gender: Option<String>,
    pub alpha: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessBody {
    pub status: &'static str,
    pub audio_path: String,
}

/// Check presence, length and shape of the form fields.
pub fn validate(form: SynthesizeForm, max_text_chars: usize) -> Result<SynthesisRequest, ApiError> {
    let alpha = parse_alpha(form.alpha.as_deref());
    let request = SynthesisRequest::with_max_len(
        form.text.unwrap_or_default(),
        form.language.unwrap_or_default(),
        form.gender.unwrap_or_default(),
        alpha.as_ref().copied().unwrap_or(None),
        max_text_chars,
    )?;
    // Missing/oversized input wins over a malformed alpha.
    alpha?;
    Ok(request)
}

fn parse_alpha(raw: Option<&str>) -> Result<Option<f32>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<f32>()
            .map(Some)
            .map_err(|_| ValidationError::InvalidParameter {
                name: "alpha",
                reason: format!("could not convert '{}' to a number", s),
            }),
    }
}

/// Name the output file, sweep stale outputs and build the job.
///
/// Returns the job together with its bare filename.
pub async fn prepare(
    state: &AppState,
    request: SynthesisRequest,
) -> Result<(SynthesisJob, String), ApiError> {
    let settings = &state.settings;
    let filename = request.output_filename(unix_timestamp());
    let output_path = settings.output_dir.join(&filename);

    // Best-effort: failures are logged by the janitor and never fail the request.
    let report = janitor::sweep(&settings.output_dir, settings.retention).await;
    debug!(
        target: "http",
        removed = report.removed.len(),
        errors = report.errors.len(),
        "Output sweep done"
    );

    let job = SynthesisJob::new(request, output_path)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((job, filename))
}

/// Translate a job outcome into the HTTP response.
pub fn respond(outcome: JobOutcome, filename: &str) -> Response {
    match outcome {
        JobOutcome::Success { .. } => (
            StatusCode::OK,
            Json(SuccessBody {
                status: "success",
                audio_path: format!("{}/{}", AUDIO_URL_PREFIX, filename),
            }),
        )
            .into_response(),
        JobOutcome::Failure(e) => ApiError::Synthesis(e).into_response(),
        JobOutcome::TimedOut => ApiError::DeadlineExceeded.into_response(),
    }
}

/// Pull the form fields out of the request body.
///
/// A body that carries no readable form yields an empty form, so validation
/// reports the missing parameters. Only an oversized body is an error here.
pub async fn read_form(state: &AppState, request: Request) -> Result<SynthesizeForm, ApiError> {
    let multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false);

    if multipart {
        return match Multipart::from_request(request, state).await {
            Ok(parts) => read_multipart(parts).await,
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(ApiError::PayloadTooLarge)
            }
            Err(rejection) => {
                debug!(target: "http", reason = %rejection.body_text(), "Unreadable multipart body");
                Ok(SynthesizeForm::default())
            }
        };
    }

    match Form::<SynthesizeForm>::from_request(request, state).await {
        Ok(Form(form)) => Ok(form),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ApiError::PayloadTooLarge)
        }
        // Non-form bodies carry no form fields at all.
        Err(rejection) => {
            debug!(target: "http", reason = %rejection.body_text(), "Unreadable form body");
            Ok(SynthesizeForm::default())
        }
    }
}

async fn read_multipart(mut parts: Multipart) -> Result<SynthesizeForm, ApiError> {
    let mut form = SynthesizeForm::default();
    loop {
        let field = match parts.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return multipart_fallback(e, form),
        };
        // Uploaded files are not form values.
        if field.file_name().is_some() {
            continue;
        }
        let slot = match field.name() {
            Some("text") => &mut form.text,
            Some("language") => &mut form.language,
            Some("gender") => &mut form.gender,
            Some("alpha") => &mut form.alpha,
            _ => continue,
        };
        if slot.is_some() {
            continue;
        }
        match field.text().await {
            Ok(value) => *slot = Some(value),
            Err(e) => return multipart_fallback(e, form),
        }
    }
    Ok(form)
}

// Keep what was read so far unless the body hit the size limit.
fn multipart_fallback(
    err: MultipartError,
    form: SynthesizeForm,
) -> Result<SynthesizeForm, ApiError> {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Err(ApiError::PayloadTooLarge);
    }
    debug!(target: "http", reason = %err.body_text(), "Malformed multipart body");
    Ok(form)
}

pub async fn synthesize(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let form = read_form(&state, request).await?;

    let request = validate(form, state.settings.max_text_chars)?;
    let (job, filename) = prepare(&state, request).await?;

    info!(
        target: "http",
        file = %filename,
        chars = job.request().text().chars().count(),
        "Dispatching synthesis job"
    );
    let outcome = state
        .dispatcher
        .submit(job)
        .wait(state.settings.deadline)
        .await;
    info!(target: "http", file = %filename, outcome = outcome.kind(), "Synthesis job settled");

    Ok(respond(outcome, &filename))
}
