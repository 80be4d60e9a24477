use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use speechgate_core::{InvokeError, ValidationError};
use thiserror::Error;
use tracing::error;

pub const TIMEOUT_MESSAGE: &str =
    "Request timed out. Please try with shorter text or try again.";

/// Every way a request can fail, with its HTTP status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request body exceeds the 16 MiB limit")]
    PayloadTooLarge,

    #[error(transparent)]
    Synthesis(#[from] InvokeError),

    #[error("Request timed out. Please try with shorter text or try again.")]
    DeadlineExceeded,

    #[error("Not found")]
    NotFound,

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Synthesis(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{"status": "error", "message": ...}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(target: "http", status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        assert_eq!(
            ApiError::from(ValidationError::MissingParameters).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(InvokeError::Timeout).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::DeadlineExceeded.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn messages_pass_through_unchanged() {
        assert_eq!(
            ApiError::from(ValidationError::MissingParameters).to_string(),
            "Missing required parameters"
        );
        assert_eq!(ApiError::DeadlineExceeded.to_string(), TIMEOUT_MESSAGE);
        assert_eq!(
            ApiError::Internal("boom".into()).to_string(),
            "Internal Server Error: boom"
        );
    }
}
