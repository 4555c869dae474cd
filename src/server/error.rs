use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::foundation::error::OverlayError;

pub const MSG_NO_FILE: &str = "No GIF file uploaded";
pub const MSG_NO_TEXT: &str = "Text parameter is required";
pub const MSG_PROCESSING: &str = "Failed to process GIF";
pub const MSG_TOO_LARGE: &str = "Uploaded file is too large";

/// Errors surfaced to HTTP callers. Processing details stay in the server log.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("no gif file uploaded")]
    MissingFile,

    #[error("text parameter missing")]
    MissingText,

    #[error("request body exceeds the upload limit")]
    TooLarge,

    #[error("processing failed: {0}")]
    Processing(#[from] OverlayError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::MissingText => StatusCode::BAD_REQUEST,
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MissingFile => MSG_NO_FILE,
            Self::MissingText => MSG_NO_TEXT,
            Self::TooLarge => MSG_TOO_LARGE,
            Self::Processing(_) => MSG_PROCESSING,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Processing(OverlayError::Other(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Processing(err) => {
                tracing::error!(kind = err.kind(), error = ?err, "overlay request failed");
            }
            other => tracing::debug!(reason = %other, "rejected overlay request"),
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
