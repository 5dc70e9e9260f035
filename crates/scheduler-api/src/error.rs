//! HTTP error envelope and the conversion from the engine's unified `Error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use scheduler_core::error::Error as CoreError;

/// The JSON body returned for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

/// An HTTP-ready error: a status code plus its JSON body.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub body: ApiError,
}

impl HttpError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiError {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Maps the engine's error taxonomy onto the REST surface (§6/§7).
///
/// `CoreError` already carries its own `status_code()`/`error_code()`
/// classification, so this delegates rather than re-deriving a parallel
/// match; the only thing added here is the truncated, client-facing
/// message for infrastructure failures, which are logged in full and
/// never echoed verbatim to the caller.
impl From<CoreError> for HttpError {
    fn from(err: CoreError) -> Self {
        let status = err.status_code();
        let code = err.error_code();

        if status.is_server_error() {
            tracing::error!(error = %err.truncated_message(), code, "request failed");
            return HttpError::new(status, code, "internal error");
        }

        HttpError::new(status, code, err.to_string())
    }
}

pub type HttpResult<T> = std::result::Result<T, HttpError>;
