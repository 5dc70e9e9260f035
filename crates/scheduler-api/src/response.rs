//! Response envelopes matching the REST table in §6: most mutations
//! return `{message, job}` or `{message}`; reads return the bare
//! resource.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// `{message, job}` wrapper used by create/update.
#[derive(Debug, Serialize)]
pub struct JobEnvelope<T: Serialize> {
    pub message: String,
    pub job: T,
}

/// A 201 Created response carrying a `{message, job}` body.
pub struct Created<T: Serialize>(pub JobEnvelope<T>);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// A 200 OK response carrying a `{message, job}` body.
pub struct Updated<T: Serialize>(pub JobEnvelope<T>);

impl<T: Serialize> IntoResponse for Updated<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.0)).into_response()
    }
}

/// A bare 200 OK `{message}` body, used by delete/run/reactivate/complete.
#[derive(Debug, Serialize)]
pub struct MessageOnly {
    pub message: String,
}

impl MessageOnly {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for MessageOnly {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
