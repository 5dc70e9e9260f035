//! Unified error type and the retryable/non-retryable classification.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors produced anywhere in the scheduler engine.
///
/// Variant names follow the taxonomy of the component design: validation,
/// not-found, and the delivery-classification errors (network, timeout,
/// upstream server/client, unauthorized target, payload too large, unknown)
/// plus the ambient infrastructure errors (database, queue, configuration,
/// internal, shutdown-in-progress).
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("upstream server error: {status} {message}")]
    UpstreamServer { status: u16, message: String },

    #[error("upstream client error: {status} {message}")]
    UpstreamClient { status: u16, message: String },

    #[error("target not permitted: {host}")]
    UnauthorizedTarget { host: String },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("database error: {message}")]
    Database { message: String },

    #[error("queue error: {message}")]
    Queue { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("shutdown in progress")]
    ShutdownInProgress,

    #[error("unknown error: {message}")]
    Unknown { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::Network {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Timeout {
            message: message.into(),
        }
    }

    pub fn upstream_server(status: u16, message: impl Into<String>) -> Self {
        Error::UpstreamServer {
            status,
            message: message.into(),
        }
    }

    pub fn upstream_client(status: u16, message: impl Into<String>) -> Self {
        Error::UpstreamClient {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized_target(host: impl Into<String>) -> Self {
        Error::UnauthorizedTarget { host: host.into() }
    }

    pub fn payload_too_large(size: usize, max: usize) -> Self {
        Error::PayloadTooLarge { size, max }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Error::Database {
            message: message.into(),
        }
    }

    pub fn database_with_source(message: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Error::Database {
            message: format!("{}: {}", message.into(), source),
        }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Error::Queue {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Whether the Queue's outer retry should re-attempt this error.
    ///
    /// Matches §7: network, timeout and upstream-5xx are retryable;
    /// everything else (including all infrastructure errors) is not —
    /// an infrastructure error during delivery is surfaced but does not
    /// drive the retry loop, since retrying it would not change the
    /// outcome within the same dispatch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::Timeout { .. } | Error::UpstreamServer { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Network { .. } | Error::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::UpstreamServer { .. } => StatusCode::BAD_GATEWAY,
            Error::UpstreamClient { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::UnauthorizedTarget { .. } => StatusCode::FORBIDDEN,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Database { .. } | Error::Queue { .. } | Error::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Internal { .. } | Error::Unknown { .. } | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::ShutdownInProgress => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Conflict { .. } => "CONFLICT",
            Error::Network { .. } => "NETWORK",
            Error::Timeout { .. } => "TIMEOUT",
            Error::UpstreamServer { .. } => "SERVER",
            Error::UpstreamClient { .. } => "CLIENT",
            Error::UnauthorizedTarget { .. } => "UNAUTHORIZED_TARGET",
            Error::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Error::Database { .. } => "DATABASE",
            Error::Queue { .. } => "QUEUE",
            Error::Configuration { .. } => "CONFIGURATION",
            Error::Internal { .. } => "INTERNAL",
            Error::ShutdownInProgress => "SHUTDOWN_IN_PROGRESS",
            Error::Unknown { .. } | Error::Other(_) => "UNKNOWN",
        }
    }

    /// Truncates a long error message to 500 characters for logging, per §7.
    /// Truncates by character, not byte offset, since the message may embed
    /// an arbitrary upstream error string with multibyte UTF-8 content.
    pub fn truncated_message(&self) -> String {
        let full = self.to_string();
        if full.chars().count() <= 500 {
            full
        } else {
            let mut s: String = full.chars().take(500).collect();
            s.push('…');
            s
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
