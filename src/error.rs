//! Unified error handling for the abuse shield.
//!
//! Policy denials (blocked, rate limited) are not errors; they are decisions.
//! Everything in here is an infrastructure or input failure and maps to a
//! response that is distinguishable from a denial.

use crate::config::ValidationError;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the block registry, rate limiter and middleware.
#[derive(Debug, Error)]
pub enum ShieldError {
    /// Malformed settings detected at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Store unavailable during a background cycle. Contained by the caller.
    #[error("record store unavailable: {0}")]
    TransientStore(#[source] StoreError),

    /// Store unavailable during a request-time block/unblock/append.
    #[error("failed to persist: {0}")]
    Persistence(#[source] StoreError),

    #[error("client address could not be determined")]
    IdentityUnresolved,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ShieldError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::TransientStore(_) => "transient_store",
            Self::Persistence(_) => "persistence",
            Self::IdentityUnresolved => "identity_unresolved",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Whether this is the caller's fault rather than ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::IdentityUnresolved | Self::InvalidInput(_))
    }
}

impl From<Vec<ValidationError>> for ShieldError {
    fn from(errors: Vec<ValidationError>) -> Self {
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self::Configuration(joined)
    }
}

impl IntoResponse for ShieldError {
    fn into_response(self) -> Response {
        // Store details never leave the process.
        let (status, body) = match &self {
            Self::IdentityUnresolved => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": "Bad request",
                    "message": "Unable to determine client address",
                }),
            ),
            Self::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "error": "Bad request", "message": msg }),
            ),
            Self::Configuration(_) | Self::TransientStore(_) | Self::Persistence(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": "Internal server error" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
