//! Gateway error taxonomy and per-dialect error response bodies.
//!
//! Three kinds only, per the upstream contract: `invalid_request` (malformed
//! client input), `authentication_error` (bad or absent shared key), and
//! `api_error` (upstream failure, OAuth failure, or transport failure after
//! all endpoints are exhausted). Schema sanitization and thinking-policy
//! repair never produce an error — they downgrade silently instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

const MAX_UPSTREAM_MESSAGE_LEN: usize = 500;

/// Errors that can surface to a client across any of the six dialects.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed JSON, a missing required field, or a request the router
    /// cannot map to a handler.
    #[error("{0}")]
    InvalidRequest(String),

    /// The shared key was absent or did not match any of the three accepted
    /// headers.
    #[error("invalid api key")]
    AuthenticationFailed,

    /// The upstream returned an HTTP error after all endpoints and retries
    /// were exhausted, or OAuth token exchange failed.
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
}

impl GatewayError {
    /// Builds an [`GatewayError::Upstream`] from a propagated upstream
    /// response, truncating the body to a fixed character cap.
    pub fn upstream(status: StatusCode, body: &str) -> Self {
        let message = if body.len() > MAX_UPSTREAM_MESSAGE_LEN {
            format!("{}...", &body[..MAX_UPSTREAM_MESSAGE_LEN])
        } else {
            body.to_owned()
        };

        Self::Upstream { status, message }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            Self::Upstream { status, .. } => *status,
        }
    }

    /// The dialect-agnostic `error.type` discriminant.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::AuthenticationFailed => "authentication_error",
            Self::Upstream { .. } => "api_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetails,
}

#[derive(Debug, Serialize)]
struct OpenAiErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let r#type = self.error_type().to_owned();
        let message = self.to_string();

        let body = OpenAiErrorBody {
            error: OpenAiErrorDetails {
                message,
                r#type,
                code: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Anthropic-shaped `{"type":"error","error":{"type":...,"message":...}}`.
pub struct AnthropicError(GatewayError);

impl From<GatewayError> for AnthropicError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicErrorBody {
    r#type: &'static str,
    error: AnthropicErrorDetails,
}

#[derive(Debug, Serialize)]
struct AnthropicErrorDetails {
    r#type: String,
    message: String,
}

impl IntoResponse for AnthropicError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();

        let body = AnthropicErrorBody {
            r#type: "error",
            error: AnthropicErrorDetails {
                r#type: self.0.error_type().to_owned(),
                message: self.0.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Gemini-shaped `{"error":{"code":...,"message":...,"status":...}}`.
pub struct GeminiError(GatewayError);

impl From<GatewayError> for GeminiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetails,
}

#[derive(Debug, Serialize)]
struct GeminiErrorDetails {
    code: u16,
    message: String,
    status: String,
}

impl IntoResponse for GeminiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();

        let body = GeminiErrorBody {
            error: GeminiErrorDetails {
                code: status.as_u16(),
                message: self.0.to_string(),
                status: status.canonical_reason().unwrap_or("UNKNOWN").replace(' ', "_").to_uppercase(),
            },
        };

        (status, Json(body)).into_response()
    }
}
