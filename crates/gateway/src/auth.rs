//! Shared-secret auth gate: every dialect accepts its own native credential
//! header, all checked against the single configured gateway key. Grounded
//! on `server/src/auth/layer.rs`'s header-extraction shape, simplified from
//! JWT/OAuth validation down to a constant-secret comparison since this
//! gateway has exactly one credential to check, not a token issuer to call
//! out to.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;

use crate::{AppState, error::GatewayError};

const ANTHROPIC_KEY_HEADER: &str = "x-api-key";
const GEMINI_KEY_HEADER: &str = "x-goog-api-key";

/// Extracts the caller-supplied key from whichever of the three dialect
/// conventions is present: `Authorization: Bearer <key>`, `x-api-key`, or
/// `x-goog-api-key`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(key) = value.strip_prefix("Bearer ") {
            return Some(key);
        }
    }

    if let Some(value) = headers.get(ANTHROPIC_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value);
    }

    headers.get(GEMINI_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Rejects the request unless the configured `api_key` is absent (auth gate
/// disabled) or one of the three credential headers matches it exactly.
pub async fn require_api_key(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Result<Response, GatewayError> {
    let Some(expected) = state.config.api_key.as_ref() else {
        return Ok(next.run(request).await);
    };

    match presented_key(request.headers()) {
        Some(key) if key == expected.expose_secret() => Ok(next.run(request).await),
        _ => Err(GatewayError::AuthenticationFailed),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn reads_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret123"));
        assert_eq!(presented_key(&headers), Some("secret123"));
    }

    #[test]
    fn reads_anthropic_header() {
        let mut headers = HeaderMap::new();
        headers.insert(ANTHROPIC_KEY_HEADER, HeaderValue::from_static("secret123"));
        assert_eq!(presented_key(&headers), Some("secret123"));
    }

    #[test]
    fn reads_gemini_header() {
        let mut headers = HeaderMap::new();
        headers.insert(GEMINI_KEY_HEADER, HeaderValue::from_static("secret123"));
        assert_eq!(presented_key(&headers), Some("secret123"));
    }

    #[test]
    fn absent_headers_yield_none() {
        assert_eq!(presented_key(&HeaderMap::new()), None);
    }
}
