//! Rejection taxonomy for the defense pipeline.
//!
//! # Responsibilities
//! - Define the four terminal decisions a stage can make
//! - Map each decision to an HTTP status and a JSON error envelope
//! - Never echo offending payloads or internal state back to the client
//!
//! # Design Decisions
//! - All rejections are local, terminal decisions; none propagate as
//!   unhandled errors into application handlers
//! - Error bodies carry a generic message plus a timestamp, no stack traces

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::now_ms;

/// A terminal decision made inside the pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    /// Malformed or dangerous structured input. Surfaced as 400 with a
    /// generic message; the offending payload is never echoed back.
    #[error("request validation failed")]
    Validation,

    /// Threat signature matched. Surfaced as 403, logged at warn level.
    #[error("request forbidden")]
    Forbidden,

    /// Request body exceeds the configured limit, decided from
    /// Content-Length before the body is read.
    #[error("payload too large")]
    PayloadTooLarge { limit: usize },

    /// Rate limit exceeded. Carries the machine-readable reset time.
    #[error("rate limit exceeded")]
    RateLimited { limit: u32, reset_at_ms: u64 },
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Validation => StatusCode::BAD_REQUEST,
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Short machine-readable error code for the JSON envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Validation => "validation_error",
            Rejection::Forbidden => "forbidden",
            Rejection::PayloadTooLarge { .. } => "payload_too_large",
            Rejection::RateLimited { .. } => "rate_limited",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.code(),
            "message": self.to_string(),
            "timestamp": now_ms(),
        });

        let mut response = (self.status(), axum::Json(body)).into_response();

        if let Rejection::RateLimited { limit, reset_at_ms } = self {
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("x-ratelimit-limit", v);
            }
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            if let Ok(v) = HeaderValue::from_str(&(reset_at_ms / 1000).to_string()) {
                headers.insert("x-ratelimit-reset", v);
            }
            // Retry-After is delta-seconds, not an absolute timestamp.
            let wait_secs = reset_at_ms.saturating_sub(now_ms()).div_ceil(1000);
            if let Ok(v) = HeaderValue::from_str(&wait_secs.to_string()) {
                headers.insert(header::RETRY_AFTER, v);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Rejection::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Rejection::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Rejection::PayloadTooLarge { limit: 1024 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Rejection::RateLimited { limit: 5, reset_at_ms: 0 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_rate_limited_response_carries_reset_headers() {
        let reset_at_ms = now_ms() + 30_000;
        let rejection = Rejection::RateLimited {
            limit: 10,
            reset_at_ms,
        };
        let response = rejection.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(
            response.headers()["x-ratelimit-reset"],
            (reset_at_ms / 1000).to_string().as_str()
        );
        let wait: u64 = response.headers()["retry-after"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=30).contains(&wait), "not delta-seconds: {wait}");
    }

    #[test]
    fn test_retry_after_clamps_to_zero_for_past_reset() {
        let rejection = Rejection::RateLimited {
            limit: 10,
            reset_at_ms: 0,
        };
        let response = rejection.into_response();
        assert_eq!(response.headers()["retry-after"], "0");
    }
}
