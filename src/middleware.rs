//! Axum adapter for the defense pipeline.
//!
//! # Responsibilities
//! - Build the per-request [`RequestContext`] and open the audit scope
//! - Reject oversized requests from Content-Length before the body is read
//! - Buffer and parse JSON / form-urlencoded bodies for sanitization
//! - Run the preset pipeline, then hand the (possibly rewritten) request
//!   to the application handler
//! - Copy stage-collected headers onto the response and close the audit
//!   scope with status, duration and size
//!
//! # Design Decisions
//! - Bodies that fail to parse pass through unsanitized rather than being
//!   rejected; a deliberate leniency for non-JSON clients
//! - CORS and security headers are attached to rejection responses too,
//!   so a 429 never leaks ahead of CORS validation

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::audit::{AuditLogger, AuditScope, AuditStatus};
use crate::error::Rejection;
use crate::observability::metrics;
use crate::pipeline::{Orchestrator, RequestContext};

/// Shared state behind the middleware.
pub struct DefenseState {
    pub orchestrator: Arc<Orchestrator>,
    pub audit: Arc<AuditLogger>,
}

impl DefenseState {
    pub fn new(orchestrator: Arc<Orchestrator>, audit: Arc<AuditLogger>) -> Self {
        Self { orchestrator, audit }
    }
}

enum ParsedBody {
    /// Sanitizable and parsed; carries the codec for re-serialization.
    Structured(BodyCodec),
    /// Anything else: raw bytes flow through untouched.
    Opaque(Bytes),
    Empty,
}

#[derive(Clone, Copy)]
enum BodyCodec {
    Json,
    Form,
}

/// Middleware function wiring the pipeline in front of the handler.
pub async fn defense_middleware(
    State(state): State<Arc<DefenseState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let mut ctx = RequestContext::new(&parts.method, &path, &parts.headers);
    let preset = state.orchestrator.resolve_for(ctx.route_class);
    let route_class = ctx.route_class.as_str();

    let scope = preset.config.audit.then(|| {
        state.audit.begin(
            ctx.request_id,
            &ctx.method,
            &path,
            &ctx.client_ip,
            ctx.user_agent.as_deref(),
            &parts.headers,
        )
    });

    // Size check from Content-Length, before any body work.
    if let Some(length) = ctx.content_length {
        if length > preset.config.max_request_size {
            let rejection = Rejection::PayloadTooLarge {
                limit: preset.config.max_request_size,
            };
            return reject(scope, &ctx, rejection, route_class, start);
        }
    }

    // Buffer the body only when sanitization can use it; everything else
    // streams through untouched.
    let codec = if preset.config.sanitization {
        sanitizable_codec(&parts)
    } else {
        None
    };
    let (parsed, passthrough) = match codec {
        Some(codec) => match axum::body::to_bytes(body, preset.config.max_request_size).await {
            Ok(bytes) if bytes.is_empty() => (ParsedBody::Empty, None),
            Ok(bytes) => match decode_body(codec, &bytes) {
                Some(value) => {
                    ctx.body = Some(value);
                    (ParsedBody::Structured(codec), None)
                }
                None => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        "Body did not parse, passing through unsanitized"
                    );
                    (ParsedBody::Opaque(bytes), None)
                }
            },
            // Streamed past the limit despite the Content-Length check.
            Err(_) => {
                let rejection = Rejection::PayloadTooLarge {
                    limit: preset.config.max_request_size,
                };
                return reject(scope, &ctx, rejection, route_class, start);
            }
        },
        None => (ParsedBody::Empty, Some(body)),
    };

    if let Err(rejection) = state.orchestrator.apply(&mut ctx) {
        return reject(scope, &ctx, rejection, route_class, start);
    }

    let request = match passthrough {
        Some(body) => Request::from_parts(parts, body),
        None => match rebuild_request(parts, parsed, ctx.body.take()) {
            Ok(request) => request,
            Err(rejection) => return reject(scope, &ctx, rejection, route_class, start),
        },
    };

    let mut response = next.run(request).await;
    apply_collected_headers(&mut response, &ctx);

    let status = response.status().as_u16();
    let size = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    metrics::record_request(route_class, status, start);
    if let Some(scope) = scope {
        scope.complete(AuditStatus::Completed(status), size);
    }
    response
}

fn sanitizable_codec(parts: &Parts) -> Option<BodyCodec> {
    let content_type = parts.headers.get(CONTENT_TYPE)?.to_str().ok()?;
    if content_type.starts_with("application/json") {
        Some(BodyCodec::Json)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Some(BodyCodec::Form)
    } else {
        None
    }
}

fn decode_body(codec: BodyCodec, bytes: &Bytes) -> Option<Value> {
    match codec {
        BodyCodec::Json => serde_json::from_slice(bytes).ok(),
        BodyCodec::Form => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes).ok()?;
            let mut map = serde_json::Map::with_capacity(pairs.len());
            for (key, value) in pairs {
                map.insert(key, Value::String(value));
            }
            Some(Value::Object(map))
        }
    }
}

fn encode_body(codec: BodyCodec, value: &Value) -> Result<Vec<u8>, Rejection> {
    match codec {
        BodyCodec::Json => serde_json::to_vec(value).map_err(|_| Rejection::Validation),
        BodyCodec::Form => {
            let pairs: Vec<(&str, &str)> = value
                .as_object()
                .map(|map| {
                    map.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
                        .collect()
                })
                .unwrap_or_default();
            serde_urlencoded::to_string(pairs)
                .map(String::into_bytes)
                .map_err(|_| Rejection::Validation)
        }
    }
}

fn rebuild_request(
    mut parts: Parts,
    parsed: ParsedBody,
    sanitized: Option<Value>,
) -> Result<Request, Rejection> {
    let bytes = match (parsed, sanitized) {
        (ParsedBody::Structured(codec), Some(value)) => encode_body(codec, &value)?,
        (ParsedBody::Opaque(bytes), _) => bytes.to_vec(),
        (ParsedBody::Empty, _) | (ParsedBody::Structured(_), None) => Vec::new(),
    };
    if let Ok(len) = HeaderValue::from_str(&bytes.len().to_string()) {
        parts.headers.insert(CONTENT_LENGTH, len);
    }
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Terminal path for every pipeline rejection: headers collected so far
/// still apply, the audit scope closes with the rejection status.
fn reject(
    scope: Option<AuditScope>,
    ctx: &RequestContext,
    rejection: Rejection,
    route_class: &'static str,
    start: Instant,
) -> Response {
    let kind = rejection.code();
    let status = rejection.status();
    let mut response = rejection.into_response();
    apply_collected_headers(&mut response, ctx);

    metrics::record_rejected(kind);
    metrics::record_request(route_class, status.as_u16(), start);
    if let Some(scope) = scope {
        scope.complete(AuditStatus::Rejected(status.as_u16()), None);
    }
    response
}

fn apply_collected_headers(response: &mut Response, ctx: &RequestContext) {
    let headers = response.headers_mut();
    for (name, value) in &ctx.response_headers {
        headers.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_round_trip_preserves_pairs() {
        let bytes = Bytes::from_static(b"email=a%40b.com&name=bob");
        let value = decode_body(BodyCodec::Form, &bytes).unwrap();
        assert_eq!(value["email"], "a@b.com");
        let encoded = encode_body(BodyCodec::Form, &value).unwrap();
        let reparsed = decode_body(BodyCodec::Form, &Bytes::from(encoded)).unwrap();
        assert_eq!(reparsed, value);
    }

    #[test]
    fn test_invalid_json_yields_none() {
        assert!(decode_body(BodyCodec::Json, &Bytes::from_static(b"{nope")).is_none());
        assert!(decode_body(BodyCodec::Json, &Bytes::from_static(b"{\"a\":1}")).is_some());
    }

    #[test]
    fn test_json_encode_round_trip() {
        let value = json!({"a": ["x", 1], "b": null});
        let encoded = encode_body(BodyCodec::Json, &value).unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&encoded).unwrap(), value);
    }
}
