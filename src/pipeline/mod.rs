//! The defense pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     audit entry
//!     → threat detection (fail closed)
//!     → CORS + security headers
//!     → rate limit (fail open on store errors)
//!     → sanitize body
//!     → application handler
//!     audit exit (fires on success, rejection and abort)
//! ```
//!
//! # Design Decisions
//! - Stages sit behind one capability interface; the builder enforces the
//!   fixed order at construction time rather than by convention
//! - Rejections are data, not panics; the first rejecting stage wins
//! - Per-stage fail mode: an erroring threat check rejects, an erroring
//!   counter store lets the request through

pub mod preset;

use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::error::Rejection;
use crate::headers::HeaderPolicy;
use crate::rate_limit::{client_identity, RateLimiter, RouteClass};
use crate::sanitize::{sanitize, SanitizationPolicy};
use crate::threat::{ThreatDetector, ThreatSignal};

pub use preset::{CompiledPreset, Orchestrator, PresetName, PresetRegistry, RegistryOptions};

/// Per-request view the stages operate on. Built once at ingress from the
/// raw request; the sanitized body and collected response headers flow
/// back out of it.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: String,
    pub path: String,
    pub route_class: RouteClass,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
    pub content_length: Option<usize>,
    /// Parsed body, present only for JSON / form-urlencoded requests.
    pub body: Option<Value>,
    /// Headers stages want on the response (quota, CORS, security set).
    pub response_headers: Vec<(HeaderName, HeaderValue)>,
}

impl RequestContext {
    pub fn new(method: &Method, path: &str, headers: &HeaderMap) -> Self {
        let header_str =
            |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);
        Self {
            request_id: Uuid::new_v4(),
            method: method.to_string(),
            path: path.to_string(),
            route_class: RouteClass::classify(path),
            client_ip: client_identity(headers),
            user_agent: header_str("user-agent"),
            origin: header_str("origin"),
            content_length: headers
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            body: None,
            response_headers: Vec::new(),
        }
    }
}

/// What a stage decided for this request.
#[derive(Debug)]
pub enum StageOutcome {
    Continue,
    Reject(Rejection),
}

/// Internal stage failure (counter store down, etc). Mapped through the
/// stage's fail mode, never surfaced to the client as-is.
#[derive(Debug, Error)]
#[error("stage failure: {0}")]
pub struct StageError(pub String);

/// What an indeterminate check defaults to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Open,
    Closed,
}

/// Position of a stage in the fixed chain. The numeric order is the
/// global invariant the builder enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageKind {
    Threat = 0,
    Headers = 1,
    RateLimit = 2,
    Sanitize = 3,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Threat => "threat",
            StageKind::Headers => "headers",
            StageKind::RateLimit => "rate_limit",
            StageKind::Sanitize => "sanitize",
        }
    }
}

/// One link in the chain.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// False negatives in abuse throttling are cheaper than false
    /// negatives in attack blocking, so only threat detection fails closed.
    fn fail_mode(&self) -> FailMode {
        match self.kind() {
            StageKind::Threat => FailMode::Closed,
            _ => FailMode::Open,
        }
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<StageOutcome, StageError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("stage {found} cannot follow {previous}: fixed order violated")]
    OutOfOrder {
        previous: &'static str,
        found: &'static str,
    },
    #[error("duplicate stage: {0}")]
    Duplicate(&'static str),
}

/// Assembles a pipeline while enforcing the fixed stage order at
/// construction time.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Result<Pipeline, BuildError> {
        let mut previous: Option<StageKind> = None;
        for stage in &self.stages {
            let kind = stage.kind();
            if let Some(prev) = previous {
                if kind == prev {
                    return Err(BuildError::Duplicate(kind.as_str()));
                }
                if kind < prev {
                    return Err(BuildError::OutOfOrder {
                        previous: prev.as_str(),
                        found: kind.as_str(),
                    });
                }
            }
            previous = Some(kind);
        }
        Ok(Pipeline {
            stages: self.stages,
        })
    }
}

/// An ordered, immutable chain of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn run(&self, ctx: &mut RequestContext) -> Result<(), Rejection> {
        for stage in &self.stages {
            match stage.apply(ctx) {
                Ok(StageOutcome::Continue) => {}
                Ok(StageOutcome::Reject(rejection)) => return Err(rejection),
                Err(error) => match stage.fail_mode() {
                    FailMode::Open => {
                        tracing::error!(
                            stage = stage.kind().as_str(),
                            %error,
                            "Stage failed, continuing (fail open)"
                        );
                    }
                    FailMode::Closed => {
                        tracing::error!(
                            stage = stage.kind().as_str(),
                            %error,
                            "Stage failed, rejecting (fail closed)"
                        );
                        return Err(Rejection::Forbidden);
                    }
                },
            }
        }
        Ok(())
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }
}

// ── Stage implementations ────────────────────────────────────────────

/// Short-circuits on scanner fingerprints.
pub struct ThreatStage {
    detector: ThreatDetector,
}

impl ThreatStage {
    pub fn new() -> Self {
        Self {
            detector: ThreatDetector::new(),
        }
    }
}

impl Default for ThreatStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for ThreatStage {
    fn kind(&self) -> StageKind {
        StageKind::Threat
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<StageOutcome, StageError> {
        match self.detector.inspect(ctx.user_agent.as_deref()) {
            ThreatSignal::Scanner(fingerprint) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    client = %ctx.client_ip,
                    fingerprint,
                    "Scanner fingerprint matched"
                );
                Ok(StageOutcome::Reject(Rejection::Forbidden))
            }
            ThreatSignal::Clean => Ok(StageOutcome::Continue),
        }
    }
}

/// Collects the CORS decision and security header set for the response.
pub struct HeaderStage {
    policy: HeaderPolicy,
}

impl HeaderStage {
    pub fn new(policy: HeaderPolicy) -> Self {
        Self { policy }
    }
}

impl Stage for HeaderStage {
    fn kind(&self) -> StageKind {
        StageKind::Headers
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<StageOutcome, StageError> {
        ctx.response_headers
            .extend(self.policy.cors_headers(ctx.origin.as_deref()));
        ctx.response_headers.extend(self.policy.security_headers());
        Ok(StageOutcome::Continue)
    }
}

/// Counts the request and attaches quota headers, or rejects with 429.
pub struct RateLimitStage {
    limiter: Arc<RateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Stage for RateLimitStage {
    fn kind(&self) -> StageKind {
        StageKind::RateLimit
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<StageOutcome, StageError> {
        if self.limiter.options().disabled {
            return Ok(StageOutcome::Continue);
        }
        let decision = self
            .limiter
            .check(&ctx.client_ip, ctx.route_class)
            .map_err(|e| StageError(e.to_string()))?;

        if !decision.allowed {
            return Ok(StageOutcome::Reject(Rejection::RateLimited {
                limit: decision.limit,
                reset_at_ms: decision.reset_at_ms,
            }));
        }

        let mut push = |name: &'static str, value: String| {
            if let Ok(v) = HeaderValue::from_str(&value) {
                ctx.response_headers.push((HeaderName::from_static(name), v));
            }
        };
        push("x-ratelimit-limit", decision.limit.to_string());
        push("x-ratelimit-remaining", decision.remaining.to_string());
        push("x-ratelimit-reset", (decision.reset_at_ms / 1000).to_string());
        Ok(StageOutcome::Continue)
    }
}

/// Scrubs the parsed body in place. Requests without a parsed body pass
/// through untouched.
pub struct SanitizeStage {
    policy: Arc<SanitizationPolicy>,
}

impl SanitizeStage {
    pub fn new(policy: Arc<SanitizationPolicy>) -> Self {
        Self { policy }
    }
}

impl Stage for SanitizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Sanitize
    }

    fn apply(&self, ctx: &mut RequestContext) -> Result<StageOutcome, StageError> {
        if let Some(body) = &ctx.body {
            ctx.body = Some(sanitize(body, &self.policy));
        }
        Ok(StageOutcome::Continue)
    }
}
