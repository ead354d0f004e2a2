//! Per-client, per-route-class rate limiting.
//!
//! # Responsibilities
//! - Derive the counting key from client identity and route class
//! - Apply fixed-window limits, stricter for auth-class routes
//! - Emit X-RateLimit-Limit / Remaining / Reset quota headers
//! - Reject over-limit requests with 429 and a Retry-After timestamp
//!
//! # Design Decisions
//! - Client identity prefers the first X-Forwarded-For hop, then X-Real-IP,
//!   then CF-Connecting-IP, then the "anonymous" sentinel
//! - Fixed window, not sliding: the boundary is computed lazily on the first
//!   request past expiry
//! - An explicit disable flag exists for automated test runs; it is an
//!   escape hatch, never a bypassable default

pub mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

pub use store::{MemoryStore, RateDecision, RateStore, StoreError};

use crate::config::schema::RateLimitOptions;

/// Coarse endpoint grouping used to select differentiated limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Auth,
    Admin,
    Api,
    Webhook,
    Public,
}

impl RouteClass {
    /// Classify a request path by prefix.
    pub fn classify(path: &str) -> Self {
        if path.starts_with("/auth") || path.starts_with("/login") || path.starts_with("/register")
        {
            RouteClass::Auth
        } else if path.starts_with("/admin") {
            RouteClass::Admin
        } else if path.starts_with("/webhook") {
            RouteClass::Webhook
        } else if path.starts_with("/api") {
            RouteClass::Api
        } else {
            RouteClass::Public
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Auth => "auth",
            RouteClass::Admin => "admin",
            RouteClass::Api => "api",
            RouteClass::Webhook => "webhook",
            RouteClass::Public => "public",
        }
    }
}

/// Best-effort client identity from forwarded-IP headers. Falls back to the
/// "anonymous" sentinel so unidentifiable clients share one bucket.
pub fn client_identity(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first_hop) = forwarded.split(',').next() {
            let ip = first_hop.trim();
            if !ip.is_empty() && ip != "unknown" {
                return ip.to_string();
            }
        }
    }
    for header in ["x-real-ip", "cf-connecting-ip"] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            let ip = value.trim();
            if !ip.is_empty() && ip != "unknown" {
                return ip.to_string();
            }
        }
    }
    "anonymous".to_string()
}

/// Fixed-window rate limiter over an injected counter store.
pub struct RateLimiter {
    store: Arc<dyn RateStore>,
    options: RateLimitOptions,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateStore>, options: RateLimitOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &RateLimitOptions {
        &self.options
    }

    /// Limit for a route class. Auth-class routes get the strictest budget.
    pub fn limit_for(&self, class: RouteClass) -> u32 {
        match class {
            RouteClass::Auth => self.options.auth_limit,
            RouteClass::Admin => self.options.admin_limit,
            RouteClass::Webhook => self.options.webhook_limit,
            RouteClass::Api | RouteClass::Public => self.options.api_limit,
        }
    }

    /// Count one request. `Ok` carries the decision; `Err` means the store
    /// is unreachable and the caller decides the fail policy.
    pub fn check(&self, identity: &str, class: RouteClass) -> Result<RateDecision, StoreError> {
        let key = format!("{identity}:{}", class.as_str());
        let limit = self.limit_for(class);
        let window = Duration::from_millis(self.options.window_ms);
        let decision = self.store.check(&key, limit, window)?;
        if !decision.allowed {
            tracing::warn!(
                client = %identity,
                route_class = class.as_str(),
                limit,
                "Rate limit exceeded"
            );
        }
        Ok(decision)
    }

    pub fn sweep(&self) {
        self.store.sweep();
    }
}
