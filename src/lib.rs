//! Palisade — request-defense middleware pipeline for axum services.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                  DEFENSE PIPELINE                     │
//!                 │                                                       │
//!  Client Request │  audit entry                                          │
//!  ───────────────┼─▶ ┌────────┐  ┌─────────┐  ┌──────────┐  ┌─────────┐ │
//!                 │   │ threat │─▶│ headers │─▶│rate limit│─▶│sanitize │─┼─▶ handler
//!                 │   │ detect │  │ + CORS  │  │          │  │         │ │
//!                 │   └────────┘  └─────────┘  └──────────┘  └─────────┘ │
//!  Client Response│  audit exit (status, duration, size)                  │
//!  ◀──────────────┼──────────────────────────────────────────────────────┼──
//!                 │                                                       │
//!                 │  Cross-cutting: config presets, signatures,           │
//!                 │  observability, error taxonomy                        │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! Stage order is a global invariant enforced by the pipeline builder;
//! each stage is individually toggle-able through a preset's
//! [`config::SecurityConfig`].

// Core pipeline
pub mod audit;
pub mod error;
pub mod headers;
pub mod middleware;
pub mod pipeline;
pub mod rate_limit;
pub mod sanitize;
pub mod signatures;
pub mod threat;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use config::{AppConfig, Environment, SecurityConfig};
pub use error::Rejection;
pub use middleware::{defense_middleware, DefenseState};
pub use pipeline::{Orchestrator, PresetName, PresetRegistry, RegistryOptions, RequestContext};
pub use sanitize::{sanitize, SanitizationPolicy};

/// Milliseconds since the Unix epoch. Wall-clock time feeds audit records
/// and rate-limit windows alike.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
