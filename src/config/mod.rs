//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file (optional)
//!     → loader.rs (parse, validate)
//!     → schema.rs types
//!     → preset registry (frozen SecurityConfig values)
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppConfig, CorsVariant, Environment, ObservabilityConfig, RateLimitOptions,
    SanitizationVariant, SecurityConfig,
};
