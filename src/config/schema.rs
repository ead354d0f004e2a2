//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Variant selectors are closed enums, so an unknown variant name is a
//! construction-time error rather than a silent default fallback.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::sanitize::SanitizationPolicy;

/// Deployment environment, normally taken from `PALISADE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    /// Read from `PALISADE_ENV`. Unset selects development; a present but
    /// unrecognized value is an error, so a typo in production cannot
    /// silently demote the defenses to the dev variant.
    pub fn from_env() -> Result<Self, String> {
        Self::resolve(std::env::var("PALISADE_ENV").ok().as_deref())
    }

    fn resolve(value: Option<&str>) -> Result<Self, String> {
        match value {
            Some(v) => v.parse(),
            None => Ok(Environment::Development),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// CORS variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorsVariant {
    /// Fixed origin allow-list, credentials echoed for listed origins only.
    Strict,
    /// Any localhost origin plus the allow-list; never `*` with credentials.
    Dev,
    /// Wildcard origin, credentials never echoed.
    Api,
}

/// Named sanitization policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationVariant {
    Strict,
    Moderate,
    Lenient,
    Api,
    FileUpload,
    Search,
    Admin,
}

impl SanitizationVariant {
    pub fn policy(&self) -> SanitizationPolicy {
        match self {
            SanitizationVariant::Strict => SanitizationPolicy::strict(),
            SanitizationVariant::Moderate => SanitizationPolicy::moderate(),
            SanitizationVariant::Lenient => SanitizationPolicy::lenient(),
            SanitizationVariant::Api => SanitizationPolicy::api(),
            SanitizationVariant::FileUpload => SanitizationPolicy::file_upload(),
            SanitizationVariant::Search => SanitizationPolicy::search(),
            SanitizationVariant::Admin => SanitizationPolicy::admin(),
        }
    }
}

/// Rate limiting options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitOptions {
    /// Requests per window for auth-class routes (strictest).
    pub auth_limit: u32,
    /// Requests per window for api/public routes.
    pub api_limit: u32,
    pub admin_limit: u32,
    pub webhook_limit: u32,
    /// Fixed window length in milliseconds.
    pub window_ms: u64,
    /// Disable counting entirely. Intended for automated test runs.
    pub disabled: bool,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            auth_limit: 10,
            api_limit: 100,
            admin_limit: 30,
            webhook_limit: 60,
            window_ms: 60_000,
            disabled: false,
        }
    }
}

/// One preset's worth of pipeline configuration. Presets are frozen
/// instances of this struct; composing one never mutates a shared default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub threat_detection: bool,
    pub security_headers: bool,
    pub rate_limit: bool,
    pub sanitization: bool,
    pub audit: bool,
    /// Maximum request body size in bytes, checked from Content-Length.
    pub max_request_size: usize,
    pub cors: CorsVariant,
    pub allowed_origins: Vec<String>,
    pub rate_limit_options: RateLimitOptions,
    pub sanitization_options: SanitizationVariant,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            threat_detection: true,
            security_headers: true,
            rate_limit: true,
            sanitization: true,
            audit: true,
            max_request_size: 2 * 1024 * 1024, // 2MB
            cors: CorsVariant::Strict,
            allowed_origins: Vec::new(),
            rate_limit_options: RateLimitOptions::default(),
            sanitization_options: SanitizationVariant::Strict,
        }
    }
}

/// Root configuration for the demo server binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub listener: ListenerConfig,
    /// Overrides `PALISADE_ENV` when set.
    pub environment: Option<Environment>,
    pub observability: ObservabilityConfig,
    /// Origins merged into every preset's allow-list.
    pub allowed_origins: Vec<String>,
    /// Escape hatch for automated test runs.
    pub rate_limit_disabled: bool,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_variant_is_a_parse_error() {
        let toml = r#"cors = "permissive""#;
        assert!(toml::from_str::<SecurityConfig>(toml).is_err());
    }

    #[test]
    fn test_known_variants_parse() {
        let toml = r#"
            cors = "dev"
            sanitization_options = "file_upload"
        "#;
        let config: SecurityConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cors, CorsVariant::Dev);
        assert_eq!(config.sanitization_options, SanitizationVariant::FileUpload);
    }

    #[test]
    fn test_defaults_enable_every_stage() {
        let config = SecurityConfig::default();
        assert!(config.threat_detection);
        assert!(config.security_headers);
        assert!(config.rate_limit);
        assert!(config.sanitization);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!("DEV".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_env_unset_defaults_but_invalid_errors() {
        assert_eq!(
            Environment::resolve(None).unwrap(),
            Environment::Development
        );
        assert_eq!(
            Environment::resolve(Some("prod")).unwrap(),
            Environment::Production
        );
        assert!(Environment::resolve(Some("porduction")).is_err());
    }
}
