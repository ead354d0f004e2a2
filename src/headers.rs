//! CORS and security response headers.
//!
//! # Responsibilities
//! - Intersect the Origin header against a fixed allow-list (strict)
//! - Emit the security header set; HSTS only under the strict variant
//!
//! # Design Decisions
//! - The strict variant never reflects an arbitrary Origin
//! - The dev variant may allow any localhost origin but never combines
//!   `*` with credentials

use axum::http::header::{HeaderName, HeaderValue};

use crate::config::schema::CorsVariant;

/// Compiled header policy for one variant.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    variant: CorsVariant,
    allowed_origins: Vec<String>,
}

impl HeaderPolicy {
    pub fn new(variant: CorsVariant, allowed_origins: Vec<String>) -> Self {
        Self {
            variant,
            allowed_origins,
        }
    }

    /// Decide which origin value, if any, to echo for this request.
    /// Returns the origin to put into Access-Control-Allow-Origin plus
    /// whether credentials are echoed.
    fn resolve_origin(&self, request_origin: Option<&str>) -> Option<(String, bool)> {
        match self.variant {
            CorsVariant::Strict => {
                let origin = request_origin?;
                if self.allowed_origins.iter().any(|o| o == origin) {
                    Some((origin.to_string(), true))
                } else {
                    None
                }
            }
            CorsVariant::Dev => {
                let origin = request_origin?;
                if is_localhost_origin(origin) || self.allowed_origins.iter().any(|o| o == origin) {
                    Some((origin.to_string(), true))
                } else {
                    None
                }
            }
            // Public API surface: any origin, never credentials.
            CorsVariant::Api => Some(("*".to_string(), false)),
        }
    }

    /// CORS headers for a request carrying `origin`.
    pub fn cors_headers(&self, origin: Option<&str>) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = Vec::new();
        if let Some((allow_origin, credentials)) = self.resolve_origin(origin) {
            if let Ok(value) = HeaderValue::from_str(&allow_origin) {
                headers.push((
                    HeaderName::from_static("access-control-allow-origin"),
                    value,
                ));
                headers.push((
                    HeaderName::from_static("access-control-allow-methods"),
                    HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
                ));
                headers.push((
                    HeaderName::from_static("access-control-allow-headers"),
                    HeaderValue::from_static("content-type, authorization, x-request-id"),
                ));
                if credentials && allow_origin != "*" {
                    headers.push((
                        HeaderName::from_static("access-control-allow-credentials"),
                        HeaderValue::from_static("true"),
                    ));
                }
            }
        }
        headers
    }

    /// The fixed security header set. HSTS is strict-variant only.
    pub fn security_headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = vec![
            (
                HeaderName::from_static("content-security-policy"),
                HeaderValue::from_static(
                    "default-src 'self'; frame-ancestors 'none'; base-uri 'self'",
                ),
            ),
            (
                HeaderName::from_static("x-frame-options"),
                HeaderValue::from_static("DENY"),
            ),
            (
                HeaderName::from_static("x-content-type-options"),
                HeaderValue::from_static("nosniff"),
            ),
            (
                HeaderName::from_static("x-xss-protection"),
                HeaderValue::from_static("1; mode=block"),
            ),
        ];
        if self.variant == CorsVariant::Strict {
            headers.push((
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static("max-age=31536000; includeSubDomains"),
            ));
        }
        headers
    }
}

fn is_localhost_origin(origin: &str) -> bool {
    let rest = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"));
    match rest {
        Some(host) => {
            let host = host.split(':').next().unwrap_or("");
            host == "localhost" || host == "127.0.0.1" || host == "[::1]"
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> HeaderPolicy {
        HeaderPolicy::new(
            CorsVariant::Strict,
            vec!["https://app.example.com".to_string()],
        )
    }

    fn header_value<'a>(
        headers: &'a [(HeaderName, HeaderValue)],
        name: &str,
    ) -> Option<&'a HeaderValue> {
        headers.iter().find(|(n, _)| n.as_str() == name).map(|(_, v)| v)
    }

    #[test]
    fn test_strict_never_reflects_unlisted_origin() {
        let policy = strict();
        let headers = policy.cors_headers(Some("https://evil.example"));
        assert!(header_value(&headers, "access-control-allow-origin").is_none());
    }

    #[test]
    fn test_strict_echoes_listed_origin_with_credentials() {
        let policy = strict();
        let headers = policy.cors_headers(Some("https://app.example.com"));
        assert_eq!(
            header_value(&headers, "access-control-allow-origin").unwrap(),
            "https://app.example.com"
        );
        assert_eq!(
            header_value(&headers, "access-control-allow-credentials").unwrap(),
            "true"
        );
    }

    #[test]
    fn test_dev_allows_localhost_any_port() {
        let policy = HeaderPolicy::new(CorsVariant::Dev, vec![]);
        for origin in ["http://localhost:3000", "http://127.0.0.1:8080", "http://localhost"] {
            let headers = policy.cors_headers(Some(origin));
            assert_eq!(
                header_value(&headers, "access-control-allow-origin").unwrap(),
                origin
            );
        }
        let headers = policy.cors_headers(Some("http://localhost.evil.com"));
        assert!(header_value(&headers, "access-control-allow-origin").is_none());
    }

    #[test]
    fn test_api_wildcard_never_carries_credentials() {
        let policy = HeaderPolicy::new(CorsVariant::Api, vec![]);
        let headers = policy.cors_headers(Some("https://anything.example"));
        assert_eq!(
            header_value(&headers, "access-control-allow-origin").unwrap(),
            "*"
        );
        assert!(header_value(&headers, "access-control-allow-credentials").is_none());
    }

    #[test]
    fn test_hsts_only_under_strict() {
        assert!(header_value(&strict().security_headers(), "strict-transport-security").is_some());
        let dev = HeaderPolicy::new(CorsVariant::Dev, vec![]);
        assert!(header_value(&dev.security_headers(), "strict-transport-security").is_none());
    }

    #[test]
    fn test_frame_options_is_deny() {
        let headers = strict().security_headers();
        assert_eq!(header_value(&headers, "x-frame-options").unwrap(), "DENY");
    }
}
