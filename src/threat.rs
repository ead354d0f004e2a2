//! Scanner and attack-tool detection.
//!
//! A pure predicate over the User-Agent against the fingerprint table.
//! On match the chain terminates with 403, but the rejecting request is
//! still handed to the audit logger so the rejection itself is observable.
//! Indeterminate checks fail closed.

use crate::signatures::SCANNER_USER_AGENTS;

/// Outcome of fingerprint matching. Derived per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreatSignal {
    Clean,
    /// The matched fingerprint, for logging only.
    Scanner(&'static str),
}

impl ThreatSignal {
    pub fn is_threat(&self) -> bool {
        matches!(self, ThreatSignal::Scanner(_))
    }
}

#[derive(Debug, Default)]
pub struct ThreatDetector;

impl ThreatDetector {
    pub fn new() -> Self {
        Self
    }

    /// Case-insensitive substring match against the fingerprint table.
    /// A missing User-Agent is suspicious but not conclusive; it passes.
    pub fn inspect(&self, user_agent: Option<&str>) -> ThreatSignal {
        let Some(ua) = user_agent else {
            return ThreatSignal::Clean;
        };
        let ua = ua.to_lowercase();
        for fingerprint in SCANNER_USER_AGENTS {
            if ua.contains(fingerprint) {
                return ThreatSignal::Scanner(fingerprint);
            }
        }
        ThreatSignal::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_scanners_detected() {
        let detector = ThreatDetector::new();
        for ua in [
            "sqlmap/1.7.2#stable (https://sqlmap.org)",
            "Mozilla/5.0 Nikto/2.5.0",
            "Nmap Scripting Engine",
            "HYDRA v9",
        ] {
            assert!(detector.inspect(Some(ua)).is_threat(), "missed {ua:?}");
        }
    }

    #[test]
    fn test_regular_browsers_pass() {
        let detector = ThreatDetector::new();
        for ua in [
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
            "curl/8.4.0",
            "PostmanRuntime/7.36.0",
        ] {
            assert_eq!(detector.inspect(Some(ua)), ThreatSignal::Clean);
        }
    }

    #[test]
    fn test_missing_user_agent_passes() {
        assert_eq!(ThreatDetector::new().inspect(None), ThreatSignal::Clean);
    }
}
