//! Static signature tables.
//!
//! # Responsibilities
//! - XSS markers (tags, URI schemes, event handlers, CSS vectors)
//! - SQL injection tokens and comment markers
//! - Path traversal sequences including encoded variants
//! - Dangerous executable file extensions
//! - Scanner / attack-tool User-Agent fingerprints
//! - Fixed HTML entity decode map
//!
//! Pure data: no behavior lives here beyond lazy compilation. Consumers
//! decide what matching means.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bumped whenever a table gains or loses a pattern.
pub const TABLES_VERSION: u32 = 3;

/// HTML entities decoded before any pattern matching, so entity-encoded
/// attacks are normalized and caught. Fixed set; this is not a full
/// entity parser.
pub const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&#x2F;", "/"),
    ("&#x60;", "`"),
    ("&#x3D;", "="),
    // Ampersand last so "&amp;lt;" decodes in one pass per layer.
    ("&amp;", "&"),
];

/// XSS signature patterns, stripped (not merely detected).
pub static XSS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<script[^>]*>.*?</script\s*>",
        r"(?i)<script[^>]*>",
        r"(?i)</script\s*>",
        r"(?is)<iframe[^>]*>.*?</iframe\s*>",
        r"(?i)<iframe[^>]*>",
        r"(?i)<object[^>]*>",
        r"(?i)<embed[^>]*>",
        r"(?i)<link[^>]*>",
        r"(?i)<meta[^>]*>",
        r"(?i)javascript\s*:",
        r"(?i)vbscript\s*:",
        r"(?i)data\s*:\s*text/html",
        r"(?i)\bon\w+\s*=\s*(?:'[^']*'|\x22[^\x22]*\x22|[^\s>]+)",
        r"(?i)expression\s*\(",
        r"(?i)url\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("xss pattern compiles"))
    .collect()
});

/// Matches any remaining tag-like substring. Used for blanket stripping
/// when a policy allows no tags at all.
pub static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)</?([a-zA-Z][a-zA-Z0-9-]*)((?:[^>])*)>").expect("tag pattern compiles"));

/// Matches one attribute inside a kept tag.
pub static TAG_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z][a-zA-Z0-9-]*)\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("attribute pattern compiles")
});

/// SQL injection tokens. Keywords are only stripped as whole words.
pub static SQL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(select|insert|update|delete|drop|truncate|alter|create|exec|execute|union|declare)\b",
        r"(?i)\b(or|and)\b\s+('?[\w]+'?\s*=\s*'?[\w]+'?)",
        r"--[^\r\n]*",
        r"(?s)/\*.*?\*/",
        r"#[^\r\n]*",
        r";\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("sql pattern compiles"))
    .collect()
});

/// Path traversal sequences, including URL-encoded, double-encoded and
/// overlong-UTF-8 spellings.
pub static TRAVERSAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\.\./",
        r"\.\.\\",
        r"(?i)\.\.%2f",
        r"(?i)\.\.%5c",
        r"(?i)%2e%2e%2f",
        r"(?i)%2e%2e%5c",
        r"(?i)%2e%2e/",
        r"(?i)%252e%252e%252f",
        r"(?i)%252e%252e%255c",
        r"(?i)%c0%ae%c0%ae/",
        r"(?i)%c0%ae%c0%ae%c0%af",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("traversal pattern compiles"))
    .collect()
});

/// Extensions rewritten to `.txt` when a sanitized value ends in one.
pub const DANGEROUS_EXTENSIONS: &[&str] = &[
    ".php", ".php3", ".php4", ".php5", ".phtml", ".exe", ".sh", ".bash", ".bat", ".cmd", ".com",
    ".scr", ".pl", ".py", ".cgi", ".asp", ".aspx", ".jsp", ".dll", ".jar", ".msi",
];

/// Attack-tool and scanner fingerprints, matched case-insensitively as
/// substrings of the User-Agent.
pub const SCANNER_USER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "nessus",
    "openvas",
    "acunetix",
    "netsparker",
    "dirbuster",
    "gobuster",
    "wfuzz",
    "wpscan",
    "metasploit",
    "hydra",
    "burpsuite",
    "burp suite",
    "zgrab",
    "havij",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tables_compile() {
        assert!(!XSS_PATTERNS.is_empty());
        assert!(!SQL_PATTERNS.is_empty());
        assert!(!TRAVERSAL_PATTERNS.is_empty());
        assert!(HTML_TAG.is_match("<div class=\"x\">"));
    }

    #[test]
    fn test_xss_patterns_catch_common_vectors() {
        let hits = [
            "<script>alert(1)</script>",
            "<IFRAME src=x>",
            "javascript:alert(1)",
            "<img src=x onerror=alert(1)>",
            "expression(alert(1))",
        ];
        for input in hits {
            assert!(
                XSS_PATTERNS.iter().any(|re| re.is_match(input)),
                "no pattern matched {input:?}"
            );
        }
    }

    #[test]
    fn test_sql_patterns_are_word_bounded() {
        let keyword = &SQL_PATTERNS[0];
        assert!(keyword.is_match("UNION SELECT password"));
        // "selection" and "order" must survive
        assert!(!keyword.is_match("a selection of orders"));
    }

    #[test]
    fn test_traversal_patterns_catch_encoded_variants() {
        for input in ["../", "..\\", "..%2F", "%2e%2e%2f", "%252e%252e%252f"] {
            assert!(
                TRAVERSAL_PATTERNS.iter().any(|re| re.is_match(input)),
                "no pattern matched {input:?}"
            );
        }
    }
}
