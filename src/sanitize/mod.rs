//! Input sanitizer.
//!
//! # Data Flow
//! ```text
//! JSON value
//!     → decode HTML entities (normalize encoded attacks first)
//!     → truncate to policy.max_length
//!     → strip XSS signatures (or allow-list filter when tags are allowed)
//!     → strip SQL tokens, escape quotes
//!     → strip path traversal, defuse executable extensions
//!     → custom sanitizers in declared order
//!     → clamp to policy.max_length again (quote escaping can regrow)
//! ```
//!
//! # Design Decisions
//! - Stage order is a contract: later stages assume earlier stages already
//!   normalized encodings
//! - Every stripping loop runs to a fixpoint so reassembled payloads
//!   ("<scr<script>ipt>") cannot survive, and sanitize(sanitize(v)) == sanitize(v)
//! - Total over JSON-compatible input; non-string scalars pass through

pub mod policy;

use serde_json::Value;

use crate::signatures::{
    DANGEROUS_EXTENSIONS, HTML_ENTITIES, HTML_TAG, SQL_PATTERNS, TAG_ATTRIBUTE,
    TRAVERSAL_PATTERNS, XSS_PATTERNS,
};
pub use policy::{CustomSanitizer, SanitizationPolicy};

/// Sanitize a JSON value according to `policy`. Total function: maps,
/// sequences and strings are rewritten, everything else passes through
/// by identity.
pub fn sanitize(value: &Value, policy: &SanitizationPolicy) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(s, policy)),
        Value::Array(items) => Value::Array(items.iter().map(|v| sanitize(v, policy)).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if policy.skip_fields.contains(key.as_str()) {
                    out.insert(key.clone(), val.clone());
                } else {
                    out.insert(key.clone(), sanitize(val, policy));
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Run the full scrubbing pipeline over one string.
pub fn sanitize_string(input: &str, policy: &SanitizationPolicy) -> String {
    let mut value = decode_entities(input);

    if let Some(max) = policy.max_length {
        if value.chars().count() > max {
            value = value.chars().take(max).collect();
        }
    }

    if policy.xss {
        value = strip_xss(&value, policy);
    }
    if policy.sql {
        value = strip_sql(&value);
    }
    if policy.path_traversal {
        value = strip_traversal(&value);
        value = defuse_extension(&value);
    }

    for custom in &policy.custom_sanitizers {
        value = custom(value);
    }

    // Quote escaping and custom sanitizers can regrow the string; clamp
    // again so the limit holds. The collapse-then-double escape makes the
    // re-truncated form stable under a second pass.
    if let Some(max) = policy.max_length {
        if value.chars().count() > max {
            value = value.chars().take(max).collect();
        }
    }

    value
}

/// Decode the fixed entity set until no entity remains, so double-encoded
/// payloads ("&amp;lt;script&amp;gt;") normalize fully before matching.
/// Terminates: every pass strictly shortens the string.
fn decode_entities(input: &str) -> String {
    let mut value = input.to_string();
    loop {
        let mut next = value.clone();
        for (entity, replacement) in HTML_ENTITIES {
            next = next.replace(entity, replacement);
        }
        if next == value {
            return value;
        }
        value = next;
    }
}

fn strip_xss(input: &str, policy: &SanitizationPolicy) -> String {
    let mut value = input.to_string();
    loop {
        let mut next = value.clone();
        for re in XSS_PATTERNS.iter() {
            next = re.replace_all(&next, "").into_owned();
        }
        if policy.allowed_tags.is_empty() {
            next = HTML_TAG.replace_all(&next, "").into_owned();
        } else {
            next = filter_tags(&next, policy);
        }
        if next == value {
            return value;
        }
        value = next;
    }
}

/// Allow-list filtering: drop tags not in `allowed_tags`, and for kept tags
/// drop every attribute not in `allowed_attributes`.
fn filter_tags(input: &str, policy: &SanitizationPolicy) -> String {
    HTML_TAG
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = caps[1].to_lowercase();
            if !policy.allowed_tags.contains(&name) {
                return String::new();
            }
            let closing = caps[0].starts_with("</");
            if closing {
                return format!("</{name}>");
            }
            let mut kept = String::new();
            for attr in TAG_ATTRIBUTE.captures_iter(&caps[2]) {
                let attr_name = attr[1].to_lowercase();
                if policy.allowed_attributes.contains(&attr_name) {
                    kept.push(' ');
                    kept.push_str(&attr_name);
                    kept.push('=');
                    kept.push_str(&attr[2]);
                }
            }
            format!("<{name}{kept}>")
        })
        .into_owned()
}

fn strip_sql(input: &str) -> String {
    let mut value = input.to_string();
    loop {
        let mut next = value.clone();
        for re in SQL_PATTERNS.iter() {
            next = re.replace_all(&next, "").into_owned();
        }
        if next == value {
            break;
        }
        value = next;
    }
    // Escape quotes by doubling. Collapsing existing pairs first keeps the
    // transform idempotent: '' and ' both end up as ''.
    value.replace("''", "'").replace('\'', "''")
}

fn strip_traversal(input: &str) -> String {
    let mut value = input.to_string();
    loop {
        let mut next = value.clone();
        for re in TRAVERSAL_PATTERNS.iter() {
            next = re.replace_all(&next, "").into_owned();
        }
        if next == value {
            return value;
        }
        value = next;
    }
}

/// Replace a denylisted executable extension with `.txt`.
fn defuse_extension(input: &str) -> String {
    let lower = input.to_lowercase();
    for ext in DANGEROUS_EXTENSIONS {
        if lower.ends_with(ext) {
            let stem_len = input.len() - ext.len();
            return format!("{}.txt", &input[..stem_len]);
        }
    }
    input.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn strict() -> SanitizationPolicy {
        SanitizationPolicy::strict()
    }

    #[test]
    fn test_script_tag_stripped_exactly() {
        let out = sanitize_string("<script>alert(1)</script>hello", &strict());
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_entity_encoded_script_stripped() {
        let out = sanitize_string("&lt;script&gt;x&lt;/script&gt;ok", &strict());
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_double_encoded_script_stripped() {
        let out = sanitize_string("&amp;lt;script&amp;gt;x&amp;lt;/script&amp;gt;ok", &strict());
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_nested_tag_reassembly_does_not_survive() {
        let out = sanitize_string("<scr<script>alert(1)</script>ipt>x</script>", &strict());
        assert!(!out.to_lowercase().contains("<script"));
    }

    #[test]
    fn test_event_handlers_and_uri_schemes_stripped() {
        let out = sanitize_string("<img src=x onerror=alert(1)>", &strict());
        assert!(!out.contains("onerror"));
        let out = sanitize_string("javascript:alert(1)", &strict());
        assert!(!out.to_lowercase().contains("javascript:"));
    }

    #[test]
    fn test_sqli_tautology_neutralized() {
        let out = sanitize_string("1' OR '1'='1", &strict());
        assert!(
            !out.split_whitespace().any(|w| w.eq_ignore_ascii_case("or")),
            "bare OR survived: {out:?}"
        );
        // Every quote doubled.
        assert_eq!(out.matches('\'').count() % 2, 0);
    }

    #[test]
    fn test_sql_comments_stripped() {
        let out = sanitize_string("x -- drop everything", &strict());
        assert!(!out.contains("--"));
        let out = sanitize_string("x /* hidden */ y", &strict());
        assert!(!out.contains("/*"));
    }

    #[test]
    fn test_path_traversal_stripped() {
        let out = sanitize_string("../../etc/passwd", &strict());
        assert!(!out.contains("../"));
        let out = sanitize_string("..%2F..%2Fsecret", &strict());
        assert!(!out.to_lowercase().contains("..%2f"));
    }

    #[test]
    fn test_dangerous_extension_rewritten() {
        let out = sanitize_string("upload.php", &strict());
        assert_eq!(out, "upload.txt");
        // Idempotent: .txt is not on the denylist.
        assert_eq!(sanitize_string(&out, &strict()), "upload.txt");
    }

    #[test]
    fn test_max_length_truncates_after_decode() {
        let mut policy = strict();
        policy.max_length = Some(4);
        assert_eq!(sanitize_string("&amp;abcdef", &policy), "&abc");
    }

    #[test]
    fn test_quote_doubling_respects_max_length() {
        let mut policy = strict();
        policy.max_length = Some(4);
        let once = sanitize_string("a'b'c", &policy);
        assert!(once.chars().count() <= 4, "over limit: {once:?}");
        assert_eq!(sanitize_string(&once, &policy), once);
    }

    #[test]
    fn test_allowed_tags_kept_with_filtered_attributes() {
        let policy = SanitizationPolicy::lenient();
        let out = sanitize_string(
            r#"<a href="https://example.com" onclick="evil()">link</a><script>x</script>"#,
            &policy,
        );
        assert!(out.contains("<a href=\"https://example.com\">"), "{out:?}");
        assert!(out.contains("</a>"));
        assert!(!out.contains("onclick"));
        assert!(!out.to_lowercase().contains("<script"));
    }

    #[test]
    fn test_disallowed_tag_dropped_under_allow_list() {
        let policy = SanitizationPolicy::moderate();
        let out = sanitize_string("<b>bold</b><video src=x>clip</video>", &policy);
        assert!(out.contains("<b>bold</b>"));
        assert!(!out.contains("<video"));
    }

    #[test]
    fn test_custom_sanitizers_run_in_order() {
        let mut policy = strict();
        policy.custom_sanitizers = vec![
            Arc::new(|s: String| s.replace('a', "b")),
            Arc::new(|s: String| s.replace('b', "c")),
        ];
        assert_eq!(sanitize_string("aaa", &policy), "ccc");
    }

    #[test]
    fn test_non_string_scalars_pass_through() {
        let policy = strict();
        assert_eq!(sanitize(&json!(42), &policy), json!(42));
        assert_eq!(sanitize(&json!(true), &policy), json!(true));
        assert_eq!(sanitize(&json!(null), &policy), json!(null));
    }

    #[test]
    fn test_recursion_through_maps_and_sequences() {
        let policy = strict();
        let input = json!({
            "name": "<script>x</script>bob",
            "tags": ["<b>one</b>", "two"],
            "nested": { "bio": "javascript:void(0)" }
        });
        let out = sanitize(&input, &policy);
        assert_eq!(out["name"], "bob");
        assert_eq!(out["tags"][0], "one");
        assert_eq!(out["tags"][1], "two");
        assert!(!out["nested"]["bio"].as_str().unwrap().contains("javascript:"));
    }

    #[test]
    fn test_skip_fields_bypass_subtree() {
        let policy = SanitizationPolicy::file_upload();
        let input = json!({
            "filename": "../shell.php",
            "content": "<script>raw bytes stay</script>"
        });
        let out = sanitize(&input, &policy);
        assert_eq!(out["filename"], "shell.txt");
        assert_eq!(out["content"], "<script>raw bytes stay</script>");
    }

    #[test]
    fn test_idempotence_over_sample_corpus() {
        let near_limit = {
            let mut p = SanitizationPolicy::strict();
            p.max_length = Some(8);
            p
        };
        let policies = [
            SanitizationPolicy::strict(),
            SanitizationPolicy::moderate(),
            SanitizationPolicy::lenient(),
            SanitizationPolicy::api(),
            SanitizationPolicy::search(),
            near_limit,
        ];
        let samples = [
            json!("plain text with it's apostrophe"),
            json!("<script>alert(1)</script>hello"),
            json!("&amp;lt;script&amp;gt;x"),
            json!("1' OR '1'='1"),
            json!("a'b'c'd'e'f"),
            json!("../../etc/passwd"),
            json!({"a": ["<b onclick=x>y</b>", {"b": "SELECT * FROM users --"}]}),
        ];
        for policy in &policies {
            for sample in &samples {
                let once = sanitize(sample, policy);
                let twice = sanitize(&once, policy);
                assert_eq!(once, twice, "not idempotent for {sample} under {policy:?}");
            }
        }
    }
}
