//! Sanitization policies.
//!
//! A policy is immutable once constructed. The named policies below are
//! built once and shared; composing a preset never mutates a shared default.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A custom scrubbing step applied after the built-in stages, in declared order.
pub type CustomSanitizer = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Controls which scrubbing stages run and how strings are shaped.
#[derive(Clone, Default)]
pub struct SanitizationPolicy {
    pub xss: bool,
    pub sql: bool,
    pub path_traversal: bool,
    /// Maximum string length in characters, counted after entity decoding.
    pub max_length: Option<usize>,
    /// Empty set means all markup is stripped, never partially rendered.
    pub allowed_tags: HashSet<String>,
    pub allowed_attributes: HashSet<String>,
    /// Map keys whose whole subtree bypasses the pipeline (raw buffers etc).
    pub skip_fields: HashSet<String>,
    pub custom_sanitizers: Vec<CustomSanitizer>,
}

impl fmt::Debug for SanitizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SanitizationPolicy")
            .field("xss", &self.xss)
            .field("sql", &self.sql)
            .field("path_traversal", &self.path_traversal)
            .field("max_length", &self.max_length)
            .field("allowed_tags", &self.allowed_tags)
            .field("allowed_attributes", &self.allowed_attributes)
            .field("skip_fields", &self.skip_fields)
            .field("custom_sanitizers", &self.custom_sanitizers.len())
            .finish()
    }
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SanitizationPolicy {
    /// All stages on, no markup survives.
    pub fn strict() -> Self {
        Self {
            xss: true,
            sql: true,
            path_traversal: true,
            max_length: Some(10_000),
            ..Default::default()
        }
    }

    /// Basic formatting tags survive; attributes are dropped.
    pub fn moderate() -> Self {
        Self {
            xss: true,
            sql: true,
            path_traversal: true,
            max_length: Some(50_000),
            allowed_tags: set(&["b", "i", "em", "strong", "p", "br", "ul", "ol", "li"]),
            ..Default::default()
        }
    }

    /// Richer markup for trusted editors; links keep href/title.
    pub fn lenient() -> Self {
        Self {
            xss: true,
            sql: false,
            path_traversal: true,
            max_length: Some(200_000),
            allowed_tags: set(&[
                "a", "b", "i", "em", "strong", "p", "br", "ul", "ol", "li", "blockquote", "code",
                "pre", "h1", "h2", "h3",
            ]),
            allowed_attributes: set(&["href", "title", "alt"]),
            ..Default::default()
        }
    }

    /// Machine-to-machine payloads: no markup, shorter fields.
    pub fn api() -> Self {
        Self {
            xss: true,
            sql: true,
            path_traversal: true,
            max_length: Some(5_000),
            ..Default::default()
        }
    }

    /// Upload metadata: filenames get the full traversal treatment, raw
    /// content fields are skipped wholesale.
    pub fn file_upload() -> Self {
        Self {
            xss: true,
            sql: false,
            path_traversal: true,
            max_length: Some(1_000),
            skip_fields: set(&["content", "data", "buffer"]),
            ..Default::default()
        }
    }

    /// Search queries: keep punctuation users type, still no markup.
    pub fn search() -> Self {
        Self {
            xss: true,
            sql: true,
            path_traversal: false,
            max_length: Some(500),
            ..Default::default()
        }
    }

    /// Admin console input: strict plus tighter length.
    pub fn admin() -> Self {
        Self {
            xss: true,
            sql: true,
            path_traversal: true,
            max_length: Some(2_000),
            ..Default::default()
        }
    }
}
