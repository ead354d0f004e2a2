//! Counter store behind the rate limiter.
//!
//! The store is the only shared mutable resource in the pipeline. It is an
//! injected interface with a concrete in-memory implementation; a deployment
//! backing it with an external cache implements [`RateStore`] and must give
//! that call a bounded timeout. Store failures are surfaced as errors and
//! the orchestrator fails open for rate limiting.

use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

use crate::now_ms;

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the current window, zero when denied.
    pub remaining: u32,
    /// Unix-ms timestamp at which the window resets.
    pub reset_at_ms: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Increment-and-read for one `(client, route class)` key.
pub trait RateStore: Send + Sync {
    fn check(&self, key: &str, limit: u32, window: Duration) -> Result<RateDecision, StoreError>;

    /// Drop expired records. A no-op for stores with native expiry.
    fn sweep(&self) {}
}

/// One fixed window per key. `count` only increases inside a window;
/// crossing the boundary resets it before the increment that observed
/// the crossing.
#[derive(Debug)]
struct WindowRecord {
    count: u32,
    window_start_ms: u64,
    window_ms: u64,
}

/// In-memory store on a concurrent map. The per-entry lock makes the
/// increment-and-read atomic, so concurrent requests for one key never
/// lose updates.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, WindowRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deterministic variant used by the trait impl and by tests that need
    /// to step time across window boundaries.
    pub fn check_at(&self, key: &str, limit: u32, window: Duration, now_ms: u64) -> RateDecision {
        let window_ms = window.as_millis() as u64;
        let mut record = self.records.entry(key.to_string()).or_insert(WindowRecord {
            count: 0,
            window_start_ms: now_ms,
            window_ms,
        });

        if now_ms >= record.window_start_ms + record.window_ms {
            record.count = 0;
            record.window_start_ms = now_ms;
            record.window_ms = window_ms;
        }

        record.count += 1;
        RateDecision {
            allowed: record.count <= limit,
            limit,
            remaining: limit.saturating_sub(record.count),
            reset_at_ms: record.window_start_ms + record.window_ms,
        }
    }

    /// TTL sweep: drop records more than one full window past expiry.
    /// Keys inside or just past their window stay so the boundary
    /// semantics are unaffected.
    pub fn sweep_at(&self, now_ms: u64) {
        self.records
            .retain(|_, record| now_ms < record.window_start_ms + 2 * record.window_ms);
    }
}

impl RateStore for MemoryStore {
    fn check(&self, key: &str, limit: u32, window: Duration) -> Result<RateDecision, StoreError> {
        Ok(self.check_at(key, limit, window, now_ms()))
    }

    fn sweep(&self) {
        self.sweep_at(now_ms());
    }
}
