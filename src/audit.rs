//! Audit logging.
//!
//! # Responsibilities
//! - Record one structured event per request: entry metadata at ingress,
//!   status/duration/size at exit
//! - Fire the exit record on the success path, every rejection path, and
//!   request abort, via a Drop-based scope guard rather than an ad hoc
//!   callback
//! - Keep a capped ring of recent events and emit each completed event to
//!   the `audit` tracing target

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::now_ms;

/// Header names copied into the audit record. Values are truncated.
const RECORDED_HEADERS: &[&str] = &["content-type", "content-length", "origin", "referer"];
const MAX_HEADER_VALUE_LEN: usize = 128;

/// Terminal state of an audited request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Downstream chain completed with this HTTP status.
    Completed(u16),
    /// A pipeline stage rejected with this HTTP status.
    Rejected(u16),
    /// The enclosing request was dropped mid-chain.
    Aborted,
}

/// One structured event per request, written exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub request_id: Uuid,
    pub timestamp_ms: u64,
    pub method: String,
    pub path: String,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub headers: Vec<(String, String)>,
    pub duration_ms: u64,
    pub status: AuditStatus,
    pub response_size: Option<u64>,
}

/// Capped event sink shared across requests.
#[derive(Debug)]
pub struct AuditLogger {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl AuditLogger {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Open an audit scope for one request. The entry record is logged
    /// immediately; the completed event is written when the scope is
    /// completed or dropped.
    pub fn begin(
        self: &Arc<Self>,
        request_id: Uuid,
        method: &str,
        path: &str,
        client_ip: &str,
        user_agent: Option<&str>,
        headers: &axum::http::HeaderMap,
    ) -> AuditScope {
        let recorded = RECORDED_HEADERS
            .iter()
            .filter_map(|name| {
                headers.get(*name).and_then(|v| v.to_str().ok()).map(|v| {
                    let mut value = v.to_string();
                    value.truncate(MAX_HEADER_VALUE_LEN);
                    (name.to_string(), value)
                })
            })
            .collect();

        tracing::debug!(
            target: "audit",
            request_id = %request_id,
            method,
            path,
            client = client_ip,
            "Request entered pipeline"
        );

        AuditScope {
            logger: Arc::clone(self),
            started: Instant::now(),
            event: Some(AuditEvent {
                request_id,
                timestamp_ms: now_ms(),
                method: method.to_string(),
                path: path.to_string(),
                client_ip: client_ip.to_string(),
                user_agent: user_agent.map(|s| s.to_string()),
                headers: recorded,
                duration_ms: 0,
                status: AuditStatus::Aborted,
                response_size: None,
            }),
        }
    }

    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            request_id = %event.request_id,
            method = %event.method,
            path = %event.path,
            client = %event.client_ip,
            status = ?event.status,
            duration_ms = event.duration_ms,
            "Request audited"
        );
        let mut events = self.events.lock().expect("audit ring poisoned");
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Snapshot of recent events, oldest first.
    pub fn recent(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .expect("audit ring poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("audit ring poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guard tying the exit record to scope lifetime. Dropping it without
/// calling [`AuditScope::complete`] records the request as aborted.
pub struct AuditScope {
    logger: Arc<AuditLogger>,
    started: Instant,
    event: Option<AuditEvent>,
}

impl AuditScope {
    /// Write the completed event.
    pub fn complete(mut self, status: AuditStatus, response_size: Option<u64>) {
        if let Some(mut event) = self.event.take() {
            event.duration_ms = self.started.elapsed().as_millis() as u64;
            event.status = status;
            event.response_size = response_size;
            self.logger.record(event);
        }
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if let Some(mut event) = self.event.take() {
            event.duration_ms = self.started.elapsed().as_millis() as u64;
            event.status = AuditStatus::Aborted;
            self.logger.record(event);
        }
    }
}
