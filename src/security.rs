/// Rate limiting and audit logging
///
/// A single `SecurityGuard` instance is constructed per process and
/// shared by the resolver and sync engine. Rate limiting is a sliding
/// 60-second window per identifier; it mitigates abuse but is not a
/// hard security boundary (a caller able to manipulate the clock can
/// defeat it).
use crate::config::RateLimitConfig;
use crate::error::SyncResult;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Maximum retained audit entries; oldest are evicted first
const MAX_AUDIT_ENTRIES: usize = 1000;

/// Per-identifier rate limit state
#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: DateTime<Utc>,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub details: serde_json::Value,
    pub actor: Option<String>,
}

/// Best-effort external audit sink
///
/// Forward failures must never propagate to the caller; the guard logs
/// them and moves on.
pub trait AuditSink: Send + Sync {
    fn forward(&self, entry: &AuditLogEntry) -> SyncResult<()>;
}

/// Shared rate limiter and audit log
pub struct SecurityGuard {
    config: RateLimitConfig,
    limits: Mutex<HashMap<String, RateLimitEntry>>,
    audit_log: Mutex<VecDeque<AuditLogEntry>>,
    sink: Option<Box<dyn AuditSink>>,
}

impl SecurityGuard {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limits: Mutex::new(HashMap::new()),
            audit_log: Mutex::new(VecDeque::new()),
            sink: None,
        }
    }

    /// Attach an external audit sink
    pub fn with_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Check the rate limit for an identifier using the configured
    /// default threshold
    pub fn check_rate_limit(&self, identifier: &str) -> bool {
        self.check_rate_limit_with(identifier, self.config.max_operations)
    }

    /// Check the rate limit for an identifier against an explicit
    /// threshold (the resolver allows more operations than sync)
    pub fn check_rate_limit_with(&self, identifier: &str, max_operations: u32) -> bool {
        let now = Utc::now();
        let window = Duration::seconds(self.config.window as i64);

        let allowed = {
            let mut limits = self.limits.lock().expect("rate limit lock poisoned");
            let entry = limits.entry(identifier.to_string()).or_insert(RateLimitEntry {
                count: 0,
                window_reset_at: now + window,
            });

            if now > entry.window_reset_at {
                // Window lapsed; count resets to 1
                entry.count = 1;
                entry.window_reset_at = now + window;
                true
            } else if entry.count >= max_operations {
                false
            } else {
                entry.count += 1;
                true
            }
        };

        if !allowed {
            warn!(identifier, "rate limit exceeded");
            self.log_event(
                "rate_limit_exceeded",
                serde_json::json!({ "identifier": identifier, "limit": max_operations }),
            );
        }

        allowed
    }

    /// Append an audit entry, truncating to the most recent 1,000
    pub fn log_event(&self, event: &str, details: serde_json::Value) {
        self.log_event_as(None, event, details);
    }

    /// Append an audit entry attributed to an actor (usually a DID)
    pub fn log_event_as(&self, actor: Option<&str>, event: &str, details: serde_json::Value) {
        let entry = AuditLogEntry {
            timestamp: Utc::now(),
            event: event.to_string(),
            details,
            actor: actor.map(String::from),
        };

        {
            let mut log = self.audit_log.lock().expect("audit log lock poisoned");
            log.push_back(entry.clone());
            while log.len() > MAX_AUDIT_ENTRIES {
                log.pop_front();
            }
        }

        // Best-effort forward; a failing sink must never affect the caller
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.forward(&entry) {
                debug!("audit sink forward failed: {}", e);
            }
        }
    }

    /// Snapshot copy of the audit log, oldest first
    pub fn audit_log(&self) -> Vec<AuditLogEntry> {
        self.audit_log
            .lock()
            .expect("audit log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}
