//! Request, session, and operation performance counters.
//!
//! Scalar totals are atomics; the per-session and per-operation maps sit
//! behind a mutex. Snapshot accessors return copies so readers never hold a
//! lock while serializing.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub request_count: u64,
    pub average_latency_ms: f64,
    pub last_activity: Option<String>,
    pub embedding_time_ms: u64,
    pub storage_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationMetrics {
    pub operation: String,
    pub total_requests: u64,
    pub total_errors: u64,
    pub average_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub last_request: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate_percent: f64,
    pub average_latency_ms: f64,
    pub requests_per_second: f64,
    pub active_sessions: usize,
}

#[derive(Default)]
struct SessionEntry {
    request_count: u64,
    total_latency: Duration,
    last_activity: Option<String>,
    embedding_time: Duration,
    storage_time: Duration,
}

struct OperationEntry {
    total_requests: u64,
    total_errors: u64,
    total_latency: Duration,
    min_latency: Duration,
    max_latency: Duration,
    last_request: Option<String>,
}

/// Tracks an in-flight request; finish with [`PerformanceMonitor::end_request`].
pub struct RequestTimer {
    session_id: String,
    operation: &'static str,
    started: Instant,
}

pub struct PerformanceMonitor {
    started: Instant,
    request_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_us: AtomicU64,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    operations: Mutex<HashMap<&'static str, OperationEntry>>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            sessions: Mutex::new(HashMap::new()),
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Begin tracking a request.
    pub fn start_request(&self, session_id: &str, operation: &'static str) -> RequestTimer {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        RequestTimer {
            session_id: session_id.to_string(),
            operation,
            started: Instant::now(),
        }
    }

    /// Finish tracking a request, folding latency into the aggregates.
    pub fn end_request(&self, timer: RequestTimer, is_error: bool) {
        let latency = timer.started.elapsed();
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        let now = crate::memory::store::now_rfc3339();

        {
            let mut sessions = self.sessions.lock().expect("session metrics lock poisoned");
            let entry = sessions.entry(timer.session_id.clone()).or_default();
            entry.request_count += 1;
            entry.total_latency += latency;
            entry.last_activity = Some(now.clone());
        }

        {
            let mut operations = self
                .operations
                .lock()
                .expect("operation metrics lock poisoned");
            let entry = operations
                .entry(timer.operation)
                .or_insert_with(|| OperationEntry {
                    total_requests: 0,
                    total_errors: 0,
                    total_latency: Duration::ZERO,
                    min_latency: latency,
                    max_latency: latency,
                    last_request: None,
                });
            entry.total_requests += 1;
            entry.total_latency += latency;
            entry.last_request = Some(now);
            if is_error {
                entry.total_errors += 1;
            }
            if latency < entry.min_latency {
                entry.min_latency = latency;
            }
            if latency > entry.max_latency {
                entry.max_latency = latency;
            }
        }

        tracing::debug!(
            session_id = %timer.session_id,
            operation = timer.operation,
            latency_ms = latency.as_millis() as u64,
            is_error,
            "request completed"
        );
    }

    /// Attribute embedding time to a session.
    pub fn record_embedding_time(&self, session_id: &str, duration: Duration) {
        let mut sessions = self.sessions.lock().expect("session metrics lock poisoned");
        sessions
            .entry(session_id.to_string())
            .or_default()
            .embedding_time += duration;
    }

    /// Attribute storage time to a session.
    pub fn record_storage_time(&self, session_id: &str, duration: Duration) {
        let mut sessions = self.sessions.lock().expect("session metrics lock poisoned");
        sessions
            .entry(session_id.to_string())
            .or_default()
            .storage_time += duration;
    }

    /// Process-wide totals.
    pub fn system_metrics(&self) -> SystemMetrics {
        let uptime = self.started.elapsed().as_secs_f64();
        let requests = self.request_count.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        let total_latency_us = self.total_latency_us.load(Ordering::Relaxed);

        SystemMetrics {
            uptime_seconds: uptime,
            total_requests: requests,
            total_errors: errors,
            error_rate_percent: if requests > 0 {
                errors as f64 / requests as f64 * 100.0
            } else {
                0.0
            },
            average_latency_ms: if requests > 0 {
                total_latency_us as f64 / requests as f64 / 1000.0
            } else {
                0.0
            },
            requests_per_second: if uptime > 0.0 {
                requests as f64 / uptime
            } else {
                0.0
            },
            active_sessions: self
                .sessions
                .lock()
                .expect("session metrics lock poisoned")
                .len(),
        }
    }

    /// Snapshot for a single session, if tracked.
    pub fn session_metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        let sessions = self.sessions.lock().expect("session metrics lock poisoned");
        sessions.get(session_id).map(|entry| SessionMetrics {
            session_id: session_id.to_string(),
            request_count: entry.request_count,
            average_latency_ms: if entry.request_count > 0 {
                entry.total_latency.as_secs_f64() * 1000.0 / entry.request_count as f64
            } else {
                0.0
            },
            last_activity: entry.last_activity.clone(),
            embedding_time_ms: entry.embedding_time.as_millis() as u64,
            storage_time_ms: entry.storage_time.as_millis() as u64,
        })
    }

    /// Snapshot of every tracked operation.
    pub fn operation_metrics(&self) -> Vec<OperationMetrics> {
        let operations = self
            .operations
            .lock()
            .expect("operation metrics lock poisoned");
        let mut result: Vec<OperationMetrics> = operations
            .iter()
            .map(|(name, entry)| OperationMetrics {
                operation: name.to_string(),
                total_requests: entry.total_requests,
                total_errors: entry.total_errors,
                average_latency_ms: if entry.total_requests > 0 {
                    entry.total_latency.as_secs_f64() * 1000.0 / entry.total_requests as f64
                } else {
                    0.0
                },
                min_latency_ms: entry.min_latency.as_millis() as u64,
                max_latency_ms: entry.max_latency.as_millis() as u64,
                last_request: entry.last_request.clone(),
            })
            .collect();
        result.sort_by(|a, b| a.operation.cmp(&b.operation));
        result
    }

    /// Drop session entries idle longer than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero()))
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);

        let mut sessions = self.sessions.lock().expect("session metrics lock poisoned");
        sessions.retain(|_, entry| {
            entry
                .last_activity
                .as_ref()
                .is_some_and(|last| *last >= cutoff)
        });

        tracing::debug!(active_sessions = sessions.len(), "metrics cleanup completed");
    }
}
