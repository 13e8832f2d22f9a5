//! Error kinds, retry, and circuit breaking.
//!
//! Every failure in the engine maps to exactly one [`AimemError`] variant.
//! Validation and not-found errors are terminal; storage and capacity errors
//! are retryable through [`retry`], and dependencies that fail repeatedly can
//! be fenced off with a [`CircuitBreaker`].

use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AimemError {
    /// Bad argument: wrong type, out of range, unknown enum value.
    #[error("validation error: {0}")]
    Validation(String),

    /// Session, project, or chunk missing.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Persistence-layer failure; usually transient.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedder rejected input or failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Per-chunk chunking failure.
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Per-chunk summarization failure.
    #[error("summarization error: {0}")]
    Summarization(String),

    /// Pool exhausted or circuit breaker open.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// Request context was cancelled mid-flight.
    #[error("operation cancelled")]
    Cancelled,

    /// Invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AimemError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Whether a retry of the failed operation could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Capacity(_) | Self::Embedding(_)
        )
    }

    /// JSON-RPC error code for the error envelope.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Self::Validation(_) => -32602,
            Self::NotFound { .. } => -32001,
            Self::Storage(_) | Self::Capacity(_) => -32002,
            Self::Cancelled => -32800,
            _ => -32603,
        }
    }
}

impl From<rusqlite::Error> for AimemError {
    fn from(err: rusqlite::Error) -> Self {
        AimemError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AimemError {
    fn from(err: serde_json::Error) -> Self {
        AimemError::Internal(format!("serialization: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, AimemError>;

// ── Retry ────────────────────────────────────────────────────────────────────

/// Maximum delay between retry attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Run `op` up to `max_attempts` times with exponential backoff and jitter.
///
/// Non-retryable errors abort immediately. The delay for attempt `n` is
/// `base_delay * 2^(n-1)` plus sub-millisecond jitter, capped at 30s.
pub async fn retry<T, F, Fut>(max_attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "retryable operation failed");
                last_err = Some(err);
            }
        }

        if attempt < max_attempts {
            let exp = base_delay.saturating_mul(1 << (attempt - 1).min(16));
            let jitter = Duration::from_micros(u64::from(attempt) * 137 % 1000);
            tokio::time::sleep(exp.min(MAX_RETRY_DELAY) + jitter).await;
        }
    }

    Err(last_err.unwrap_or_else(|| AimemError::Internal("retry with zero attempts".into())))
}

// ── Circuit breaker ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-dependency circuit breaker.
///
/// Trips open after `max_failures` consecutive failures; after
/// `reset_timeout` one probe call runs in half-open state and decides whether
/// the circuit closes again. While open, [`CircuitBreaker::call`] returns
/// `Capacity` without invoking the operation.
pub struct CircuitBreaker {
    max_failures: u32,
    reset_timeout: Duration,
    failures: u32,
    last_failure: Option<Instant>,
    state: CircuitState,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            max_failures,
            reset_timeout,
            failures: 0,
            last_failure: None,
            state: CircuitState::Closed,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn call<T>(&mut self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.state == CircuitState::Open {
            let elapsed = self
                .last_failure
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed > self.reset_timeout {
                self.state = CircuitState::HalfOpen;
            } else {
                return Err(AimemError::Capacity("circuit breaker is open".into()));
            }
        }

        match op() {
            Ok(value) => {
                self.failures = 0;
                self.state = CircuitState::Closed;
                Ok(value)
            }
            Err(err) => {
                self.failures += 1;
                self.last_failure = Some(Instant::now());
                if self.failures >= self.max_failures {
                    self.state = CircuitState::Open;
                }
                Err(err)
            }
        }
    }
}
