use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Whether a timeout consumed the caller's whole budget or only one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// The overall [`Deadline`] expired. Usually fatal for the caller.
    Budget,
    /// A single attempt exceeded its own timeout. Usually retryable.
    Attempt,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Budget => write!(f, "deadline"),
            TimeoutKind::Attempt => write!(f, "attempt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} timeout after {elapsed_ms}ms (limit {limit_ms}ms): {cause}")]
pub struct TimeoutError {
    pub kind: TimeoutKind,
    pub elapsed_ms: u64,
    pub limit_ms: u64,
    pub cause: String,
}

impl TimeoutError {
    /// Timeout of a single attempt, not tied to any caller deadline.
    pub fn attempt(limit: Duration, elapsed: Duration, cause: impl Into<String>) -> Self {
        Self {
            kind: TimeoutKind::Attempt,
            elapsed_ms: elapsed.as_millis() as u64,
            limit_ms: limit.as_millis() as u64,
            cause: cause.into(),
        }
    }

    pub fn is_budget(&self) -> bool {
        self.kind == TimeoutKind::Budget
    }
}

/// An absolute point in time past which an operation counts as timed out.
///
/// Created once by the outermost caller and handed down to nested calls, so a
/// chain of requests shares one budget instead of resetting the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    expires: Instant,
}

impl Deadline {
    pub fn for_duration(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            expires: started + budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.expires - self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }

    pub fn remaining_millis(&self) -> u64 {
        self.remaining().as_millis() as u64
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Wrap `cause` into a budget-level timeout reporting the elapsed time.
    pub fn force_timeout_and_create_error(&self, cause: impl Into<String>) -> TimeoutError {
        TimeoutError {
            kind: TimeoutKind::Budget,
            elapsed_ms: self.elapsed().as_millis() as u64,
            limit_ms: self.budget().as_millis() as u64,
            cause: cause.into(),
        }
    }
}
