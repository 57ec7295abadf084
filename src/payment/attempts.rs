//! Per-key attempt bookkeeping.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptError {
    /// Error message.
    pub message: String,
    /// Stable error code.
    pub code: String,
    /// Failure time.
    pub time: DateTime<Utc>,
}

/// Attempts made for one idempotency key that has not yet succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// Attempts started.
    pub count: u32,
    /// Failures, oldest first.
    pub errors: Vec<AttemptError>,
}

impl AttemptRecord {
    /// Returns `true` once `1 + max_retries` attempts have been made.
    #[must_use]
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.count > max_retries
    }

    /// Appends a failure.
    pub fn push_error(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.errors.push(AttemptError {
            message: message.into(),
            code: code.into(),
            time: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_after_initial_attempt_plus_retries() {
        let mut record = AttemptRecord::default();
        for _ in 0..3 {
            assert!(!record.is_exhausted(2));
            record.count += 1;
        }
        assert!(record.is_exhausted(2));
    }
}
