//! Pure circuit state machine.
//!
//! [`BreakerState::transition`] is the whole state graph. [`Circuit`] holds
//! the counters for one `(service, venue)` pair and drives that graph from
//! call outcomes and the current time, without reading a clock itself, so
//! every timing rule is testable with synthetic instants.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::BreakerConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow through.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// A bounded number of probe calls test the dependency.
    HalfOpen,
}

/// Input to the state graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEvent {
    /// Consecutive failures reached the threshold.
    FailureThresholdReached,
    /// The open period ended.
    ResetTimeoutElapsed,
    /// Enough probes succeeded to trust the dependency again.
    ProbesSucceeded,
    /// A probe failed.
    ProbeFailed,
    /// The half-open probe budget ran out.
    ProbesExhausted,
    /// Operator forced the breaker open.
    Tripped,
    /// Operator forced the breaker closed.
    Reset,
}

impl BreakerState {
    /// Returns the state reached from `self` on `event`.
    ///
    /// Events that do not apply to the current state leave it unchanged.
    #[must_use]
    pub const fn transition(self, event: BreakerEvent) -> Self {
        match (self, event) {
            (_, BreakerEvent::Tripped) => Self::Open,
            (_, BreakerEvent::Reset) => Self::Closed,
            (Self::Closed, BreakerEvent::FailureThresholdReached) => Self::Open,
            (Self::Open, BreakerEvent::ResetTimeoutElapsed) => Self::HalfOpen,
            (Self::HalfOpen, BreakerEvent::ProbesSucceeded) => Self::Closed,
            (Self::HalfOpen, BreakerEvent::ProbeFailed | BreakerEvent::ProbesExhausted) => {
                Self::Open
            }
            (state, _) => state,
        }
    }

    /// Returns the snake_case name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Why a call was refused without being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The breaker is open.
    Open {
        /// Time until a probe will be admitted.
        retry_after: Duration,
    },
    /// The half-open probe budget is spent; the breaker re-opened.
    HalfOpenAttemptsExceeded,
}

/// Result of asking the circuit to admit a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// `Some` when the call must not be invoked.
    pub rejection: Option<Rejection>,
    /// States entered while deciding, in order.
    pub transitions: Vec<BreakerState>,
}

/// Counters and state for one `(service, venue)` breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures (reset by a success in `closed`).
    pub failures: u32,
    /// Successes in the current state.
    pub successes: u32,
    /// Time of the most recent failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Time the breaker last entered `open`.
    pub opened_at: Option<DateTime<Utc>>,
    /// Probe calls admitted since the last close; survives re-opening.
    pub half_open_attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            successes: 0,
            last_failure_time: None,
            opened_at: None,
            half_open_attempts: 0,
            last_error: None,
        }
    }
}

impl Circuit {
    /// Creates a closed circuit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the lazy `open → half_open` check at `now`.
    ///
    /// Returns the new state if a transition happened.
    pub fn poll(&mut self, now: DateTime<Utc>, config: &BreakerConfig) -> Option<BreakerState> {
        if self.state == BreakerState::Open && self.retry_after(now, config).is_zero() {
            self.apply(BreakerEvent::ResetTimeoutElapsed);
            self.successes = 0;
            return Some(self.state);
        }
        None
    }

    /// Time left before an open breaker admits a probe; zero otherwise.
    #[must_use]
    pub fn retry_after(&self, now: DateTime<Utc>, config: &BreakerConfig) -> Duration {
        if self.state != BreakerState::Open {
            return Duration::ZERO;
        }
        let Some(opened_at) = self.opened_at else {
            return Duration::ZERO;
        };
        let elapsed = (now - opened_at).to_std().unwrap_or(Duration::ZERO);
        config.reset_timeout.saturating_sub(elapsed)
    }

    /// Decides whether a call may be invoked at `now`, counting it as a
    /// probe when the breaker is half-open.
    pub fn admit(&mut self, now: DateTime<Utc>, config: &BreakerConfig) -> Admission {
        let mut transitions = Vec::new();
        if let Some(state) = self.poll(now, config) {
            transitions.push(state);
        }

        let rejection = match self.state {
            BreakerState::Closed => None,
            BreakerState::Open => Some(Rejection::Open {
                retry_after: self.retry_after(now, config),
            }),
            BreakerState::HalfOpen => {
                if self.half_open_attempts >= config.max_half_open_attempts {
                    self.open(BreakerEvent::ProbesExhausted, now);
                    transitions.push(self.state);
                    Some(Rejection::HalfOpenAttemptsExceeded)
                } else {
                    self.half_open_attempts = self.half_open_attempts.saturating_add(1);
                    None
                }
            }
        };

        Admission {
            rejection,
            transitions,
        }
    }

    /// Returns a half-open slot taken by a call that never reported back.
    pub fn release_half_open_slot(&mut self) {
        if self.state == BreakerState::HalfOpen {
            self.half_open_attempts = self.half_open_attempts.saturating_sub(1);
        }
    }

    /// Records a successful call. Returns the new state on transition.
    pub fn record_success(&mut self, config: &BreakerConfig) -> Option<BreakerState> {
        self.successes = self.successes.saturating_add(1);
        match self.state {
            BreakerState::Closed => {
                self.failures = 0;
                None
            }
            BreakerState::HalfOpen if self.successes >= config.half_open_success_threshold => {
                self.close(BreakerEvent::ProbesSucceeded);
                Some(self.state)
            }
            BreakerState::HalfOpen | BreakerState::Open => None,
        }
    }

    /// Records a failed call. Returns the new state on transition.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
        config: &BreakerConfig,
    ) -> Option<BreakerState> {
        self.failures = self.failures.saturating_add(1);
        self.last_failure_time = Some(now);
        self.last_error = Some(message.into());
        match self.state {
            BreakerState::Closed if self.failures >= config.failure_threshold => {
                self.open(BreakerEvent::FailureThresholdReached, now);
                Some(self.state)
            }
            BreakerState::HalfOpen => {
                self.open(BreakerEvent::ProbeFailed, now);
                Some(self.state)
            }
            BreakerState::Closed | BreakerState::Open => None,
        }
    }

    /// Forces the breaker open. Returns `None` if it already was.
    pub fn trip(&mut self, now: DateTime<Utc>) -> Option<BreakerState> {
        if self.state == BreakerState::Open {
            return None;
        }
        self.open(BreakerEvent::Tripped, now);
        Some(self.state)
    }

    /// Forces the breaker closed and clears every counter. Returns `None`
    /// if it was already closed.
    pub fn reset(&mut self) -> Option<BreakerState> {
        let was = self.state;
        *self = Self::default();
        (was != BreakerState::Closed).then_some(self.state)
    }

    fn apply(&mut self, event: BreakerEvent) {
        self.state = self.state.transition(event);
    }

    fn open(&mut self, event: BreakerEvent, now: DateTime<Utc>) {
        self.apply(event);
        self.opened_at = Some(now);
        self.successes = 0;
    }

    fn close(&mut self, event: BreakerEvent) {
        self.apply(event);
        self.failures = 0;
        self.successes = 0;
        self.half_open_attempts = 0;
        self.opened_at = None;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, max_half_open_attempts: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold,
            reset_timeout: Duration::from_secs(10),
            half_open_success_threshold: 1,
            max_half_open_attempts,
        }
    }

    fn after(start: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        start + chrono::Duration::seconds(secs)
    }

    #[test]
    fn transition_graph() {
        use BreakerEvent::*;
        use BreakerState::*;
        assert_eq!(Closed.transition(FailureThresholdReached), Open);
        assert_eq!(Open.transition(ResetTimeoutElapsed), HalfOpen);
        assert_eq!(HalfOpen.transition(ProbesSucceeded), Closed);
        assert_eq!(HalfOpen.transition(ProbeFailed), Open);
        assert_eq!(HalfOpen.transition(ProbesExhausted), Open);
        assert_eq!(Closed.transition(Tripped), Open);
        assert_eq!(HalfOpen.transition(Reset), Closed);
    }

    #[test]
    fn released_slot_can_be_reused() {
        let cfg = config(1, 1);
        let start = Utc::now();
        let mut circuit = Circuit::new();
        circuit.record_failure("e", start, &cfg);

        assert_eq!(circuit.admit(after(start, 10), &cfg).rejection, None);
        circuit.release_half_open_slot();
        assert_eq!(circuit.half_open_attempts, 0);
        assert_eq!(circuit.admit(after(start, 11), &cfg).rejection, None);

        circuit.record_failure("e", after(start, 11), &cfg);
        circuit.release_half_open_slot();
        assert_eq!(circuit.half_open_attempts, 1);
    }

    #[test]
    fn inapplicable_events_keep_state() {
        use BreakerEvent::*;
        use BreakerState::*;
        assert_eq!(Closed.transition(ResetTimeoutElapsed), Closed);
        assert_eq!(Open.transition(ProbesSucceeded), Open);
        assert_eq!(Closed.transition(ProbeFailed), Closed);
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cfg = config(2, 3);
        let now = Utc::now();
        let mut circuit = Circuit::new();

        assert_eq!(circuit.record_failure("e1", now, &cfg), None);
        assert_eq!(circuit.state, BreakerState::Closed);
        assert_eq!(circuit.record_failure("e2", now, &cfg), Some(BreakerState::Open));
        assert_eq!(circuit.last_error.as_deref(), Some("e2"));
    }

    #[test]
    fn success_in_closed_resets_consecutive_failures() {
        let cfg = config(2, 3);
        let now = Utc::now();
        let mut circuit = Circuit::new();

        circuit.record_failure("e1", now, &cfg);
        circuit.record_success(&cfg);
        circuit.record_failure("e2", now, &cfg);
        assert_eq!(circuit.state, BreakerState::Closed);
    }

    #[test]
    fn open_rejects_until_timeout_then_half_opens_lazily() {
        let cfg = config(1, 3);
        let start = Utc::now();
        let mut circuit = Circuit::new();
        circuit.record_failure("boom", start, &cfg);

        let early = circuit.admit(after(start, 5), &cfg);
        assert!(matches!(
            early.rejection,
            Some(Rejection::Open { retry_after }) if retry_after == Duration::from_secs(5)
        ));
        assert!(early.transitions.is_empty());

        let late = circuit.admit(after(start, 10), &cfg);
        assert_eq!(late.rejection, None);
        assert_eq!(late.transitions, vec![BreakerState::HalfOpen]);
        assert_eq!(circuit.half_open_attempts, 1);
    }

    #[test]
    fn successful_probe_closes_and_clears_failures() {
        let cfg = config(2, 3);
        let start = Utc::now();
        let mut circuit = Circuit::new();
        circuit.record_failure("e1", start, &cfg);
        circuit.record_failure("e2", start, &cfg);

        let admission = circuit.admit(after(start, 11), &cfg);
        assert_eq!(admission.rejection, None);
        assert_eq!(circuit.record_success(&cfg), Some(BreakerState::Closed));
        assert_eq!(circuit.failures, 0);
        assert_eq!(circuit.half_open_attempts, 0);
    }

    #[test]
    fn failed_probe_reopens_and_keeps_probe_count() {
        let cfg = config(1, 3);
        let start = Utc::now();
        let mut circuit = Circuit::new();
        circuit.record_failure("e1", start, &cfg);

        let _ = circuit.admit(after(start, 10), &cfg);
        assert_eq!(
            circuit.record_failure("probe failed", after(start, 10), &cfg),
            Some(BreakerState::Open)
        );
        assert_eq!(circuit.half_open_attempts, 1);

        let next = circuit.admit(after(start, 20), &cfg);
        assert_eq!(next.rejection, None);
        assert_eq!(circuit.state, BreakerState::HalfOpen);
        assert_eq!(circuit.half_open_attempts, 2);
    }

    #[test]
    fn probe_budget_is_bounded_across_cycles() {
        let cfg = config(1, 2);
        let start = Utc::now();
        let mut circuit = Circuit::new();
        circuit.record_failure("e", start, &cfg);

        let mut t = 10;
        for _ in 0..2 {
            let admission = circuit.admit(after(start, t), &cfg);
            assert_eq!(admission.rejection, None);
            circuit.record_failure("probe", after(start, t), &cfg);
            t += 10;
        }

        let exhausted = circuit.admit(after(start, t), &cfg);
        assert_eq!(
            exhausted.rejection,
            Some(Rejection::HalfOpenAttemptsExceeded)
        );
        assert_eq!(
            exhausted.transitions,
            vec![BreakerState::HalfOpen, BreakerState::Open]
        );
        assert_eq!(circuit.state, BreakerState::Open);
    }

    #[test]
    fn trip_and_reset() {
        let now = Utc::now();
        let mut circuit = Circuit::new();
        assert_eq!(circuit.trip(now), Some(BreakerState::Open));
        assert_eq!(circuit.trip(now), None);
        assert_eq!(circuit.reset(), Some(BreakerState::Closed));
        assert_eq!(circuit.reset(), None);
        assert_eq!(circuit, Circuit::new());
    }
}
