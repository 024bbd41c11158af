//! Bug lifecycle phases and the immutable per-bug record.
//!
//! ```text
//! Wait → Reproduce → Patch → Verify → Done
//!                      ↑        │
//!                      └─ fail ─┘ → Escalate (retry budget spent)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on a phase timer.
pub const MAX_PHASE_TIMER: u8 = 4;

/// Upper bound on recorded verification retries.
pub const MAX_ATTEMPTS: u8 = 1;

/// Position of a bug in its fixed lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Queued, waiting for enough free workers.
    Wait,
    /// Workers acquired; reproducing the failure.
    Reproduce,
    /// Producing and applying a candidate patch.
    Patch,
    /// Running verification against the applied patch.
    Verify,
    /// Verified and finished; workers returned.
    Done,
    /// Abandoned after an invariant violation or an exhausted budget.
    Escalate,
}

impl Phase {
    /// Phases that hold workers and count down a timer.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Reproduce | Self::Patch | Self::Verify)
    }

    /// Whether no further transition can leave this phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Escalate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Reproduce => "reproduce",
            Self::Patch => "patch",
            Self::Verify => "verify",
            Self::Done => "done",
            Self::Escalate => "escalate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by the verifier for one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Immutable snapshot of one bug's progress.
///
/// Transitions always build a new value; nothing mutates a `BugState` in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BugState {
    pub phase: Phase,
    /// Ticks remaining in the current active phase, in `[0, 4]`.
    pub timer: u8,
    /// Failed verifications recorded so far, in `[0, 1]`.
    pub attempts: u8,
}

impl BugState {
    /// A freshly queued bug.
    pub const fn waiting() -> Self {
        Self {
            phase: Phase::Wait,
            timer: 0,
            attempts: 0,
        }
    }

    pub const fn new(phase: Phase, timer: u8, attempts: u8) -> Self {
        Self {
            phase,
            timer,
            attempts,
        }
    }

    /// Same bug with a different phase and timer.
    pub const fn enter(self, phase: Phase, timer: u8) -> Self {
        Self {
            phase,
            timer,
            attempts: self.attempts,
        }
    }

    /// Whether this bug currently holds workers.
    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Timer is zero outside active phases and within range inside them.
    pub fn is_well_formed(&self) -> bool {
        let timer_ok = if self.phase.is_active() {
            self.timer <= MAX_PHASE_TIMER
        } else {
            self.timer == 0
        };
        timer_ok && self.attempts <= MAX_ATTEMPTS
    }
}

impl Default for BugState {
    fn default() -> Self {
        Self::waiting()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_terminal_phases_are_disjoint() {
        let all = [
            Phase::Wait,
            Phase::Reproduce,
            Phase::Patch,
            Phase::Verify,
            Phase::Done,
            Phase::Escalate,
        ];
        for phase in all {
            assert!(!(phase.is_active() && phase.is_terminal()), "{phase}");
        }
        assert!(!Phase::Wait.is_active());
        assert!(!Phase::Wait.is_terminal());
    }

    #[test]
    fn test_phase_serde_snake_case() {
        let json = serde_json::to_string(&Phase::Escalate).unwrap();
        assert_eq!(json, "\"escalate\"");
        let back: Phase = serde_json::from_str("\"reproduce\"").unwrap();
        assert_eq!(back, Phase::Reproduce);
    }

    #[test]
    fn test_well_formed_requires_zero_timer_when_idle() {
        assert!(BugState::waiting().is_well_formed());
        assert!(!BugState::new(Phase::Done, 1, 0).is_well_formed());
        assert!(!BugState::new(Phase::Escalate, 2, 1).is_well_formed());
        assert!(BugState::new(Phase::Verify, 4, 1).is_well_formed());
        assert!(!BugState::new(Phase::Verify, 5, 0).is_well_formed());
        assert!(!BugState::new(Phase::Patch, 1, 2).is_well_formed());
    }

    #[test]
    fn test_enter_keeps_attempts() {
        let bug = BugState::new(Phase::Verify, 0, 1);
        let next = bug.enter(Phase::Patch, 3);
        assert_eq!(next, BugState::new(Phase::Patch, 3, 1));
        assert_eq!(bug.phase, Phase::Verify);
    }
}
