//! Error taxonomy for the scheduler, the patch subsystem and collaborators.
//!
//! Expected outcomes (admission backpressure, a failed verification) are
//! state transitions, not errors. Everything here is surfaced to the caller.

use thiserror::Error;

use super::models::{BugId, Phase};

fn format_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A safety property that failed its post-tick check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error(
        "capacity invariant broken at tick {tick_no}: free {free_workers} + {workers_per_bug} x {active} active = {computed}, expected {expected}"
    )]
    Capacity {
        tick_no: u32,
        free_workers: u32,
        workers_per_bug: u32,
        active: usize,
        computed: i64,
        expected: i64,
    },

    #[error(
        "timer invariant broken at tick {tick_no} for bug #{bug_index}: phase {phase} with timer {timer}, attempts {attempts}"
    )]
    Timer {
        tick_no: u32,
        bug_index: usize,
        phase: Phase,
        timer: u8,
        attempts: u8,
    },
}

/// Failures of the tick engine and its monitor. All of them end the context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    #[error(
        "tick budget exhausted at tick {tick_no} of {max_ticks}; unfinished bugs: [{}]",
        format_indices(.unfinished)
    )]
    TickBudgetExceeded {
        tick_no: u32,
        max_ticks: u32,
        unfinished: Vec<usize>,
    },

    #[error("no verification verdict supplied for bug #{bug_index} at tick {tick_no}")]
    MissingVerdict { bug_index: usize, tick_no: u32 },

    #[error("all bugs settled at tick {tick_no} without resolution: {reason}")]
    Unresolved { tick_no: u32, reason: String },
}

impl SchedulerError {
    /// Tick number the failure was detected at.
    pub fn tick_no(&self) -> u32 {
        match self {
            Self::InvariantViolation(
                InvariantViolation::Capacity { tick_no, .. }
                | InvariantViolation::Timer { tick_no, .. },
            )
            | Self::TickBudgetExceeded { tick_no, .. }
            | Self::MissingVerdict { tick_no, .. }
            | Self::Unresolved { tick_no, .. } => *tick_no,
        }
    }
}

/// Patch bundle storage and application errors.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error(
        "integrity violation for bug {bug_id}: expected sha256 {expected}, computed {actual}"
    )]
    IntegrityViolation {
        bug_id: BugId,
        expected: String,
        actual: String,
    },

    #[error("patch for bug {bug_id} could not be applied: {reason}")]
    ApplyRejected { bug_id: BugId, reason: String },

    #[error("bundle storage error: {0}")]
    Store(String),

    #[error("ledger error: {0}")]
    Ledger(String),
}

impl PatchError {
    /// Whether regenerating the patch could help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ApplyRejected { .. })
    }
}

impl From<std::io::Error> for PatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for PatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<sqlx::Error> for PatchError {
    fn from(err: sqlx::Error) -> Self {
        Self::Ledger(err.to_string())
    }
}

/// A collaborator (verifier, patch generator) failed to produce an answer.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("verifier failed for bug {bug_id}: {reason}")]
    Verifier { bug_id: BugId, reason: String },

    #[error("patch generation failed for bug {bug_id}: {reason}")]
    PatchGeneration { bug_id: BugId, reason: String },
}

/// Why a bug context was abandoned by the executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl ExecutorError {
    /// Whether asking the generator for a fresh patch could help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Patch(err) => err.is_retryable(),
            Self::Collaborator(CollaboratorError::PatchGeneration { .. }) => true,
            Self::Collaborator(CollaboratorError::Verifier { .. }) | Self::Scheduler(_) => false,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
pub type PatchResult<T> = Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_carries_values() {
        let err = SchedulerError::from(InvariantViolation::Capacity {
            tick_no: 7,
            free_workers: 4,
            workers_per_bug: 3,
            active: 2,
            computed: 10,
            expected: 9,
        });
        let msg = err.to_string();
        assert!(msg.contains("tick 7"));
        assert!(msg.contains("= 10, expected 9"));
        assert_eq!(err.tick_no(), 7);
    }

    #[test]
    fn test_budget_message_lists_unfinished() {
        let err = SchedulerError::TickBudgetExceeded {
            tick_no: 60,
            max_ticks: 60,
            unfinished: vec![2, 5],
        };
        assert!(err.to_string().ends_with("unfinished bugs: [2, 5]"));
    }

    #[test]
    fn test_only_rejections_are_retryable() {
        let rejected = PatchError::ApplyRejected {
            bug_id: BugId::new("B"),
            reason: "context mismatch".to_string(),
        };
        let tampered = PatchError::IntegrityViolation {
            bug_id: BugId::new("B"),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(rejected.is_retryable());
        assert!(!tampered.is_retryable());
        assert!(!PatchError::Ledger("locked".to_string()).is_retryable());
    }

    #[test]
    fn test_executor_retryability() {
        let generation = ExecutorError::from(CollaboratorError::PatchGeneration {
            bug_id: BugId::new("B"),
            reason: "timeout".to_string(),
        });
        let verifier = ExecutorError::from(CollaboratorError::Verifier {
            bug_id: BugId::new("B"),
            reason: "crashed".to_string(),
        });
        let budget = ExecutorError::from(SchedulerError::MissingVerdict {
            bug_index: 0,
            tick_no: 3,
        });
        assert!(generation.is_retryable());
        assert!(!verifier.is_retryable());
        assert!(!budget.is_retryable());
    }
}
