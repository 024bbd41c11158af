//! Pure per-bug transition function.
//!
//! `step` computes the next [`BugState`] and the change in free workers for a
//! single bug. It never touches shared state; the engine folds the deltas into
//! its worker pool.
//!
//! Rules, first match wins:
//!
//! 1. active phase with `timer > 0`: count down
//! 2. `Wait`: admit into `Reproduce` when enough workers are free, else stay
//! 3. `Reproduce` at 0: enter `Patch`
//! 4. `Patch` at 0: enter `Verify`
//! 5. `Verify` at 0 with a failing verdict: back to `Patch`, or settle per
//!    [`RetryPolicy`] once the retry is used up
//! 6. `Verify` at 0 with a passing verdict: `Done`, workers returned
//! 7. anything else is left alone

use crate::domain::models::{
    BugState, Phase, RetryPolicy, SchedulerConfig, Verdict, MAX_ATTEMPTS,
};

/// Timer countdown branch (rule 1).
pub fn countdown(bug: BugState) -> BugState {
    if bug.is_active() && bug.timer > 0 {
        BugState::new(bug.phase, bug.timer - 1, bug.attempts)
    } else {
        bug
    }
}

/// Rules 2 through 7, evaluated on a bug whose countdown for this tick has
/// already happened.
///
/// `verdict` is only consulted for a bug in `Verify` with an expired timer.
pub fn advance(
    bug: BugState,
    free_workers: u32,
    verdict: Option<Verdict>,
    config: &SchedulerConfig,
) -> (BugState, i64) {
    let workers = i64::from(config.workers_per_bug);
    let full_timer = config.phase_timer;

    match bug.phase {
        Phase::Wait if free_workers >= config.workers_per_bug => {
            // The admission tick already counts as the first Reproduce tick.
            let admitted = BugState::new(Phase::Reproduce, full_timer.saturating_sub(1), 0);
            (admitted, -workers)
        }
        Phase::Wait => (bug, 0),
        Phase::Reproduce if bug.timer == 0 => (bug.enter(Phase::Patch, full_timer), 0),
        Phase::Patch if bug.timer == 0 => (bug.enter(Phase::Verify, full_timer), 0),
        Phase::Verify if bug.timer == 0 => match verdict {
            Some(Verdict::Pass) => (bug.enter(Phase::Done, 0), workers),
            Some(Verdict::Fail) if bug.attempts < MAX_ATTEMPTS => {
                let retried = BugState::new(Phase::Patch, full_timer, bug.attempts + 1);
                (retried, 0)
            }
            Some(Verdict::Fail) => match config.retry_policy {
                RetryPolicy::Escalate => (bug.enter(Phase::Escalate, 0), workers),
                RetryPolicy::Unlimited => (bug.enter(Phase::Patch, full_timer), 0),
            },
            None => (bug, 0),
        },
        Phase::Reproduce | Phase::Patch | Phase::Verify | Phase::Done | Phase::Escalate => {
            (bug, 0)
        }
    }
}

/// Full transition for one bug.
pub fn step(
    bug: BugState,
    free_workers: u32,
    verdict: Option<Verdict>,
    config: &SchedulerConfig,
) -> (BugState, i64) {
    if bug.is_active() && bug.timer > 0 {
        (countdown(bug), 0)
    } else {
        advance(bug, free_workers, verdict, config)
    }
}
