//! Tick engine.
//!
//! Owns the bug array and its worker pool and advances every bug once per
//! tick in two phases:
//!
//! 1. **countdown**: a pure map that decrements the timer of every active bug
//! 2. **advance**: bugs in index order; worker deltas are folded into the pool
//!    as each bug is processed, so workers released by bug `i` are visible to
//!    bug `i + 1` in the same tick
//!
//! A tick is atomic: the new state is committed only once both phases have
//! succeeded.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::transition;
use crate::domain::errors::{InvariantViolation, SchedulerError, SchedulerResult};
use crate::domain::models::{BugState, EngineState, Phase, SchedulerConfig, Verdict};

/// Verdicts for this tick, keyed by bug index.
pub type Verdicts = HashMap<usize, Verdict>;

/// A bug that needs a verdict before the next tick can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationDue {
    pub bug_index: usize,
    /// Failed verifications so far, i.e. the 0-based attempt number.
    pub attempt: u8,
}

/// A bug whose phase changed during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub bug_index: usize,
    pub from: BugState,
    pub to: BugState,
}

impl PhaseChange {
    /// A verification failed and the bug went back to patching.
    pub fn is_verification_failure(&self) -> bool {
        self.from.phase == Phase::Verify && self.to.phase == Phase::Patch
    }

    pub fn entered(&self, phase: Phase) -> bool {
        self.to.phase == phase
    }
}

/// What happened in one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Tick counter after the tick.
    pub tick_no: u32,
    pub changes: Vec<PhaseChange>,
}

/// Single-threaded tick engine.
#[derive(Debug, Clone)]
pub struct Engine {
    config: SchedulerConfig,
    state: EngineState,
}

impl Engine {
    /// Fresh engine: `max_bugs` waiting bugs and a full worker pool.
    pub fn new(config: SchedulerConfig) -> Self {
        let state = EngineState::initial(config.max_bugs, config.total_workers);
        Self { config, state }
    }

    /// Engine resuming from an existing state.
    pub fn with_state(config: SchedulerConfig, state: EngineState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn bug(&self, index: usize) -> Option<BugState> {
        self.state.bugs.get(index).copied()
    }

    /// Workers currently held by active bugs.
    pub fn workers_in_use(&self) -> u32 {
        self.config.total_workers.saturating_sub(self.state.free_workers)
    }

    /// Bugs whose Verify timer reaches zero on the next tick.
    pub fn verifications_due(&self) -> Vec<VerificationDue> {
        self.state
            .bugs
            .iter()
            .enumerate()
            .filter(|(_, bug)| bug.phase == Phase::Verify && bug.timer <= 1)
            .map(|(bug_index, bug)| VerificationDue {
                bug_index,
                attempt: bug.attempts,
            })
            .collect()
    }

    /// Force a bug into `Escalate` outside the tick cycle, returning its
    /// workers to the pool.
    ///
    /// Used when the bug's context fails for a reason the transition rules
    /// do not model (budget, invariant or collaborator failure). Terminal
    /// bugs are left alone.
    pub fn escalate(&mut self, index: usize) -> Option<BugState> {
        let bug = *self.state.bugs.get(index)?;
        if bug.phase.is_terminal() {
            return Some(bug);
        }
        if bug.is_active() {
            self.state.free_workers = self
                .state
                .free_workers
                .saturating_add(self.config.workers_per_bug)
                .min(self.config.total_workers);
        }
        let escalated = BugState::new(Phase::Escalate, 0, bug.attempts);
        self.state.bugs[index] = escalated;
        debug!(
            bug_index = index,
            from = %bug.phase,
            free_workers = self.state.free_workers,
            "bug escalated"
        );
        Some(escalated)
    }

    /// Advance every bug by one tick.
    ///
    /// Fails without touching the state when the tick budget is spent or a
    /// verdict needed this tick is missing from `verdicts`.
    pub fn tick(&mut self, verdicts: &Verdicts) -> SchedulerResult<TickReport> {
        let tick_no = self.state.tick_no;
        if tick_no >= self.config.max_ticks {
            return Err(SchedulerError::TickBudgetExceeded {
                tick_no,
                max_ticks: self.config.max_ticks,
                unfinished: self.state.unfinished(),
            });
        }

        let counted: Vec<BugState> = self
            .state
            .bugs
            .iter()
            .copied()
            .map(transition::countdown)
            .collect();

        if let Some(bug_index) = counted
            .iter()
            .enumerate()
            .find(|(index, bug)| {
                bug.phase == Phase::Verify && bug.timer == 0 && !verdicts.contains_key(index)
            })
            .map(|(index, _)| index)
        {
            return Err(SchedulerError::MissingVerdict { bug_index, tick_no });
        }

        let mut free = i64::from(self.state.free_workers);
        let mut next = Vec::with_capacity(counted.len());
        for (index, bug) in counted.into_iter().enumerate() {
            if bug.is_active() && bug.timer > 0 {
                next.push(bug);
                continue;
            }
            let available = u32::try_from(free.max(0)).unwrap_or(u32::MAX);
            let (advanced, delta) = transition::advance(
                bug,
                available,
                verdicts.get(&index).copied(),
                &self.config,
            );
            free += delta;
            next.push(advanced);
        }

        let free_workers = u32::try_from(free).map_err(|_| {
            let active = next.iter().filter(|bug| bug.is_active()).count();
            let held = i64::from(self.config.workers_per_bug) * active as i64;
            InvariantViolation::Capacity {
                tick_no,
                free_workers: 0,
                workers_per_bug: self.config.workers_per_bug,
                active,
                computed: free + held,
                expected: i64::from(self.config.total_workers),
            }
        })?;

        let changes: Vec<PhaseChange> = self
            .state
            .bugs
            .iter()
            .zip(&next)
            .enumerate()
            .filter(|(_, (from, to))| from.phase != to.phase)
            .map(|(bug_index, (from, to))| PhaseChange {
                bug_index,
                from: *from,
                to: *to,
            })
            .collect();

        for change in &changes {
            trace!(
                tick_no,
                bug_index = change.bug_index,
                from = %change.from.phase,
                to = %change.to.phase,
                attempts = change.to.attempts,
                "phase change"
            );
        }

        self.state = EngineState {
            bugs: next,
            free_workers,
            tick_no: tick_no + 1,
        };

        debug!(
            tick_no = self.state.tick_no,
            free_workers,
            active = self.state.active_count(),
            changes = changes.len(),
            "tick applied"
        );

        Ok(TickReport {
            tick_no: self.state.tick_no,
            changes,
        })
    }
}
