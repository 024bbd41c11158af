//! Whole-engine state: the bug array plus its worker pool.

use serde::{Deserialize, Serialize};

use super::phase::BugState;

/// State owned by one tick engine.
///
/// Created once with every bug in `Wait`; afterwards only the engine's tick
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub bugs: Vec<BugState>,
    pub free_workers: u32,
    pub tick_no: u32,
}

impl EngineState {
    /// `bug_count` waiting bugs and a full worker pool.
    pub fn initial(bug_count: usize, total_workers: u32) -> Self {
        Self {
            bugs: vec![BugState::waiting(); bug_count],
            free_workers: total_workers,
            tick_no: 0,
        }
    }

    /// Bugs currently holding workers.
    pub fn active_count(&self) -> usize {
        self.bugs.iter().filter(|bug| bug.is_active()).count()
    }

    pub fn all_done(&self) -> bool {
        self.bugs
            .iter()
            .all(|bug| bug.phase == super::phase::Phase::Done)
    }

    pub fn all_terminal(&self) -> bool {
        self.bugs.iter().all(|bug| bug.phase.is_terminal())
    }

    /// Indices of bugs that have not reached `Done`.
    pub fn unfinished(&self) -> Vec<usize> {
        self.bugs
            .iter()
            .enumerate()
            .filter(|(_, bug)| bug.phase != super::phase::Phase::Done)
            .map(|(index, _)| index)
            .collect()
    }
}
