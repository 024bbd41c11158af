//! Monitor bookkeeping and the read-only views exposed to callers.

use serde::{Deserialize, Serialize};

use super::phase::{BugState, Phase};

/// Information budget tracked by a monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    /// `log2` of the candidate-cause search space; fixed at construction.
    pub initial_entropy_bits: f64,
    /// One bit per observed verification failure; never decreases.
    pub gained_bits: f64,
    pub done: bool,
}

impl MonitorState {
    pub fn new(initial_entropy_bits: f64) -> Self {
        Self {
            initial_entropy_bits: initial_entropy_bits.max(0.0),
            gained_bits: 0.0,
            done: false,
        }
    }

    /// Entropy of a uniform search space over `candidates` causes.
    pub fn for_candidates(candidates: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let bits = (candidates.max(1) as f64).log2();
        Self::new(bits)
    }

    pub fn bound_reached(&self) -> bool {
        self.gained_bits >= self.initial_entropy_bits
    }
}

/// Decision taken by the monitor after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorVerdict {
    /// Keep ticking.
    Continue,
    /// Every bug is `Done` and the entropy bound is covered.
    Success,
}

/// Per-bug view for dashboards and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugStatus {
    pub phase: Phase,
    pub timer: u8,
    pub attempts: u8,
}

impl From<BugState> for BugStatus {
    fn from(bug: BugState) -> Self {
        Self {
            phase: bug.phase,
            timer: bug.timer,
            attempts: bug.attempts,
        }
    }
}

/// Aggregate progress view.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalProgress {
    pub ticks_used: u32,
    pub bits_gained: f64,
    pub bits_total: f64,
}

impl std::ops::Add for GlobalProgress {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            ticks_used: self.ticks_used + other.ticks_used,
            bits_gained: self.bits_gained + other.bits_gained,
            bits_total: self.bits_total + other.bits_total,
        }
    }
}
