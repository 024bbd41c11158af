//! Service layer: the tick engine, its monitor, the parallel executor and
//! patch rollback.

pub mod engine;
pub mod monitor;
pub mod parallel_executor;
pub mod rollback_manager;
pub mod transition;

pub use engine::{Engine, PhaseChange, TickReport, VerificationDue, Verdicts};
pub use monitor::{check_invariants, Monitor, MonitoredTick};
pub use parallel_executor::{
    BugSnapshot, ContextFailure, ContextOutcome, ContextReport, ParallelExecutor, StatusSnapshot,
    StepReport,
};
pub use rollback_manager::{RollbackManager, RollbackOutcome};
