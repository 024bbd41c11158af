//! Fixloop - bounded bug-resolution scheduler
//!
//! Fixloop moves a backlog of bugs through a fixed lifecycle
//! (`Wait → Reproduce → Patch → Verify → Done | Escalate`) on a discrete
//! clock, under a hard worker budget and a hard tick budget. Patches are
//! packaged into integrity-checked bundles and can be reverted per bug.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): lifecycle models, errors and port traits
//! - **Service Layer** (`services`): tick engine, monitor, parallel executor, rollback
//! - **Adapters** (`adapters`): SQLite ledger, filesystem and git working trees, collaborators
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```
//! use fixloop::domain::models::{Phase, SchedulerConfig};
//! use fixloop::services::{Engine, Verdicts};
//!
//! let mut engine = Engine::new(SchedulerConfig::default());
//! let report = engine.tick(&Verdicts::new()).unwrap();
//! assert_eq!(report.tick_no, 1);
//! assert_eq!(engine.state().bugs[0].phase, Phase::Reproduce);
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ExecutorError, PatchError, SchedulerError};
pub use domain::models::{BugId, BugTask, Config, Phase, SchedulerConfig, Verdict};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Engine, Monitor, ParallelExecutor, RollbackManager};
