pub mod bug_task;
pub mod config;
pub mod engine_state;
pub mod monitor_state;
pub mod patch_bundle;
pub mod phase;

pub use bug_task::{BugId, BugTask};
pub use config::{
    Config, ExecutorConfig, LoggingConfig, PatchConfig, RetryPolicy, SchedulerConfig,
    VerifierConfig, WorkingTreeKind,
};
pub use engine_state::EngineState;
pub use monitor_state::{BugStatus, GlobalProgress, MonitorState, MonitorVerdict};
pub use patch_bundle::{sha256_hex, BundleManifest, LedgerEntry, PatchBundle};
pub use phase::{BugState, Phase, Verdict, MAX_ATTEMPTS, MAX_PHASE_TIMER};
