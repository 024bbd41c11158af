use serde::{Deserialize, Serialize};

use super::phase::MAX_ATTEMPTS;

/// Main configuration structure for fixloop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Tick engine sizing and budgets
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Parallel executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Patch bundle storage and application
    #[serde(default)]
    pub patches: PatchConfig,

    /// Verification collaborator
    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What happens when verification fails after the single allowed retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Give the bug up: `Verify → Escalate`, workers returned.
    #[default]
    Escalate,
    /// Keep cycling `Verify → Patch` until verification passes or the tick
    /// budget runs out.
    Unlimited,
}

/// Immutable sizing for one tick engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Number of bug slots in an engine
    #[serde(default = "default_max_bugs")]
    pub max_bugs: usize,

    /// Workers a bug holds while in Reproduce, Patch or Verify
    #[serde(default = "default_workers_per_bug")]
    pub workers_per_bug: u32,

    /// Worker credits owned by an engine
    #[serde(default = "default_total_workers")]
    pub total_workers: u32,

    /// Hard tick budget
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,

    /// Ticks spent in each active phase
    #[serde(default = "default_phase_timer")]
    pub phase_timer: u8,

    /// Policy for a second verification failure
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

const fn default_max_bugs() -> usize {
    10
}

const fn default_workers_per_bug() -> u32 {
    3
}

const fn default_total_workers() -> u32 {
    9
}

const fn default_max_ticks() -> u32 {
    60
}

const fn default_phase_timer() -> u8 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_bugs: default_max_bugs(),
            workers_per_bug: default_workers_per_bug(),
            total_workers: default_total_workers(),
            max_ticks: default_max_ticks(),
            phase_timer: default_phase_timer(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Bugs that can hold workers at the same time.
    pub fn concurrency(&self) -> u32 {
        if self.workers_per_bug == 0 {
            return 0;
        }
        self.total_workers / self.workers_per_bug
    }

    /// Ticks from a bug's admission to the tick it settles, in the worst case.
    ///
    /// The admission tick is the first Reproduce tick, so Reproduce lasts
    /// `phase_timer - 1` further ticks (at least one). Patch and Verify then
    /// run once, plus one Patch/Verify pair per allowed retry. `None` when
    /// retries are unbounded.
    pub fn settle_span(&self) -> Option<u32> {
        match self.retry_policy {
            RetryPolicy::Escalate => {
                let timer = u32::from(self.phase_timer);
                let reproduce = timer.saturating_sub(1).max(1);
                Some(reproduce + 2 * timer * (1 + u32::from(MAX_ATTEMPTS)))
            }
            RetryPolicy::Unlimited => None,
        }
    }

    /// Ticks a bug occupies its workers in the worst case, counting both the
    /// admission tick and the settling tick.
    pub fn ticks_per_bug(&self) -> Option<u32> {
        self.settle_span().map(|span| span + 1)
    }

    /// Tick on which the last of `bugs` settles when every bug uses its full
    /// retry budget.
    ///
    /// Bugs are admitted in waves of [`concurrency`](Self::concurrency). A
    /// waiting bug is admitted on the same tick the previous occupant
    /// returns its workers, so consecutive waves overlap by one tick:
    /// `1 + waves * settle_span`.
    pub fn worst_case_ticks(&self, bugs: usize) -> Option<u32> {
        let span = self.settle_span()?;
        let concurrency = self.concurrency() as usize;
        if bugs == 0 {
            return Some(0);
        }
        if concurrency == 0 {
            return None;
        }
        let waves = u32::try_from(bugs.div_ceil(concurrency)).ok()?;
        waves.checked_mul(span).and_then(|t| t.checked_add(1))
    }

    /// Sizing for one executor context: a single bug slot with an equal share
    /// of the worker pool.
    pub fn context_slice(&self, max_parallel: usize) -> Self {
        let share = u32::try_from(max_parallel.max(1))
            .map_or(self.workers_per_bug, |parallel| self.total_workers / parallel);
        Self {
            max_bugs: 1,
            total_workers: share,
            ..self.clone()
        }
    }
}

/// Parallel executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Maximum bug contexts advanced concurrently
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Attempts at generating and applying a patch before escalating
    #[serde(default = "default_patch_attempts")]
    pub patch_attempts: u32,

    /// Initial backoff between patch attempts in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between patch attempts in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_parallel() -> usize {
    3
}

const fn default_patch_attempts() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            patch_attempts: default_patch_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Where patches are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingTreeKind {
    /// Unified diffs applied with `git apply`
    #[default]
    Git,
    /// Whole-file replacement patches applied directly on disk
    Files,
}

/// Patch storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PatchConfig {
    /// Directory holding fixloop state (bundles, ledger, status snapshot)
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Path to the `SQLite` patch ledger
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,

    /// Root of the working tree patches are applied to
    #[serde(default = "default_worktree_root")]
    pub worktree_root: String,

    /// Patch format / application strategy
    #[serde(default)]
    pub working_tree: WorkingTreeKind,

    /// Directory of prepared patches (`<bug>.patch`, `<bug>.<attempt>.patch`)
    #[serde(default = "default_patch_dir")]
    pub patch_dir: String,
}

fn default_state_dir() -> String {
    ".fixloop".to_string()
}

fn default_ledger_path() -> String {
    ".fixloop/ledger.db".to_string()
}

fn default_worktree_root() -> String {
    ".".to_string()
}

fn default_patch_dir() -> String {
    ".fixloop/patches".to_string()
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            ledger_path: default_ledger_path(),
            worktree_root: default_worktree_root(),
            working_tree: WorkingTreeKind::default(),
            patch_dir: default_patch_dir(),
        }
    }
}

impl PatchConfig {
    pub fn bundle_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.state_dir).join("bundles")
    }

    pub fn status_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.state_dir).join("status.json")
    }
}

/// Verification collaborator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerifierConfig {
    /// Shell command run once per verification; exit status 0 passes.
    /// When unset, verdicts come from the backlog file's scripts.
    #[serde(default)]
    pub command: Option<String>,

    /// Seconds before a running command is killed and reported as an error
    #[serde(default = "default_verifier_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_verifier_timeout_secs() -> u64 {
    300
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_verifier_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
