use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::{Config, RetryPolicy};
use crate::domain::models::MAX_PHASE_TIMER;

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid max_bugs: {0}. Must be at least 1")]
    InvalidMaxBugs(usize),

    #[error(
        "Invalid worker sizing: total_workers ({total}) must be at least workers_per_bug ({per_bug}), which must be positive"
    )]
    InvalidWorkers { per_bug: u32, total: u32 },

    #[error("Invalid phase_timer: {0}. Must be between 1 and {max}", max = MAX_PHASE_TIMER)]
    InvalidPhaseTimer(u8),

    #[error(
        "Tick budget too small: {max_bugs} bugs need up to {required} ticks but max_ticks is {max_ticks}"
    )]
    TickBudgetTooSmall {
        max_bugs: usize,
        required: u32,
        max_ticks: u32,
    },

    #[error(
        "Invalid max_parallel: {max_parallel} contexts x {per_bug} workers exceeds total_workers ({total})"
    )]
    InvalidParallelism {
        max_parallel: usize,
        per_bug: u32,
        total: u32,
    },

    #[error("Invalid patch_attempts: {0}. Cannot be 0")]
    InvalidPatchAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("{0} cannot be empty")]
    EmptyPath(&'static str),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .fixloop/config.yaml (project config)
    /// 3. .fixloop/local.yaml (local overrides, optional)
    /// 4. Environment variables (FIXLOOP_* prefix, `__` between sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".fixloop")
    }

    /// Same precedence as [`load`](Self::load), reading the YAML files from
    /// `dir` instead of `.fixloop/`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("FIXLOOP_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("FIXLOOP_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let scheduler = &config.scheduler;

        if scheduler.max_bugs == 0 {
            return Err(ConfigError::InvalidMaxBugs(scheduler.max_bugs));
        }

        if scheduler.workers_per_bug == 0 || scheduler.total_workers < scheduler.workers_per_bug {
            return Err(ConfigError::InvalidWorkers {
                per_bug: scheduler.workers_per_bug,
                total: scheduler.total_workers,
            });
        }

        if scheduler.phase_timer == 0 || scheduler.phase_timer > MAX_PHASE_TIMER {
            return Err(ConfigError::InvalidPhaseTimer(scheduler.phase_timer));
        }

        if scheduler.retry_policy == RetryPolicy::Escalate {
            let required = scheduler.worst_case_ticks(scheduler.max_bugs).ok_or_else(|| {
                ConfigError::ValidationFailed("worst-case tick count overflows".to_string())
            })?;
            if required > scheduler.max_ticks {
                return Err(ConfigError::TickBudgetTooSmall {
                    max_bugs: scheduler.max_bugs,
                    required,
                    max_ticks: scheduler.max_ticks,
                });
            }
        } else if scheduler.max_ticks == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_ticks must be positive".to_string(),
            ));
        }

        let executor = &config.executor;
        let parallel_workers = u32::try_from(executor.max_parallel)
            .ok()
            .and_then(|n| n.checked_mul(scheduler.workers_per_bug));
        if executor.max_parallel == 0
            || parallel_workers.map_or(true, |n| n > scheduler.total_workers)
        {
            return Err(ConfigError::InvalidParallelism {
                max_parallel: executor.max_parallel,
                per_bug: scheduler.workers_per_bug,
                total: scheduler.total_workers,
            });
        }

        if executor.patch_attempts == 0 {
            return Err(ConfigError::InvalidPatchAttempts(executor.patch_attempts));
        }

        if executor.initial_backoff_ms > executor.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                executor.initial_backoff_ms,
                executor.max_backoff_ms,
            ));
        }

        let patches = &config.patches;
        for (name, value) in [
            ("patches.state_dir", &patches.state_dir),
            ("patches.ledger_path", &patches.ledger_path),
            ("patches.worktree_root", &patches.worktree_root),
            ("patches.patch_dir", &patches.patch_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyPath(name));
            }
        }

        if matches!(&config.verifier.command, Some(command) if command.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "verifier.command cannot be blank; omit it to use scripted verdicts".to_string(),
            ));
        }
        if config.verifier.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "verifier.timeout_secs must be positive".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
