//! `fixloop run`: schedule a backlog to completion.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::backlog::Backlog;
use crate::cli::output::{
    action_failure, action_success, create_round_bar, output, CommandOutput, ProgressBarExt,
    TableFormatter,
};
use crate::cli::wiring;
use crate::domain::models::{Config, GlobalProgress};
use crate::services::{ContextOutcome, ContextReport, ParallelExecutor, StatusSnapshot};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Backlog file (YAML or JSON)
    #[arg(short, long)]
    pub backlog: PathBuf,

    /// Simulate with in-memory storage and scripted verdicts; nothing on disk changes
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub dry_run: bool,
    pub interrupted: bool,
    pub rounds: u32,
    pub resolved: usize,
    pub escalated: usize,
    pub progress: GlobalProgress,
    pub reports: Vec<ContextReport>,
    #[serde(skip)]
    snapshot: StatusSnapshot,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![TableFormatter::new().format_bugs(&self.snapshot.bugs)];
        let summary = format!(
            "{} resolved, {} escalated in {} rounds ({} ticks, {:.2} bits gained)",
            self.resolved,
            self.escalated,
            self.rounds,
            self.progress.ticks_used,
            self.progress.bits_gained
        );
        lines.push(if self.escalated == 0 && !self.interrupted {
            action_success(&summary)
        } else {
            action_failure(&summary)
        });
        if self.interrupted {
            lines.push("Interrupted; status.json reflects the last completed round.".to_string());
        }
        if self.dry_run {
            lines.push("Dry run: no patches were applied and nothing was recorded.".to_string());
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let backlog = Backlog::load(&args.backlog)?;

    let rollback = if args.dry_run {
        wiring::in_memory_rollback_manager()
    } else {
        wiring::open_rollback_manager(config).await?
    };

    let mut executor = ParallelExecutor::new(
        &config.scheduler,
        config.executor.clone(),
        wiring::verifier(config, &backlog, args.dry_run),
        wiring::patch_generator(config, args.dry_run),
        Arc::new(rollback),
    );
    executor.extend(backlog.tasks());
    info!(
        bugs = backlog.bugs.len(),
        dry_run = args.dry_run,
        max_parallel = config.executor.max_parallel,
        "run started"
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&interrupted);
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let status_path = config.patches.status_path();
    let bar = create_round_bar(backlog.bugs.len() as u64, json_mode);
    while !executor.is_idle() {
        if interrupted.load(Ordering::SeqCst) {
            warn!(round = executor.round(), "interrupted; stopping between rounds");
            break;
        }
        let step = executor.step().await;
        bar.inc(step.completed.len() as u64);
        bar.set_message(format!("round {}", step.round));
        if !args.dry_run {
            write_status(&status_path, &executor.snapshot())?;
        }
    }
    signal_task.abort();

    let reports = executor.finished().to_vec();
    let escalated = reports
        .iter()
        .filter(|r| matches!(r.outcome, ContextOutcome::Escalated { .. }))
        .count();
    let was_interrupted = interrupted.load(Ordering::SeqCst);
    if escalated == 0 && !was_interrupted {
        bar.finish_success("all bugs resolved");
    } else {
        bar.finish_warning(format!("{escalated} escalated"));
    }

    let out = RunOutput {
        dry_run: args.dry_run,
        interrupted: was_interrupted,
        rounds: executor.round(),
        resolved: reports.len() - escalated,
        escalated,
        progress: executor.global_progress(),
        reports,
        snapshot: executor.snapshot(),
    };
    output(&out, json_mode);

    if was_interrupted {
        bail!("run interrupted after round {}", out.rounds);
    }
    if escalated > 0 {
        bail!("{escalated} bug(s) escalated");
    }
    Ok(())
}

/// Write the snapshot next to the ledger, replacing the previous one atomically.
pub fn write_status(path: &Path, snapshot: &StatusSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(snapshot).context("Failed to serialize status")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Read the snapshot written by the last run.
pub fn read_status(path: &Path) -> Result<StatusSnapshot> {
    let body = std::fs::read(path).with_context(|| {
        format!(
            "No status recorded at {}. Run `fixloop run` first.",
            path.display()
        )
    })?;
    serde_json::from_slice(&body).with_context(|| format!("Corrupt status file {}", path.display()))
}
