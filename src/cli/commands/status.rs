//! `fixloop status`: show the status recorded by the last run.

use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;

use super::run::read_status;
use crate::adapters::sqlite::{database_url, initialize_database};
use crate::adapters::SqlitePatchLedger;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{BugId, Config, GlobalProgress, LedgerEntry};
use crate::domain::ports::PatchLedger;
use crate::services::{BugSnapshot, StatusSnapshot};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this bug
    pub bug_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub generated_at: String,
    pub round: u32,
    pub progress: GlobalProgress,
    pub bugs: Vec<BugSnapshot>,
    /// Bundles currently recorded in the ledger
    pub patches: Vec<LedgerEntry>,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut lines = vec![
            format!(
                "Round {} ({}): {} ticks used, {:.2} bits gained",
                self.round, self.generated_at, self.progress.ticks_used, self.progress.bits_gained
            ),
            formatter.format_bugs(&self.bugs),
        ];
        if self.patches.is_empty() {
            lines.push("No patches recorded.".to_string());
        } else {
            lines.push(formatter.format_ledger(&self.patches));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: StatusArgs, config: &Config, json_mode: bool) -> Result<()> {
    let snapshot = read_status(&config.patches.status_path())?;
    let patches = recorded_patches(config).await?;
    let out = build_output(snapshot, patches, args.bug_id.as_deref())?;
    output(&out, json_mode);
    Ok(())
}

/// Ledger entries, or none when no ledger has been created yet.
async fn recorded_patches(config: &Config) -> Result<Vec<LedgerEntry>> {
    if !Path::new(&config.patches.ledger_path).exists() {
        return Ok(Vec::new());
    }
    let pool = initialize_database(&database_url(&config.patches.ledger_path)).await?;
    Ok(SqlitePatchLedger::new(pool).list().await?)
}

fn build_output(
    snapshot: StatusSnapshot,
    mut patches: Vec<LedgerEntry>,
    bug_id: Option<&str>,
) -> Result<StatusOutput> {
    let mut bugs = snapshot.bugs;
    if let Some(wanted) = bug_id.map(BugId::new) {
        bugs.retain(|bug| bug.bug_id == wanted);
        if bugs.is_empty() {
            return Err(anyhow!("Bug {wanted} is not in the last run"));
        }
        patches.retain(|entry| entry.bug_id == wanted);
    }
    Ok(StatusOutput {
        generated_at: snapshot.generated_at.to_rfc3339(),
        round: snapshot.round,
        progress: snapshot.progress,
        bugs,
        patches,
    })
}
