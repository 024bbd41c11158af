//! `fixloop rollback`: revert the last applied patch for a bug.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{action_success, output, CommandOutput};
use crate::cli::wiring;
use crate::domain::models::{BugId, Config};
use crate::services::{RollbackManager, RollbackOutcome};

#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Bug whose patch should be reverted
    pub bug_id: String,
}

#[derive(Debug, Serialize)]
pub struct RollbackOutput {
    pub bug_id: BugId,
    pub outcome: RollbackOutcome,
}

impl CommandOutput for RollbackOutput {
    fn to_human(&self) -> String {
        match self.outcome {
            RollbackOutcome::RolledBack => {
                action_success(&format!("Reverted the patch for {}", self.bug_id))
            }
            RollbackOutcome::NoBundleRecorded => {
                format!("No patch recorded for {}; nothing to do.", self.bug_id)
            }
        }
    }
}

pub async fn execute(args: RollbackArgs, config: &Config, json_mode: bool) -> Result<()> {
    let manager = wiring::open_rollback_manager(config).await?;
    let out = rollback(&manager, BugId::new(args.bug_id)).await?;
    output(&out, json_mode);
    Ok(())
}

async fn rollback(manager: &RollbackManager, bug_id: BugId) -> Result<RollbackOutput> {
    let outcome = manager
        .rollback(&bug_id)
        .await
        .with_context(|| format!("Rollback of {bug_id} failed"))?;
    Ok(RollbackOutput { bug_id, outcome })
}
