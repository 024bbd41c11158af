//! Builds the collaborators a command needs from the loaded configuration.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::sqlite::{database_url, initialize_database};
use crate::adapters::{
    CommandVerifier, FilePatchGenerator, FsBundleStore, FsWorkingTree, GitWorkingTree,
    InMemoryBundleStore, InMemoryPatchLedger, InMemoryWorkingTree, SqlitePatchLedger,
    StaticPatchGenerator,
};
use crate::cli::backlog::Backlog;
use crate::domain::models::{Config, WorkingTreeKind};
use crate::domain::ports::{PatchGenerator, Verifier, WorkingTree};
use crate::infrastructure::config::ConfigLoader;
use crate::services::RollbackManager;

/// Load the configuration from `path` when given, otherwise from `.fixloop/`.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Rollback manager over the durable ledger, the on-disk bundle store and
/// the configured working tree.
pub async fn open_rollback_manager(config: &Config) -> Result<RollbackManager> {
    let pool = initialize_database(&database_url(&config.patches.ledger_path))
        .await
        .with_context(|| {
            format!(
                "Failed to open patch ledger at {}",
                config.patches.ledger_path
            )
        })?;

    let tree: Arc<dyn WorkingTree> = match config.patches.working_tree {
        WorkingTreeKind::Git => Arc::new(GitWorkingTree::new(&config.patches.worktree_root)),
        WorkingTreeKind::Files => Arc::new(FsWorkingTree::new(&config.patches.worktree_root)),
    };

    Ok(RollbackManager::new(
        Arc::new(SqlitePatchLedger::new(pool)),
        Arc::new(FsBundleStore::new(config.patches.bundle_dir())),
        tree,
    ))
}

/// Rollback manager that never touches the disk.
pub fn in_memory_rollback_manager() -> RollbackManager {
    RollbackManager::new(
        Arc::new(InMemoryPatchLedger::new()),
        Arc::new(InMemoryBundleStore::new()),
        Arc::new(InMemoryWorkingTree::new()),
    )
}

/// The configured command verifier, or the backlog's scripted verdicts.
pub fn verifier(config: &Config, backlog: &Backlog, dry_run: bool) -> Arc<dyn Verifier> {
    match (&config.verifier.command, dry_run) {
        (Some(command), false) => Arc::new(
            CommandVerifier::new(command.clone(), &config.patches.worktree_root)
                .with_timeout(Duration::from_secs(config.verifier.timeout_secs)),
        ),
        _ => Arc::new(backlog.scripted_verifier()),
    }
}

pub fn patch_generator(config: &Config, dry_run: bool) -> Arc<dyn PatchGenerator> {
    if dry_run {
        Arc::new(StaticPatchGenerator::new(b"dry run".to_vec()))
    } else {
        Arc::new(FilePatchGenerator::new(&config.patches.patch_dir))
    }
}
