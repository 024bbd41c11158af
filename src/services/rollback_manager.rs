//! Rollback Manager
//!
//! Packages patches into integrity-checked bundles, applies them to the
//! working tree and reverses them on demand. The ledger maps each bug to its
//! most recent bundle; every mutation for a given bug is serialized through a
//! per-bug async lock while different bugs proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{PatchError, PatchResult};
use crate::domain::models::{BugId, LedgerEntry, PatchBundle};
use crate::domain::ports::{BundleStore, PatchLedger, WorkingTree, WorkingTreeError};

/// Result of a rollback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The recorded bundle was reverted and forgotten.
    RolledBack,
    /// Nothing was recorded for the bug; the tree was not touched.
    NoBundleRecorded,
}

/// Coordinates the ledger, the bundle store and the working tree.
pub struct RollbackManager {
    ledger: Arc<dyn PatchLedger>,
    store: Arc<dyn BundleStore>,
    tree: Arc<dyn WorkingTree>,
    locks: Mutex<HashMap<BugId, Arc<Mutex<()>>>>,
}

impl RollbackManager {
    pub fn new(
        ledger: Arc<dyn PatchLedger>,
        store: Arc<dyn BundleStore>,
        tree: Arc<dyn WorkingTree>,
    ) -> Self {
        Self {
            ledger,
            store,
            tree,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn PatchLedger> {
        &self.ledger
    }

    async fn lock_for(&self, bug_id: &BugId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(bug_id.clone()).or_default())
    }

    /// Hash and store `diff`, then record it as the bug's current bundle.
    ///
    /// A bundle previously recorded for the same bug is superseded and its
    /// stored copy deleted; callers revert it first if it was applied.
    #[instrument(skip(self, diff), fields(bug_id = %bug_id, bytes = diff.len()))]
    pub async fn create_bundle(
        &self,
        bug_id: &BugId,
        diff: Vec<u8>,
        label: &str,
    ) -> PatchResult<PatchBundle> {
        let lock = self.lock_for(bug_id).await;
        let _guard = lock.lock().await;

        let bundle = PatchBundle::new(bug_id.clone(), diff, label);
        let location = self.store.put(&bundle).await?;
        let previous = self.ledger.get(bug_id).await?;

        let entry = LedgerEntry {
            bug_id: bug_id.clone(),
            bundle_location: location.clone(),
            integrity_hash: bundle.integrity_hash.clone(),
            recorded_at: Utc::now(),
        };
        if let Err(err) = self.ledger.upsert(&entry).await {
            // Keep the store consistent with the ledger
            let _ = self.store.remove(&location).await;
            return Err(err);
        }

        if let Some(previous) = previous.filter(|p| p.bundle_location != location) {
            warn!(
                bug_id = %bug_id,
                superseded = %previous.bundle_location,
                "superseding recorded bundle"
            );
            self.remove_stored(bug_id, &previous.bundle_location).await;
        }

        debug!(bug_id = %bug_id, location = %location, hash = %bundle.integrity_hash, "bundle recorded");
        Ok(bundle)
    }

    /// Verify the bundle against the ledger and apply it to the working tree.
    ///
    /// On any error the tree and the ledger are unchanged.
    #[instrument(skip(self, bundle), fields(bug_id = %bundle.bug_id))]
    pub async fn apply(&self, bundle: &PatchBundle) -> PatchResult<()> {
        let lock = self.lock_for(&bundle.bug_id).await;
        let _guard = lock.lock().await;

        let entry = self.ledger.get(&bundle.bug_id).await?.ok_or_else(|| {
            PatchError::Ledger(format!("no bundle recorded for bug {}", bundle.bug_id))
        })?;
        check_integrity(bundle, &entry)?;

        self.tree
            .apply(&bundle.diff)
            .await
            .map_err(|err| tree_error(&bundle.bug_id, err))?;

        info!(bug_id = %bundle.bug_id, label = %bundle.manifest.label, "patch applied");
        Ok(())
    }

    /// Revert the bug's recorded bundle and forget it.
    ///
    /// The ledger entry is removed before the tree is touched and restored
    /// if the revert fails, so a reverted bundle is never left recorded.
    #[instrument(skip(self), fields(bug_id = %bug_id))]
    pub async fn rollback(&self, bug_id: &BugId) -> PatchResult<RollbackOutcome> {
        let lock = self.lock_for(bug_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.rollback_locked(bug_id).await
        };
        self.release(bug_id, lock).await;
        result
    }

    async fn rollback_locked(&self, bug_id: &BugId) -> PatchResult<RollbackOutcome> {
        let Some(entry) = self.ledger.get(bug_id).await? else {
            debug!(bug_id = %bug_id, "no bundle recorded; nothing to roll back");
            return Ok(RollbackOutcome::NoBundleRecorded);
        };

        let bundle = self.store.get(&entry.bundle_location).await?;
        check_integrity(&bundle, &entry)?;

        self.ledger.remove(bug_id).await?;
        if let Err(err) = self.tree.revert(&bundle.diff).await {
            if let Err(restore) = self.ledger.upsert(&entry).await {
                error!(
                    bug_id = %bug_id,
                    location = %entry.bundle_location,
                    error = %restore,
                    "revert failed and the ledger entry could not be restored"
                );
            }
            return Err(tree_error(bug_id, err));
        }
        self.remove_stored(bug_id, &entry.bundle_location).await;

        info!(bug_id = %bug_id, location = %entry.bundle_location, "patch rolled back");
        Ok(RollbackOutcome::RolledBack)
    }

    /// Forget the bug's recorded bundle without touching the working tree.
    ///
    /// Used when a recorded bundle never made it onto the tree.
    #[instrument(skip(self), fields(bug_id = %bug_id))]
    pub async fn discard(&self, bug_id: &BugId) -> PatchResult<bool> {
        let lock = self.lock_for(bug_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.discard_locked(bug_id).await
        };
        self.release(bug_id, lock).await;
        result
    }

    async fn discard_locked(&self, bug_id: &BugId) -> PatchResult<bool> {
        let Some(entry) = self.ledger.get(bug_id).await? else {
            return Ok(false);
        };
        self.ledger.remove(bug_id).await?;
        self.remove_stored(bug_id, &entry.bundle_location).await;
        debug!(bug_id = %bug_id, location = %entry.bundle_location, "bundle discarded");
        Ok(true)
    }

    /// Delete a stored copy the ledger no longer points at. A failure only
    /// leaves an orphaned file behind.
    async fn remove_stored(&self, bug_id: &BugId, location: &str) {
        if let Err(err) = self.store.remove(location).await {
            warn!(bug_id = %bug_id, location, error = %err, "stored bundle not deleted");
        }
    }

    /// Drop the bug's lock from the map once nobody else holds it.
    async fn release(&self, bug_id: &BugId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks
            .get(bug_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(bug_id);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Recomputed hash, bundle hash and ledger hash must all agree.
fn check_integrity(bundle: &PatchBundle, entry: &LedgerEntry) -> PatchResult<()> {
    let actual = bundle.computed_hash();
    if actual != bundle.integrity_hash {
        return Err(PatchError::IntegrityViolation {
            bug_id: bundle.bug_id.clone(),
            expected: bundle.integrity_hash.clone(),
            actual,
        });
    }
    if actual != entry.integrity_hash {
        return Err(PatchError::IntegrityViolation {
            bug_id: bundle.bug_id.clone(),
            expected: entry.integrity_hash.clone(),
            actual,
        });
    }
    Ok(())
}

fn tree_error(bug_id: &BugId, err: WorkingTreeError) -> PatchError {
    match err {
        WorkingTreeError::Rejected(reason) | WorkingTreeError::Malformed(reason) => {
            PatchError::ApplyRejected {
                bug_id: bug_id.clone(),
                reason,
            }
        }
        WorkingTreeError::Io(err) => PatchError::Store(err.to_string()),
    }
}
