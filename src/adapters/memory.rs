//! In-memory ledger, bundle store and working tree.
//!
//! Used by tests and by `fixloop run --dry-run`, where nothing should outlive
//! the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::{PatchError, PatchResult};
use crate::domain::models::{BugId, LedgerEntry, PatchBundle};
use crate::domain::ports::{BundleStore, PatchLedger, WorkingTree, WorkingTreeError};

fn poisoned<T>(_: T) -> PatchError {
    PatchError::Store("in-memory lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryPatchLedger {
    entries: RwLock<BTreeMap<BugId, LedgerEntry>>,
}

impl InMemoryPatchLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatchLedger for InMemoryPatchLedger {
    async fn upsert(&self, entry: &LedgerEntry) -> PatchResult<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(entry.bug_id.clone(), entry.clone());
        Ok(())
    }

    async fn get(&self, bug_id: &BugId) -> PatchResult<Option<LedgerEntry>> {
        Ok(self.entries.read().map_err(poisoned)?.get(bug_id).cloned())
    }

    async fn remove(&self, bug_id: &BugId) -> PatchResult<bool> {
        Ok(self
            .entries
            .write()
            .map_err(poisoned)?
            .remove(bug_id)
            .is_some())
    }

    async fn list(&self) -> PatchResult<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBundleStore {
    bundles: RwLock<HashMap<String, PatchBundle>>,
}

impl InMemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bundles.
    pub fn len(&self) -> usize {
        self.bundles.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    async fn put(&self, bundle: &PatchBundle) -> PatchResult<String> {
        let location = format!("mem://{}/{}", bundle.bug_id.file_stem(), Uuid::new_v4());
        self.bundles
            .write()
            .map_err(poisoned)?
            .insert(location.clone(), bundle.clone());
        Ok(location)
    }

    async fn get(&self, location: &str) -> PatchResult<PatchBundle> {
        self.bundles
            .read()
            .map_err(poisoned)?
            .get(location)
            .cloned()
            .ok_or_else(|| PatchError::Store(format!("no bundle stored at {location}")))
    }

    async fn remove(&self, location: &str) -> PatchResult<()> {
        self.bundles.write().map_err(poisoned)?.remove(location);
        Ok(())
    }
}

/// Working tree that only records which diffs are applied, newest last.
#[derive(Debug, Default)]
pub struct InMemoryWorkingTree {
    applied: RwLock<Vec<Vec<u8>>>,
}

impl InMemoryWorkingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<Vec<u8>> {
        self.applied.read().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WorkingTree for InMemoryWorkingTree {
    async fn apply(&self, diff: &[u8]) -> Result<(), WorkingTreeError> {
        self.applied
            .write()
            .map_err(|_| WorkingTreeError::Rejected("tree lock poisoned".to_string()))?
            .push(diff.to_vec());
        Ok(())
    }

    async fn revert(&self, diff: &[u8]) -> Result<(), WorkingTreeError> {
        let mut applied = self
            .applied
            .write()
            .map_err(|_| WorkingTreeError::Rejected("tree lock poisoned".to_string()))?;
        let position = applied
            .iter()
            .rposition(|d| d.as_slice() == diff)
            .ok_or_else(|| WorkingTreeError::Rejected("diff is not applied".to_string()))?;
        applied.remove(position);
        Ok(())
    }
}
