use async_trait::async_trait;

use crate::domain::errors::PatchResult;
use crate::domain::models::{BugId, LedgerEntry};

/// Durable `bug_id → bundle` index.
///
/// Upserts and removals are atomic per key.
#[async_trait]
pub trait PatchLedger: Send + Sync {
    /// Insert or replace the entry for `entry.bug_id`.
    async fn upsert(&self, entry: &LedgerEntry) -> PatchResult<()>;

    async fn get(&self, bug_id: &BugId) -> PatchResult<Option<LedgerEntry>>;

    /// Remove the entry; returns whether one existed.
    async fn remove(&self, bug_id: &BugId) -> PatchResult<bool>;

    /// All entries ordered by bug id.
    async fn list(&self) -> PatchResult<Vec<LedgerEntry>>;
}
