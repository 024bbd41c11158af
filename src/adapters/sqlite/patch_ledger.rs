//! SQLite implementation of the PatchLedger.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{PatchError, PatchResult};
use crate::domain::models::{BugId, LedgerEntry};
use crate::domain::ports::PatchLedger;

pub struct SqlitePatchLedger {
    pool: SqlitePool,
}

impl SqlitePatchLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatchLedger for SqlitePatchLedger {
    async fn upsert(&self, entry: &LedgerEntry) -> PatchResult<()> {
        sqlx::query(
            r"INSERT INTO patch_ledger (bug_id, bundle_location, integrity_hash, recorded_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(bug_id) DO UPDATE SET
                   bundle_location = excluded.bundle_location,
                   integrity_hash = excluded.integrity_hash,
                   recorded_at = excluded.recorded_at",
        )
        .bind(entry.bug_id.as_str())
        .bind(&entry.bundle_location)
        .bind(&entry.integrity_hash)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, bug_id: &BugId) -> PatchResult<Option<LedgerEntry>> {
        let row: Option<LedgerRow> = sqlx::query_as("SELECT * FROM patch_ledger WHERE bug_id = ?")
            .bind(bug_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn remove(&self, bug_id: &BugId) -> PatchResult<bool> {
        let result = sqlx::query("DELETE FROM patch_ledger WHERE bug_id = ?")
            .bind(bug_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> PatchResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = sqlx::query_as("SELECT * FROM patch_ledger ORDER BY bug_id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    bug_id: String,
    bundle_location: String,
    integrity_hash: String,
    recorded_at: String,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = PatchError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let recorded_at = chrono::DateTime::parse_from_rfc3339(&row.recorded_at)
            .map_err(|e| PatchError::Ledger(format!("bad recorded_at for {}: {e}", row.bug_id)))?
            .with_timezone(&chrono::Utc);

        Ok(Self {
            bug_id: BugId::new(row.bug_id),
            bundle_location: row.bundle_location,
            integrity_hash: row.integrity_hash,
            recorded_at,
        })
    }
}
