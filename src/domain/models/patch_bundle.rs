//! Integrity-checked packaging of a single patch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use super::bug_task::BugId;

/// Descriptive metadata stored next to the patch bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub created_at: DateTime<Utc>,
    pub label: String,
}

/// A patch ready to be applied, keyed by the bug it fixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchBundle {
    pub bug_id: BugId,
    pub diff: Vec<u8>,
    pub manifest: BundleManifest,
    /// Lowercase hex SHA-256 of `diff`.
    pub integrity_hash: String,
}

impl PatchBundle {
    pub fn new(bug_id: BugId, diff: Vec<u8>, label: impl Into<String>) -> Self {
        let integrity_hash = sha256_hex(&diff);
        Self {
            bug_id,
            diff,
            manifest: BundleManifest {
                created_at: Utc::now(),
                label: label.into(),
            },
            integrity_hash,
        }
    }

    /// Hash of the bytes as they are now.
    pub fn computed_hash(&self) -> String {
        sha256_hex(&self.diff)
    }

    pub fn is_intact(&self) -> bool {
        self.computed_hash() == self.integrity_hash
    }
}

/// Ledger record pointing at a stored bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub bug_id: BugId,
    pub bundle_location: String,
    pub integrity_hash: String,
    pub recorded_at: DateTime<Utc>,
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
