use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::models::{BugId, Verdict};

/// Port for the external verification step.
///
/// Called exactly once per verification attempt, when a bug's Verify timer
/// is about to reach zero. Real implementations run test suites, canaries or
/// smoke checks.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Judge attempt `attempt` (0-based) of the patch for `bug_id`.
    async fn verify(&self, bug_id: &BugId, attempt: u8) -> Result<Verdict, CollaboratorError>;
}
