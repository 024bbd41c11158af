use async_trait::async_trait;

use crate::domain::errors::CollaboratorError;
use crate::domain::models::BugTask;

/// What the generator knows about the patch being requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    /// Failed verifications so far for this bug.
    pub attempt: u8,
    /// Engine tick on which the bug entered `Patch`.
    pub tick_no: u32,
}

/// Port for the collaborator that writes patch content.
///
/// Called once per entry into the `Patch` phase (plus retries when the
/// produced patch cannot be applied).
#[async_trait]
pub trait PatchGenerator: Send + Sync {
    async fn generate_patch(
        &self,
        task: &BugTask,
        request: &PatchRequest,
    ) -> Result<Vec<u8>, CollaboratorError>;
}
