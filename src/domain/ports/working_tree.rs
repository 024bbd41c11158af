use async_trait::async_trait;
use thiserror::Error;

/// Why a patch could not be applied to (or reverted from) the tree.
#[derive(Debug, Error)]
pub enum WorkingTreeError {
    /// The patch does not fit the current tree; nothing was changed.
    #[error("patch rejected: {0}")]
    Rejected(String),

    /// The patch bytes are not in the format this tree understands.
    #[error("malformed patch: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The tree patches are applied to.
///
/// Both operations are all-or-nothing: on error the tree is left exactly as
/// it was.
#[async_trait]
pub trait WorkingTree: Send + Sync {
    async fn apply(&self, diff: &[u8]) -> Result<(), WorkingTreeError>;

    /// Apply the inverse of `diff`.
    async fn revert(&self, diff: &[u8]) -> Result<(), WorkingTreeError>;
}
