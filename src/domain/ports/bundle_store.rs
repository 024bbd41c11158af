use async_trait::async_trait;

use crate::domain::errors::PatchResult;
use crate::domain::models::PatchBundle;

/// Durable storage for patch bytes and their manifest.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Persist the bundle and return its location.
    async fn put(&self, bundle: &PatchBundle) -> PatchResult<String>;

    /// Load the bundle stored at `location`.
    async fn get(&self, location: &str) -> PatchResult<PatchBundle>;

    /// Delete the bundle at `location`; missing bundles are not an error.
    async fn remove(&self, location: &str) -> PatchResult<()>;
}
