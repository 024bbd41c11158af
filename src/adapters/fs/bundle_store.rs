//! Bundle store on the local filesystem.
//!
//! Layout: `<root>/<bug>/<uuid>.diff` holds the patch bytes and
//! `<root>/<bug>/<uuid>.json` the manifest. Both are written through a
//! temporary file and renamed into place.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::domain::errors::{PatchError, PatchResult};
use crate::domain::models::{BugId, BundleManifest, PatchBundle};
use crate::domain::ports::BundleStore;

#[derive(Debug, Serialize, Deserialize)]
struct StoredManifest {
    bug_id: BugId,
    integrity_hash: String,
    #[serde(flatten)]
    manifest: BundleManifest,
}

pub struct FsBundleStore {
    root: PathBuf,
}

impl FsBundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a location relative to the root, refusing anything that
    /// would escape it.
    fn resolve(&self, location: &str) -> PatchResult<PathBuf> {
        let relative = Path::new(location);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(PatchError::Store(format!(
                "bundle location {location} is outside the store"
            )));
        }
        Ok(self.root.join(relative))
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    fs::write(&tmp, contents).await?;
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[async_trait]
impl BundleStore for FsBundleStore {
    async fn put(&self, bundle: &PatchBundle) -> PatchResult<String> {
        let stem = bundle.bug_id.file_stem();
        let id = Uuid::new_v4();
        let location = format!("{stem}/{id}.diff");
        let diff_path = self.root.join(&location);
        let manifest_path = diff_path.with_extension("json");

        fs::create_dir_all(self.root.join(&stem)).await?;

        let manifest = StoredManifest {
            bug_id: bundle.bug_id.clone(),
            integrity_hash: bundle.integrity_hash.clone(),
            manifest: bundle.manifest.clone(),
        };
        write_atomic(&diff_path, &bundle.diff).await?;
        if let Err(err) = write_atomic(&manifest_path, &serde_json::to_vec_pretty(&manifest)?).await {
            let _ = fs::remove_file(&diff_path).await;
            return Err(err.into());
        }

        Ok(location)
    }

    async fn get(&self, location: &str) -> PatchResult<PatchBundle> {
        let diff_path = self.resolve(location)?;
        let manifest_path = diff_path.with_extension("json");

        let diff = fs::read(&diff_path)
            .await
            .map_err(|e| PatchError::Store(format!("reading {}: {e}", diff_path.display())))?;
        let raw = fs::read(&manifest_path)
            .await
            .map_err(|e| PatchError::Store(format!("reading {}: {e}", manifest_path.display())))?;
        let stored: StoredManifest = serde_json::from_slice(&raw)?;

        Ok(PatchBundle {
            bug_id: stored.bug_id,
            diff,
            manifest: stored.manifest,
            integrity_hash: stored.integrity_hash,
        })
    }

    async fn remove(&self, location: &str) -> PatchResult<()> {
        let diff_path = self.resolve(location)?;
        remove_if_present(&diff_path).await?;
        remove_if_present(&diff_path.with_extension("json")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = FsBundleStore::new(dir.path());
        let bundle = PatchBundle::new(BugId::new("BUG 7"), b"--- a\n+++ b\n".to_vec(), "attempt 0");

        let location = store.put(&bundle).await.unwrap();
        assert!(location.starts_with("BUG_7/"));
        assert!(dir.path().join(&location).exists());

        let loaded = store.get(&location).await.unwrap();
        assert_eq!(loaded, bundle);

        store.remove(&location).await.unwrap();
        assert!(!dir.path().join(&location).exists());
        store.remove(&location).await.unwrap();
        assert!(store.get(&location).await.is_err());
    }

    #[tokio::test]
    async fn test_tampered_bytes_are_returned_as_stored() {
        let dir = TempDir::new().unwrap();
        let store = FsBundleStore::new(dir.path());
        let bundle = PatchBundle::new(BugId::new("B"), b"original".to_vec(), "l");
        let location = store.put(&bundle).await.unwrap();

        std::fs::write(dir.path().join(&location), b"tampered").unwrap();
        let loaded = store.get(&location).await.unwrap();
        assert!(!loaded.is_intact());
    }

    #[tokio::test]
    async fn test_escaping_locations_are_refused() {
        let dir = TempDir::new().unwrap();
        let store = FsBundleStore::new(dir.path());
        for location in ["../outside.diff", "/etc/passwd"] {
            assert!(matches!(
                store.get(location).await,
                Err(PatchError::Store(_))
            ));
        }
    }
}
