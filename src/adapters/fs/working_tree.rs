//! Working tree that applies replacement patches to plain files.
//!
//! A replacement patch is a JSON document listing whole-file contents:
//!
//! ```json
//! { "files": [ { "path": "src/lib.rs", "before": "old", "after": "new" } ] }
//! ```
//!
//! Contents that are not valid UTF-8 are written as an array of byte values
//! instead of a string. `before: null` means the file must not exist yet and
//! `after: null` deletes it. Every `before` is checked before anything is written, so a
//! patch that does not match the tree changes nothing. Writes go through a
//! temporary file and a rename; if a later write fails the files already
//! written are restored.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{WorkingTree, WorkingTreeError};

/// Exact contents of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContentsRepr", into = "ContentsRepr")]
pub struct FileContents(Vec<u8>);

impl FileContents {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for FileContents {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Text when the bytes are UTF-8, a byte array otherwise.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ContentsRepr {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<ContentsRepr> for FileContents {
    fn from(repr: ContentsRepr) -> Self {
        match repr {
            ContentsRepr::Text(text) => Self(text.into_bytes()),
            ContentsRepr::Bytes(bytes) => Self(bytes),
        }
    }
}

impl From<FileContents> for ContentsRepr {
    fn from(contents: FileContents) -> Self {
        match String::from_utf8(contents.0) {
            Ok(text) => Self::Text(text),
            Err(err) => Self::Bytes(err.into_bytes()),
        }
    }
}

/// One file in a replacement patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReplacement {
    pub path: String,
    pub before: Option<FileContents>,
    pub after: Option<FileContents>,
}

/// Whole-file replacement patch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplacementPatch {
    pub files: Vec<FileReplacement>,
}

impl ReplacementPatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn replace(
        self,
        path: impl Into<String>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Self {
        self.replace_bytes(path, before.map(str::as_bytes), after.map(str::as_bytes))
    }

    #[must_use]
    pub fn replace_bytes(
        mut self,
        path: impl Into<String>,
        before: Option<&[u8]>,
        after: Option<&[u8]>,
    ) -> Self {
        self.files.push(FileReplacement {
            path: path.into(),
            before: before.map(FileContents::from),
            after: after.map(FileContents::from),
        });
        self
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WorkingTreeError> {
        serde_json::from_slice(bytes).map_err(|e| WorkingTreeError::Malformed(e.to_string()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Strings, byte arrays and options always serialize
        serde_json::to_vec_pretty(self).unwrap_or_default()
    }

    /// The patch that undoes this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            files: self
                .files
                .iter()
                .rev()
                .map(|f| FileReplacement {
                    path: f.path.clone(),
                    before: f.after.clone(),
                    after: f.before.clone(),
                })
                .collect(),
        }
    }
}

/// Plain directory of files.
pub struct FsWorkingTree {
    root: PathBuf,
}

impl FsWorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, WorkingTreeError> {
        let relative = Path::new(path);
        let contained = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(WorkingTreeError::Malformed(format!(
                "path {path} is not inside the working tree"
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn apply_patch(&self, patch: &ReplacementPatch) -> Result<(), WorkingTreeError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(patch.files.len());
        for file in &patch.files {
            if !seen.insert(file.path.as_str()) {
                return Err(WorkingTreeError::Malformed(format!(
                    "path {} listed twice",
                    file.path
                )));
            }
            targets.push((self.resolve(&file.path)?, file));
        }

        for (path, file) in &targets {
            let current = read_optional(path).await?;
            if current.as_deref() != file.before.as_ref().map(FileContents::as_bytes) {
                return Err(WorkingTreeError::Rejected(format!(
                    "{} does not match the expected contents",
                    file.path
                )));
            }
        }

        let mut written: Vec<(&Path, Option<&[u8]>)> = Vec::with_capacity(targets.len());
        for (path, file) in &targets {
            let after = file.after.as_ref().map(FileContents::as_bytes);
            if let Err(err) = write_optional(path, after).await {
                warn!(path = %file.path, error = %err, "write failed, restoring tree");
                for (restored, original) in written.into_iter().rev() {
                    if let Err(restore_err) = write_optional(restored, original).await {
                        warn!(path = %restored.display(), error = %restore_err, "restore failed");
                    }
                }
                return Err(err.into());
            }
            written.push((path.as_path(), file.before.as_ref().map(FileContents::as_bytes)));
        }

        debug!(files = targets.len(), root = %self.root.display(), "replacement patch applied");
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, WorkingTreeError> {
    match fs::read(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn write_optional(path: &Path, contents: Option<&[u8]>) -> std::io::Result<()> {
    let Some(contents) = contents else {
        return match fs::remove_file(path).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        };
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!("fixloop-{}", Uuid::new_v4().simple()));
    fs::write(&tmp, contents).await?;
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}

#[async_trait]
impl WorkingTree for FsWorkingTree {
    async fn apply(&self, diff: &[u8]) -> Result<(), WorkingTreeError> {
        self.apply_patch(&ReplacementPatch::parse(diff)?).await
    }

    async fn revert(&self, diff: &[u8]) -> Result<(), WorkingTreeError> {
        self.apply_patch(&ReplacementPatch::parse(diff)?.inverse())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> (TempDir, FsWorkingTree) {
        let dir = TempDir::new().unwrap();
        let tree = FsWorkingTree::new(dir.path());
        (dir, tree)
    }

    #[tokio::test]
    async fn test_apply_and_revert_restore_bytes() {
        let (dir, tree) = tree();
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        let patch = ReplacementPatch::new()
            .replace("a.txt", Some("one\n"), Some("two\n"))
            .replace("new/b.txt", None, Some("created\n"));

        tree.apply(&patch.to_bytes()).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "two\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("new/b.txt")).unwrap(),
            "created\n"
        );

        tree.revert(&patch.to_bytes()).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\n");
        assert!(!dir.path().join("new/b.txt").exists());
    }

    #[tokio::test]
    async fn test_mismatch_changes_nothing() {
        let (dir, tree) = tree();
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "drifted\n").unwrap();
        let patch = ReplacementPatch::new()
            .replace("a.txt", Some("one\n"), Some("two\n"))
            .replace("b.txt", Some("expected\n"), Some("three\n"));

        let err = tree.apply(&patch.to_bytes()).await.unwrap_err();
        assert!(matches!(err, WorkingTreeError::Rejected(_)));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\n");
    }

    #[tokio::test]
    async fn test_revert_of_unapplied_patch_is_rejected() {
        let (dir, tree) = tree();
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        let patch = ReplacementPatch::new().replace("a.txt", Some("one\n"), Some("two\n"));
        assert!(matches!(
            tree.revert(&patch.to_bytes()).await,
            Err(WorkingTreeError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_escaping_and_malformed_patches() {
        let (_dir, tree) = tree();
        let escaping = ReplacementPatch::new().replace("../x", None, Some("x"));
        assert!(matches!(
            tree.apply(&escaping.to_bytes()).await,
            Err(WorkingTreeError::Malformed(_))
        ));
        let duplicated = ReplacementPatch::new()
            .replace("x", None, Some("1"))
            .replace("x", None, Some("2"));
        assert!(matches!(
            tree.apply(&duplicated.to_bytes()).await,
            Err(WorkingTreeError::Malformed(_))
        ));
        assert!(matches!(
            tree.apply(b"not json").await,
            Err(WorkingTreeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_binary_contents_round_trip() {
        let (dir, tree) = tree();
        let original = [0xff, 0xfe, 0x00, b'a', 0xc3];
        std::fs::write(dir.path().join("blob.bin"), original).unwrap();
        let patch = ReplacementPatch::new().replace_bytes(
            "blob.bin",
            Some(&original[..]),
            Some(&[0x80, 0x81][..]),
        );

        let bytes = patch.to_bytes();
        assert_eq!(ReplacementPatch::parse(&bytes).unwrap(), patch);

        tree.apply(&bytes).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("blob.bin")).unwrap(), vec![0x80, 0x81]);
        tree.revert(&bytes).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("blob.bin")).unwrap(), original);
    }

    #[test]
    fn test_text_contents_stay_readable() {
        let patch = ReplacementPatch::new().replace("a.txt", Some("one\n"), None);
        let json: serde_json::Value = serde_json::from_slice(&patch.to_bytes()).unwrap();
        assert_eq!(json["files"][0]["before"], "one\n");
        assert!(json["files"][0]["after"].is_null());

        let raw = br#"{"files": [{"path": "b", "before": [104, 105], "after": "x"}]}"#;
        let parsed = ReplacementPatch::parse(raw).unwrap();
        assert_eq!(parsed.files[0].before.as_ref().unwrap().as_bytes(), b"hi");
    }
}
