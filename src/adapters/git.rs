//! Working tree backed by `git apply`.
//!
//! Patches are unified diffs. Each application is checked with
//! `git apply --check` first; `git apply` itself is all-or-nothing, so a
//! rejected diff leaves the tree untouched.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::domain::ports::{WorkingTree, WorkingTreeError};

pub struct GitWorkingTree {
    root: PathBuf,
}

impl GitWorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn git_apply(&self, diff: &[u8], extra: &[&str]) -> Result<(), WorkingTreeError> {
        let mut child = Command::new("git")
            .arg("apply")
            .args(extra)
            .arg("-")
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(diff).await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(WorkingTreeError::Rejected(if stderr.is_empty() {
                format!("git apply exited with {}", output.status)
            } else {
                stderr
            }))
        }
    }

    async fn check_then_apply(&self, diff: &[u8], reverse: bool) -> Result<(), WorkingTreeError> {
        if diff.is_empty() {
            return Err(WorkingTreeError::Malformed("empty diff".to_string()));
        }
        let flags: &[&str] = if reverse { &["-R"] } else { &[] };
        let check: Vec<&str> = flags.iter().copied().chain(["--check"]).collect();
        self.git_apply(diff, &check).await?;
        self.git_apply(diff, flags).await
    }
}

#[async_trait]
impl WorkingTree for GitWorkingTree {
    #[instrument(skip(self, diff), fields(root = %self.root.display(), bytes = diff.len()))]
    async fn apply(&self, diff: &[u8]) -> Result<(), WorkingTreeError> {
        self.check_then_apply(diff, false).await?;
        debug!("diff applied");
        Ok(())
    }

    #[instrument(skip(self, diff), fields(root = %self.root.display(), bytes = diff.len()))]
    async fn revert(&self, diff: &[u8]) -> Result<(), WorkingTreeError> {
        self.check_then_apply(diff, true).await?;
        debug!("diff reverted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIFF: &str = "\
--- a/greeting.txt
+++ b/greeting.txt
@@ -1 +1 @@
-hello
+goodbye
";

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_apply_and_revert_diff() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("greeting.txt");
        std::fs::write(&file, "hello\n").unwrap();
        let tree = GitWorkingTree::new(dir.path());

        tree.apply(DIFF.as_bytes()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "goodbye\n");

        assert!(matches!(
            tree.apply(DIFF.as_bytes()).await,
            Err(WorkingTreeError::Rejected(_))
        ));

        tree.revert(DIFF.as_bytes()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_empty_diff_is_malformed() {
        let tree = GitWorkingTree::new(".");
        assert!(matches!(
            tree.apply(b"").await,
            Err(WorkingTreeError::Malformed(_))
        ));
    }
}
