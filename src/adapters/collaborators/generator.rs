//! Patch generator implementations.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::domain::errors::CollaboratorError;
use crate::domain::models::BugTask;
use crate::domain::ports::{PatchGenerator, PatchRequest};

/// Reads prepared patches from a directory.
///
/// For attempt `n` of bug `B` the generator looks for `B.n.patch` first and
/// falls back to `B.patch`.
#[derive(Debug, Clone)]
pub struct FilePatchGenerator {
    dir: PathBuf,
}

impl FilePatchGenerator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, task: &BugTask, attempt: u8) -> [PathBuf; 2] {
        let stem = task.bug_id.file_stem();
        [
            self.dir.join(format!("{stem}.{attempt}.patch")),
            self.dir.join(format!("{stem}.patch")),
        ]
    }
}

#[async_trait]
impl PatchGenerator for FilePatchGenerator {
    async fn generate_patch(
        &self,
        task: &BugTask,
        request: &PatchRequest,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let candidates = self.candidates(task, request.attempt);
        for path in &candidates {
            match fs::read(path).await {
                Ok(bytes) => {
                    debug!(bug_id = %task.bug_id, path = %path.display(), "patch loaded");
                    return Ok(bytes);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(CollaboratorError::PatchGeneration {
                        bug_id: task.bug_id.clone(),
                        reason: format!("reading {}: {err}", path.display()),
                    })
                }
            }
        }
        Err(CollaboratorError::PatchGeneration {
            bug_id: task.bug_id.clone(),
            reason: format!("no patch found at {}", candidates[1].display()),
        })
    }
}

/// Returns the same bytes for every request, optionally failing the first
/// few calls.
#[derive(Debug)]
pub struct StaticPatchGenerator {
    patch: Vec<u8>,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl StaticPatchGenerator {
    pub fn new(patch: impl Into<Vec<u8>>) -> Self {
        Self {
            patch: patch.into(),
            failures_left: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `failures` calls before succeeding.
    #[must_use]
    pub fn failing_first(self, failures: u32) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatchGenerator for StaticPatchGenerator {
    async fn generate_patch(
        &self,
        task: &BugTask,
        _request: &PatchRequest,
    ) -> Result<Vec<u8>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CollaboratorError::PatchGeneration {
                bug_id: task.bug_id.clone(),
                reason: "generator unavailable".to_string(),
            });
        }
        Ok(self.patch.clone())
    }
}
