//! Verifier implementations.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::domain::errors::CollaboratorError;
use crate::domain::models::{BugId, Verdict};
use crate::domain::ports::Verifier;

/// Answers from per-bug verdict queues.
///
/// Bugs without a script, or whose script has run out, get the default
/// verdict.
#[derive(Debug)]
pub struct ScriptedVerifier {
    scripts: Mutex<HashMap<BugId, VecDeque<Verdict>>>,
    default: Verdict,
    calls: Mutex<Vec<(BugId, u8)>>,
}

impl Default for ScriptedVerifier {
    fn default() -> Self {
        Self::new(Verdict::Pass)
    }
}

impl ScriptedVerifier {
    pub fn new(default: Verdict) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue verdicts for one bug.
    #[must_use]
    pub fn with_script(self, bug_id: impl Into<BugId>, verdicts: &[Verdict]) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts
                .entry(bug_id.into())
                .or_default()
                .extend(verdicts.iter().copied());
        }
        self
    }

    /// Every `(bug_id, attempt)` this verifier was asked about, in order.
    pub fn calls(&self) -> Vec<(BugId, u8)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, bug_id: &BugId, attempt: u8) -> Result<Verdict, CollaboratorError> {
        self.calls
            .lock()
            .map_err(|_| poisoned(bug_id))?
            .push((bug_id.clone(), attempt));
        let verdict = self
            .scripts
            .lock()
            .map_err(|_| poisoned(bug_id))?
            .get_mut(bug_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.default);
        Ok(verdict)
    }
}

fn poisoned(bug_id: &BugId) -> CollaboratorError {
    CollaboratorError::Verifier {
        bug_id: bug_id.clone(),
        reason: "script lock poisoned".to_string(),
    }
}

/// Runs a shell command; exit status 0 passes.
///
/// The command sees `FIXLOOP_BUG_ID` and `FIXLOOP_ATTEMPT` in its
/// environment and runs from the working tree root. A command still running
/// after the timeout is killed.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    command: String,
    workdir: PathBuf,
    timeout: Duration,
}

impl CommandVerifier {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
            timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    #[instrument(skip(self), fields(command = %self.command))]
    async fn verify(&self, bug_id: &BugId, attempt: u8) -> Result<Verdict, CollaboratorError> {
        let run = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workdir)
            .env("FIXLOOP_BUG_ID", bug_id.as_str())
            .env("FIXLOOP_ATTEMPT", attempt.to_string())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| CollaboratorError::Verifier {
                bug_id: bug_id.clone(),
                reason: format!("`{}` timed out after {:?}", self.command, self.timeout),
            })?
            .map_err(|e| CollaboratorError::Verifier {
                bug_id: bug_id.clone(),
                reason: format!("failed to run `{}`: {e}", self.command),
            })?;

        let verdict = if output.status.success() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        debug!(bug_id = %bug_id, attempt, status = %output.status, ?verdict, "verification finished");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_verifier_pops_then_defaults() {
        let verifier = ScriptedVerifier::default().with_script("B", &[Verdict::Fail]);
        let bug = BugId::new("B");
        assert_eq!(verifier.verify(&bug, 0).await.unwrap(), Verdict::Fail);
        assert_eq!(verifier.verify(&bug, 1).await.unwrap(), Verdict::Pass);
        assert_eq!(
            verifier.verify(&BugId::new("other"), 0).await.unwrap(),
            Verdict::Pass
        );
        assert_eq!(verifier.calls().len(), 3);
        assert_eq!(verifier.calls()[1], (bug, 1));
    }

    #[tokio::test]
    async fn test_command_verifier_maps_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let bug = BugId::new("BUG-9");

        let pass = CommandVerifier::new("test \"$FIXLOOP_BUG_ID\" = BUG-9", dir.path());
        assert_eq!(pass.verify(&bug, 0).await.unwrap(), Verdict::Pass);

        let fail = CommandVerifier::new("test \"$FIXLOOP_ATTEMPT\" = 1", dir.path());
        assert_eq!(fail.verify(&bug, 0).await.unwrap(), Verdict::Fail);
    }

    #[tokio::test]
    async fn test_command_verifier_reports_spawn_failure() {
        let verifier = CommandVerifier::new("true", "/definitely/not/a/dir");
        assert!(matches!(
            verifier.verify(&BugId::new("B"), 0).await,
            Err(CollaboratorError::Verifier { .. })
        ));
    }

    #[tokio::test]
    async fn test_command_verifier_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let verifier =
            CommandVerifier::new("sleep 5", dir.path()).with_timeout(Duration::from_millis(50));
        let err = verifier.verify(&BugId::new("B"), 0).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
