//! Backlog file loading.
//!
//! A backlog is a YAML (or JSON) document listing the bugs to schedule:
//!
//! ```yaml
//! bugs:
//!   - id: BUG-1
//!     file: src/parser.rs
//!     description: panics on empty input
//!     verdicts: [fail, pass]   # optional scripted verification answers
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::adapters::ScriptedVerifier;
use crate::domain::models::{BugId, BugTask, Verdict};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogEntry {
    pub id: String,
    pub file: String,
    #[serde(default)]
    pub description: String,
    /// Answers handed out in order when no verifier command is configured.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<Verdict>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlog {
    pub bugs: Vec<BacklogEntry>,
}

impl Backlog {
    pub fn parse(text: &str) -> Result<Self> {
        let backlog: Self = serde_yaml::from_str(text).context("Malformed backlog")?;
        backlog.validate()?;
        Ok(backlog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read backlog {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid backlog {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.bugs.is_empty() {
            bail!("backlog lists no bugs");
        }
        let mut seen = HashSet::new();
        for entry in &self.bugs {
            if entry.id.trim().is_empty() {
                bail!("bug id cannot be empty");
            }
            if !seen.insert(entry.id.as_str()) {
                bail!("duplicate bug id: {}", entry.id);
            }
        }
        Ok(())
    }

    pub fn tasks(&self) -> Vec<BugTask> {
        self.bugs
            .iter()
            .map(|entry| BugTask::new(entry.id.as_str(), &entry.file, &entry.description))
            .collect()
    }

    /// Verifier answering from the entries' `verdicts`; unscripted bugs pass.
    pub fn scripted_verifier(&self) -> ScriptedVerifier {
        self.bugs
            .iter()
            .filter(|entry| !entry.verdicts.is_empty())
            .fold(ScriptedVerifier::default(), |verifier, entry| {
                verifier.with_script(BugId::new(&entry.id), &entry.verdicts)
            })
    }
}
