//! Backlog items handed to the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a bug, as supplied by the backlog loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BugId(String);

impl BugId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form usable as a single path component.
    ///
    /// Anything outside `[A-Za-z0-9._-]` is replaced with `_`.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.chars().all(|c| c == '.') {
            // "", "." and ".." would resolve outside the bug's own directory
            format!("_{stem}")
        } else {
            stem
        }
    }
}

impl fmt::Display for BugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BugId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for BugId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One bug waiting in the backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugTask {
    pub bug_id: BugId,
    /// File the bug report points at
    pub file_path: String,
    pub description: String,
}

impl BugTask {
    pub fn new(
        bug_id: impl Into<BugId>,
        file_path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            bug_id: bug_id.into(),
            file_path: file_path.into(),
            description: description.into(),
        }
    }
}
