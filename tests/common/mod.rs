//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

#![allow(dead_code)]

use std::sync::Arc;

use fixloop::adapters::{InMemoryBundleStore, InMemoryPatchLedger, InMemoryWorkingTree};
use fixloop::domain::models::{BugTask, ExecutorConfig};
use fixloop::services::RollbackManager;

/// Executor settings with millisecond backoff so retries do not slow tests.
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        ..ExecutorConfig::default()
    }
}

/// `count` bugs named `BUG-0`, `BUG-1`, ...
pub fn backlog(count: usize) -> Vec<BugTask> {
    (0..count)
        .map(|i| BugTask::new(format!("BUG-{i}"), format!("src/module_{i}.rs"), "fails"))
        .collect()
}

/// Rollback manager over in-memory adapters, plus a handle on its tree.
pub fn in_memory_rollback() -> (Arc<RollbackManager>, Arc<InMemoryWorkingTree>) {
    let tree = Arc::new(InMemoryWorkingTree::new());
    let manager = RollbackManager::new(
        Arc::new(InMemoryPatchLedger::new()),
        Arc::new(InMemoryBundleStore::new()),
        Arc::clone(&tree) as Arc<dyn fixloop::domain::ports::WorkingTree>,
    );
    (Arc::new(manager), tree)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
