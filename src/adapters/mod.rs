//! Adapters implementing the domain ports.

pub mod collaborators;
pub mod fs;
pub mod git;
pub mod memory;
pub mod sqlite;

pub use collaborators::{
    CommandVerifier, FilePatchGenerator, ScriptedVerifier, StaticPatchGenerator,
};
pub use fs::{FsBundleStore, FsWorkingTree, ReplacementPatch};
pub use git::GitWorkingTree;
pub use memory::{InMemoryBundleStore, InMemoryPatchLedger, InMemoryWorkingTree};
pub use sqlite::SqlitePatchLedger;
