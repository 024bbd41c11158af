//! Filesystem adapters.

pub mod bundle_store;
pub mod working_tree;

pub use bundle_store::FsBundleStore;
pub use working_tree::{FileContents, FileReplacement, FsWorkingTree, ReplacementPatch};
