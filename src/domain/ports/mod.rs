//! Port trait definitions (Hexagonal Architecture)
//!
//! Collaborator seams the scheduler depends on:
//! - Verifier: pass/fail judgement for a verification attempt
//! - PatchGenerator: patch content for a bug entering `Patch`
//! - PatchLedger: durable bug → bundle index
//! - BundleStore: storage for patch bytes and manifests
//! - WorkingTree: atomic application and reversal of patches

pub mod bundle_store;
pub mod patch_generator;
pub mod patch_ledger;
pub mod verifier;
pub mod working_tree;

pub use bundle_store::BundleStore;
pub use patch_generator::{PatchGenerator, PatchRequest};
pub use patch_ledger::PatchLedger;
pub use verifier::Verifier;
pub use working_tree::{WorkingTree, WorkingTreeError};
