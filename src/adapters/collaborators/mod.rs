//! Verifier and patch generator adapters.

pub mod generator;
pub mod verifier;

pub use generator::{FilePatchGenerator, StaticPatchGenerator};
pub use verifier::{CommandVerifier, ScriptedVerifier};
