//! Domain layer for fixloop
//!
//! Phase state, engine and monitor state, patch bundles, the error taxonomy
//! and the ports collaborators plug into.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    CollaboratorError, ExecutorError, InvariantViolation, PatchError, PatchResult,
    SchedulerError, SchedulerResult,
};
