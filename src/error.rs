//! Turn-level error taxonomy.
//!
//! Gate and execution faults abort the turn before (respectively after) the
//! first transcript mutation; step updates are applied all-or-nothing, so a
//! failed step never leaves a half-written agent entry behind. Authorization
//! faults are not errors at this level - they convert into an
//! `authorization_required` suspension inside the invocation step.

use thiserror::Error;

use crate::collaborators::{ProviderFault, ReasoningFault};

#[derive(Debug, Error)]
pub enum TurnError {
    /// The catalog gate's reasoning call failed. Safe to retry by
    /// re-issuing the start operation.
    #[error("catalog gate failed: {0}")]
    Gate(#[source] ReasoningFault),

    /// The execution step's reasoning call failed.
    #[error("execution step failed: {0}")]
    Execution(#[source] ReasoningFault),

    /// Non-authorization provider fault. The core performs no retry; any
    /// retry is a caller-initiated new request.
    #[error("action provider fault: {0}")]
    Provider(#[source] ProviderFault),

    /// Instruction template failed to render.
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),

    /// Checkpoint store failure while persisting or loading state.
    #[error("checkpoint store failure: {0}")]
    Checkpoint(#[source] anyhow::Error),

    /// Resume addressed a thread with no persisted state.
    #[error("unknown thread `{0}`")]
    UnknownThread(String),
}
