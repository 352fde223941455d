//! Error kinds surfaced by the planning engine.

use thiserror::Error;

/// Errors produced by the planner and its collaborators.
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    /// Caller-supplied input is unusable (start day out of range, empty
    /// enabled crop set, malformed catalog or calendar text, ...).
    /// No partial state is left behind.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The memory monitor tripped the abort flag during a search. Soft
    /// failure; the caller may re-invoke with reduced inputs.
    #[error("memory threshold exceeded during search")]
    MemoryExceeded,

    /// Every worker faulted on the same dispatch. Individual worker
    /// faults are logged and dropped without raising this.
    #[error("worker fault: {0}")]
    WorkerFault(String),
}
