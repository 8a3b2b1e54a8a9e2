//! Simulation Errors

use crate::manager::ManagerState;
use bsdf::CacheError;
use scene::SceneError;
use thiserror::Error;

/// Errors surfaced to callers of the simulation manager. Per-ray failures
/// are recorded on the ray's result instead.
#[derive(Error, Debug)]
pub enum SimulError {
    /// A scene or BSDF file could not be loaded.
    #[error("load failure. {0}")]
    LoadFailure(#[from] SceneError),

    /// A non-blocking enqueue found the queue at capacity. The first
    /// `admitted` rays of the bundle were queued; retry with the rest.
    #[error("ray queue full after admitting {admitted} rays")]
    QueueFull { admitted: usize },

    /// The configuration cannot be used.
    #[error("invalid configuration. {0}")]
    InvalidConfig(String),

    /// The manager has been cleaned up.
    #[error("simulation manager is stopped")]
    ManagerStopped,

    /// The operation is not legal in the current state.
    #[error("'{op}' is not allowed while {state}")]
    InvalidState { op: &'static str, state: ManagerState },

    /// A single ray could not be evaluated.
    #[error("trace failure. {0}")]
    TraceFailure(String),

    /// A BSDF failed to load.
    #[error(transparent)]
    CacheLoadFailure(#[from] CacheError),

    /// A modifier registration was rejected.
    #[error("invalid modifier '{name}'. {reason}")]
    InvalidModifier { name: String, reason: String },

    /// A bin expression or parameter list could not be compiled.
    #[error("expression error. {0}")]
    Expression(String),

    /// Writing contribution output failed.
    #[error("output error. {0}")]
    Output(#[from] std::io::Error),
}
