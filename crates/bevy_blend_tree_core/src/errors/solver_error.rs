use thiserror::Error;

/// Reasons a spring solver can fail to initialize. These are configuration errors: the caller
/// is expected to skip the affected simulation and continue.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverInitError {
    #[error("[{node}] simulated object {object:?} has no joints that exist in the skeleton")]
    EmptyParticleSet { node: String, object: String },
    #[error("[{node}] simulated object {object:?} references joint {joint:?} more than once")]
    DuplicateJoint {
        node: String,
        object: String,
        joint: String,
    },
}
