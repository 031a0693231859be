use bevy::prelude::*;
use thiserror::Error;

use crate::blend_tree::NodeIndex;

/// Possible errors that can be produced by building or evaluating a blend tree
#[non_exhaustive]
#[derive(Debug, Error, Reflect, Clone, PartialEq)]
pub enum GraphError {
    #[error("Tried to convert to incorrect data type: expected {0}, got {1}")]
    MismatchedDataType(String, String),
    #[error("Node {0:?} does not exist in this blend tree")]
    MissingNode(NodeIndex),
    #[error("Node {0:?} has no input port named {1:?}")]
    MissingInputPort(NodeIndex, String),
    #[error("Node {0:?} has no output port named {1:?}")]
    MissingOutputPort(NodeIndex, String),
    #[error("Cannot connect a {0} output to a {1} input")]
    InconsistentPortTypes(String, String),
    #[error("Connecting {0:?} to {1:?} would introduce a cycle")]
    CycleDetected(NodeIndex, NodeIndex),
    #[error("The blend tree has no root node")]
    MissingRoot,
    #[error("The blend tree must be initialized before instances can be created")]
    TreeNotInitialized,
    #[error("The graph instance was created for a different blend tree layout")]
    InstanceLayoutMismatch,
    #[error("Phase {got} was requested but {expected} was expected next")]
    PhaseOrder { expected: String, got: String },
    #[error("Unique data of node {0:?} has an unexpected type")]
    MismatchedStateType(NodeIndex),
}

pub type GraphResult<T> = Result<T, GraphError>;
