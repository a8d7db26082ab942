use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiffusionError {
    #[error("node not found in state vector: {0}")]
    NotFound(String),

    #[error("size mismatch: expected {expected}, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("model not initialized")]
    NotInitialized,

    #[error("unknown diffusion type: {0}")]
    UnknownDiffusionType(String),

    #[error("invalid step: {0}")]
    InvalidStep(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    #[error("graph error: {0}")]
    Graph(#[from] spinnet_graph::GraphError),
}
