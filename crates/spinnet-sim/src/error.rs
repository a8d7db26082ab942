use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("simulation not initialized")]
    NotInitialized,

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("unknown {kind}: {value}")]
    UnknownEnumValue { kind: &'static str, value: String },

    #[error("Validation errors:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("diffusion error: {0}")]
    Diffusion(#[from] spinnet_diffusion::DiffusionError),

    #[error("graph error: {0}")]
    Graph(#[from] spinnet_graph::GraphError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
