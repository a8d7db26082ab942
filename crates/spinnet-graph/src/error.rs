use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("edge {edge_id} references missing node {node_id}")]
    ReferenceNotFound { edge_id: String, node_id: String },

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("unknown graph template: {0}")]
    UnknownTemplate(String),

    #[error("invalid weight function registration: {0}")]
    InvalidWeightFunction(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
