use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Position
// ─────────────────────────────────────────────

/// Layout position of a node. `z` is optional; a missing `z` is treated as
/// `0.0` by every distance computation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Euclidean distance over (x, y, z), missing `z` on either side = 0.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z.unwrap_or(0.0) - other.z.unwrap_or(0.0);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

// ─────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────

/// A vertex of the spin network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique within a [`SpinNetwork`](crate::SpinNetwork) snapshot.
    pub id: String,

    #[serde(default)]
    pub position: Position,

    /// Opaque intertwiner label carried through from the domain.
    #[serde(default)]
    pub intertwiner: i64,

    /// Arbitrary key→value properties.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            intertwiner: 0,
            properties: HashMap::new(),
        }
    }

    pub fn with_intertwiner(mut self, intertwiner: i64) -> Self {
        self.intertwiner = intertwiner;
        self
    }
}

// ─────────────────────────────────────────────
// Edge
// ─────────────────────────────────────────────

/// A spin-labelled link between two nodes.
///
/// Direction is only a labelling convention: every operator built from the
/// network treats edges as undirected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,

    /// Physical spin label `j`, typically a non-negative half-integer.
    /// Not validated numerically.
    pub spin: f64,

    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        spin: f64,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            spin,
            properties: HashMap::new(),
        }
    }

    /// True if `node_id` is either endpoint.
    #[inline]
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    /// The endpoint opposite to `node_id`, if `node_id` is an endpoint.
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_id == node_id {
            Some(&self.target_id)
        } else if self.target_id == node_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

// ─────────────────────────────────────────────
// GraphData — wire shape
// ─────────────────────────────────────────────

/// Serialized form of a network: the node and edge arrays, verbatim.
/// Adjacency and incidence are derived and never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}
