use std::collections::HashMap;

use crate::model::Edge;

// ─────────────────────────────────────────────
// AdjEntry
// ─────────────────────────────────────────────

/// One entry in the adjacency list: (edge_id, neighbor_id).
#[derive(Debug, Clone, PartialEq)]
pub struct AdjEntry {
    pub edge_id:     String,
    pub neighbor_id: String,
}

// ─────────────────────────────────────────────
// AdjacencyIndex
// ─────────────────────────────────────────────

/// Undirected adjacency + incidence index derived from an edge list.
///
/// Owned by exactly one [`SpinNetwork`](crate::SpinNetwork) snapshot and
/// rebuilt whenever that snapshot is derived, so it can never drift from
/// the node/edge sets it describes.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyIndex {
    /// node_id → [(edge_id, neighbor_id)], in edge insertion order.
    entries: HashMap<String, Vec<AdjEntry>>,
}

impl AdjacencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a full edge list. Node ids without edges get no entry.
    pub fn build<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut index = Self::new();
        for edge in edges {
            index.add_edge(edge);
        }
        index
    }

    // ── Mutations (construction only) ──────────────

    fn add_edge(&mut self, edge: &Edge) {
        self.entries
            .entry(edge.source_id.clone())
            .or_default()
            .push(AdjEntry {
                edge_id:     edge.id.clone(),
                neighbor_id: edge.target_id.clone(),
            });

        if edge.source_id != edge.target_id {
            self.entries
                .entry(edge.target_id.clone())
                .or_default()
                .push(AdjEntry {
                    edge_id:     edge.id.clone(),
                    neighbor_id: edge.source_id.clone(),
                });
        }
    }

    // ── Queries ────────────────────────────────────

    /// Raw entries incident on `node_id`.
    pub fn entries(&self, node_id: &str) -> &[AdjEntry] {
        self.entries.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Neighbor ids, deduplicated, in first-seen order.
    pub fn neighbors(&self, node_id: &str) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for e in self.entries(node_id) {
            if !result.contains(&e.neighbor_id) {
                result.push(e.neighbor_id.clone());
            }
        }
        result
    }

    /// Ids of every edge incident on `node_id`.
    pub fn incident_edges(&self, node_id: &str) -> Vec<String> {
        self.entries(node_id).iter().map(|e| e.edge_id.clone()).collect()
    }

    /// Number of incident edges (a self-loop counts once).
    #[inline]
    pub fn degree(&self, node_id: &str) -> usize {
        self.entries(node_id).len()
    }
}
