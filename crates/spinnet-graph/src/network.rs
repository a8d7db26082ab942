//! Immutable spin-network snapshots.
//!
//! Every mutation (`add_node`, `remove_node`, `add_edge`, `remove_edge`)
//! borrows `self` and returns a fresh [`SpinNetwork`]; the receiver is left
//! untouched and stays valid. Derived indexes are rebuilt per snapshot so
//! no adjacency state is ever shared between snapshots.
//!
//! ## Matrix conventions
//!
//! Rows and columns follow node insertion order ([`SpinNetwork::node_ids`]).
//!
//! | Matrix                        | Entry                                 |
//! |-------------------------------|---------------------------------------|
//! | adjacency                     | `A[s][t] = A[t][s] = 1` per edge      |
//! | weighted adjacency            | `A[s][t] += w`, `A[t][s] += w`        |
//! | Laplacian `L = D − A_w`       | `L[s][t] −= w`, `L[s][s] += w`, …     |

use std::collections::HashMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::adjacency::AdjacencyIndex;
use crate::error::GraphError;
use crate::model::{Edge, GraphData, Node};
use crate::weight::WeightFunction;

#[derive(Debug, Clone, Default)]
pub struct SpinNetwork {
    nodes:      Vec<Node>,
    edges:      Vec<Edge>,
    node_index: HashMap<String, usize>,
    edge_index: HashMap<String, usize>,
    adjacency:  AdjacencyIndex,
}

impl SpinNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from raw parts, validating id uniqueness and edge
    /// references.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, GraphError> {
        let mut node_index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node_index.insert(node.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateId { kind: "node", id: node.id.clone() });
            }
        }

        let mut edge_index = HashMap::with_capacity(edges.len());
        for (i, edge) in edges.iter().enumerate() {
            for endpoint in [&edge.source_id, &edge.target_id] {
                if !node_index.contains_key(endpoint) {
                    return Err(GraphError::ReferenceNotFound {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
            if edge_index.insert(edge.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateId { kind: "edge", id: edge.id.clone() });
            }
        }

        let adjacency = AdjacencyIndex::build(&edges);
        Ok(Self { nodes, edges, node_index, edge_index, adjacency })
    }

    // ── Mutations (persistent) ─────────────────────

    /// New snapshot with `node` appended. Fails on a duplicate id.
    pub fn add_node(&self, node: Node) -> Result<Self, GraphError> {
        if self.node_index.contains_key(&node.id) {
            return Err(GraphError::DuplicateId { kind: "node", id: node.id });
        }
        let mut nodes = self.nodes.clone();
        nodes.push(node);
        Ok(self.derive(nodes, self.edges.clone()))
    }

    /// New snapshot without `node_id` and every edge incident on it.
    /// Removing an unknown id returns an equivalent snapshot.
    pub fn remove_node(&self, node_id: &str) -> Self {
        if !self.node_index.contains_key(node_id) {
            return self.clone();
        }
        let nodes = self.nodes.iter().filter(|n| n.id != node_id).cloned().collect();
        let edges = self.edges.iter().filter(|e| !e.touches(node_id)).cloned().collect();
        self.derive(nodes, edges)
    }

    /// New snapshot with `edge` appended.
    ///
    /// Fails with [`GraphError::ReferenceNotFound`] if either endpoint is
    /// missing, and with [`GraphError::DuplicateId`] on a reused edge id.
    pub fn add_edge(&self, edge: Edge) -> Result<Self, GraphError> {
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !self.node_index.contains_key(endpoint) {
                return Err(GraphError::ReferenceNotFound {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
        if self.edge_index.contains_key(&edge.id) {
            return Err(GraphError::DuplicateId { kind: "edge", id: edge.id });
        }
        let mut edges = self.edges.clone();
        edges.push(edge);
        Ok(self.derive(self.nodes.clone(), edges))
    }

    /// New snapshot without `edge_id`. Unknown ids are a no-op.
    pub fn remove_edge(&self, edge_id: &str) -> Self {
        if !self.edge_index.contains_key(edge_id) {
            return self.clone();
        }
        let edges = self.edges.iter().filter(|e| e.id != edge_id).cloned().collect();
        self.derive(self.nodes.clone(), edges)
    }

    /// Rebuild indexes for parts already known to be consistent.
    fn derive(&self, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let node_index = nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect();
        let edge_index = edges.iter().enumerate().map(|(i, e)| (e.id.clone(), i)).collect();
        let adjacency = AdjacencyIndex::build(&edges);
        Self { nodes, edges, node_index, edge_index, adjacency }
    }

    // ── Queries ────────────────────────────────────

    #[inline] pub fn nodes(&self) -> &[Node] { &self.nodes }
    #[inline] pub fn edges(&self) -> &[Edge] { &self.edges }
    #[inline] pub fn node_count(&self) -> usize { self.nodes.len() }
    #[inline] pub fn edge_count(&self) -> usize { self.edges.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Node ids in enumeration (insertion) order; this is the row order of
    /// every matrix built from the network.
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.node_index.get(node_id).map(|&i| &self.nodes[i])
    }

    pub fn edge(&self, edge_id: &str) -> Option<&Edge> {
        self.edge_index.get(edge_id).map(|&i| &self.edges[i])
    }

    /// Like [`node`](Self::node) but absence is an error.
    pub fn require_node(&self, node_id: &str) -> Result<&Node, GraphError> {
        self.node(node_id).ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))
    }

    pub fn require_edge(&self, edge_id: &str) -> Result<&Edge, GraphError> {
        self.edge(edge_id).ok_or_else(|| GraphError::EdgeNotFound(edge_id.to_string()))
    }

    #[inline]
    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node_index.contains_key(node_id)
    }

    /// Dense index of `node_id` in enumeration order.
    #[inline]
    pub fn index_of(&self, node_id: &str) -> Option<usize> {
        self.node_index.get(node_id).copied()
    }

    /// Nodes sharing an edge with `node_id`.
    pub fn adjacent_nodes(&self, node_id: &str) -> Vec<&Node> {
        self.adjacency
            .neighbors(node_id)
            .iter()
            .filter_map(|id| self.node(id))
            .collect()
    }

    /// Edges incident on `node_id`.
    pub fn connected_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.adjacency
            .incident_edges(node_id)
            .iter()
            .filter_map(|id| self.edge(id))
            .collect()
    }

    #[inline]
    pub fn degree(&self, node_id: &str) -> usize {
        self.adjacency.degree(node_id)
    }

    pub fn neighbors(&self, node_id: &str) -> Vec<String> {
        self.adjacency.neighbors(node_id)
    }

    pub fn adjacency(&self) -> &AdjacencyIndex {
        &self.adjacency
    }

    // ── Matrices ───────────────────────────────────

    /// Unweighted symmetric 0/1 adjacency matrix.
    pub fn to_adjacency_matrix(&self) -> DMatrix<f64> {
        let n = self.nodes.len();
        let mut a = DMatrix::zeros(n, n);
        for (s, t) in self.edge_endpoints() {
            a[(s, t)] = 1.0;
            a[(t, s)] = 1.0;
        }
        a
    }

    /// Symmetric adjacency with `weight(edge)` accumulated per edge.
    pub fn to_weighted_adjacency_matrix(&self, weight: &WeightFunction) -> DMatrix<f64> {
        let n = self.nodes.len();
        let mut a = DMatrix::zeros(n, n);
        for (edge, (s, t)) in self.edges.iter().zip(self.edge_endpoints()) {
            let w = weight.weight(edge);
            a[(s, t)] += w;
            if s != t {
                a[(t, s)] += w;
            }
        }
        a
    }

    /// Combinatorial Laplacian `L = D − A_w`.
    ///
    /// Every row sums to zero; isolated nodes get a zero row and column.
    pub fn to_laplacian_matrix(&self, weight: &WeightFunction) -> DMatrix<f64> {
        let n = self.nodes.len();
        let mut l = DMatrix::zeros(n, n);
        for (edge, (s, t)) in self.edges.iter().zip(self.edge_endpoints()) {
            let w = weight.weight(edge);
            l[(s, t)] -= w;
            l[(t, s)] -= w;
            l[(s, s)] += w;
            l[(t, t)] += w;
        }
        l
    }

    /// Dense (source, target) indices for each edge, in edge order.
    fn edge_endpoints(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        // Snapshot invariant: every endpoint is present in node_index.
        self.edges.iter().map(move |e| {
            (self.node_index[&e.source_id], self.node_index[&e.target_id])
        })
    }

    // ── Serialization ──────────────────────────────

    pub fn to_graph_data(&self) -> GraphData {
        GraphData { nodes: self.nodes.clone(), edges: self.edges.clone() }
    }

    pub fn from_graph_data(data: GraphData) -> Result<Self, GraphError> {
        Self::from_parts(data.nodes, data.edges)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string(&self.to_graph_data())?)
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let data: GraphData = serde_json::from_str(json)?;
        Self::from_graph_data(data)
    }
}

impl Serialize for SpinNetwork {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_graph_data().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SpinNetwork {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = GraphData::deserialize(deserializer)?;
        Self::from_graph_data(data).map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
