//! # spinnet-graph
//!
//! Spin-network graph model for the spinnet diffusion engine.
//!
//! Provides the immutable graph snapshot that every simulation runs on:
//! - [`model::Node`] / [`model::Edge`] — vertices and spin-labelled links
//! - [`network::SpinNetwork`] — persistent snapshot with adjacency, incidence
//!   and dense Laplacian construction
//! - [`weight::WeightFunction`] — spin → coupling maps (`spin`, `casimir`,
//!   `dimension`, `area`) plus a validated [`weight::WeightRegistry`]
//! - [`templates`] — line / ring / grid / random generators

pub mod adjacency;
pub mod error;
pub mod model;
pub mod network;
pub mod templates;
pub mod weight;

pub use adjacency::{AdjEntry, AdjacencyIndex};
pub use error::GraphError;
pub use model::{Edge, GraphData, Node, Position};
pub use network::SpinNetwork;
pub use templates::{
    create_grid_graph, create_line_graph, create_random_graph, create_ring_graph,
    create_template_graph, GraphTemplate, GridOptions, LineOptions, RandomOptions, RingOptions,
    SpinType, TemplateOptions,
};
pub use weight::{WeightFn, WeightFunction, WeightRegistry};
