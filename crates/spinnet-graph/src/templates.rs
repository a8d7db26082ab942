//! Topology templates: line, ring, grid and random spin networks.
//!
//! Ids are 1-based: nodes are `{node_id_prefix}{i}` and edges
//! `{edge_id_prefix}{k}`. Spins are either a fixed value or drawn uniformly
//! from `[min_spin, max_spin)`; pass a `seed` for reproducible draws.

use std::collections::HashSet;
use std::f64::consts::PI;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::GraphError;
use crate::model::{Edge, Node, Position};
use crate::network::SpinNetwork;

// ─────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinType {
    #[default]
    Fixed,
    Random,
}

/// Options shared by every template.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    pub node_count:          usize,
    pub spin_type:           SpinType,
    pub fixed_spin_value:    f64,
    pub min_spin:            f64,
    pub max_spin:            f64,
    pub default_intertwiner: i64,
    pub node_id_prefix:      String,
    pub edge_id_prefix:      String,
    /// RNG seed for random spins and random topology. `None` = entropy.
    pub seed:                Option<u64>,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            node_count:          5,
            spin_type:           SpinType::Fixed,
            fixed_spin_value:    0.5,
            min_spin:            0.5,
            max_spin:            2.0,
            default_intertwiner: 2,
            node_id_prefix:      "node".into(),
            edge_id_prefix:      "edge".into(),
            seed:                None,
        }
    }
}

impl TemplateOptions {
    pub fn with_nodes(node_count: usize) -> Self {
        Self { node_count, ..Self::default() }
    }

    fn node_id(&self, one_based: usize) -> String {
        format!("{}{}", self.node_id_prefix, one_based)
    }

    fn edge_id(&self, one_based: usize) -> String {
        format!("{}{}", self.edge_id_prefix, one_based)
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn draw_spin(&self, rng: &mut StdRng) -> f64 {
        match self.spin_type {
            SpinType::Fixed => self.fixed_spin_value,
            SpinType::Random if self.max_spin > self.min_spin => {
                rng.gen_range(self.min_spin..self.max_spin)
            }
            SpinType::Random => self.min_spin,
        }
    }

    fn node(&self, one_based: usize, position: Position) -> Node {
        Node::new(self.node_id(one_based), position).with_intertwiner(self.default_intertwiner)
    }

    fn require_nodes(&self, kind: &str, min: usize) -> Result<(), GraphError> {
        if self.node_count < min {
            return Err(GraphError::InvalidTemplate(format!(
                "{kind} graph requires at least {min} nodes, got {}",
                self.node_count
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineOptions {
    pub spacing: f64,
    pub start_x: f64,
    pub start_y: f64,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self { spacing: 100.0, start_x: 0.0, start_y: 0.0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RingOptions {
    pub radius: f64,
    /// Defaults to `(radius, radius)`.
    pub center: Option<(f64, f64)>,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self { radius: 150.0, center: None }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GridOptions {
    pub spacing: f64,
    /// Explicit shape; only honoured when both are set.
    pub rows:    Option<usize>,
    pub columns: Option<usize>,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self { spacing: 80.0, rows: None, columns: None }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RandomOptions {
    pub width:            f64,
    pub height:           f64,
    /// Fraction of all possible undirected edges to aim for, in `[0, 1]`.
    pub connectivity:     f64,
    pub ensure_connected: bool,
}

impl Default for RandomOptions {
    fn default() -> Self {
        Self { width: 300.0, height: 300.0, connectivity: 0.5, ensure_connected: true }
    }
}

// ─────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────

/// Chain `node1 — node2 — … — nodeN` laid out on a horizontal line.
pub fn create_line_graph(opts: &TemplateOptions, line: LineOptions) -> Result<SpinNetwork, GraphError> {
    opts.require_nodes("line", 2)?;
    let mut rng = opts.rng();

    let nodes = (0..opts.node_count)
        .map(|i| opts.node(i + 1, Position::new(line.start_x + i as f64 * line.spacing, line.start_y)))
        .collect();

    let edges = (1..opts.node_count)
        .map(|i| Edge::new(opts.edge_id(i), opts.node_id(i), opts.node_id(i + 1), opts.draw_spin(&mut rng)))
        .collect();

    let g = SpinNetwork::from_parts(nodes, edges)?;
    debug!(target: "spinnet::graph", nodes = g.node_count(), edges = g.edge_count(), "line graph built");
    Ok(g)
}

/// Closed cycle laid out on a circle.
pub fn create_ring_graph(opts: &TemplateOptions, ring: RingOptions) -> Result<SpinNetwork, GraphError> {
    opts.require_nodes("ring", 3)?;
    let mut rng = opts.rng();
    let n = opts.node_count;
    let (cx, cy) = ring.center.unwrap_or((ring.radius, ring.radius));

    let nodes = (0..n)
        .map(|i| {
            let angle = i as f64 / n as f64 * 2.0 * PI;
            opts.node(i + 1, Position::new(cx + ring.radius * angle.cos(), cy + ring.radius * angle.sin()))
        })
        .collect();

    let edges = (0..n)
        .map(|i| {
            let next = (i + 1) % n;
            Edge::new(opts.edge_id(i + 1), opts.node_id(i + 1), opts.node_id(next + 1), opts.draw_spin(&mut rng))
        })
        .collect();

    let g = SpinNetwork::from_parts(nodes, edges)?;
    debug!(target: "spinnet::graph", nodes = g.node_count(), edges = g.edge_count(), "ring graph built");
    Ok(g)
}

/// Row-major lattice. Missing cells in the last row are simply absent.
pub fn create_grid_graph(opts: &TemplateOptions, grid: GridOptions) -> Result<SpinNetwork, GraphError> {
    opts.require_nodes("grid", 4)?;
    let mut rng = opts.rng();
    let n = opts.node_count;

    let (rows, columns) = match (grid.rows, grid.columns) {
        (Some(r), Some(c)) if r > 0 && c > 0 => (r, c),
        _ => grid_dimensions(n),
    };

    let mut nodes = Vec::with_capacity(n);
    'fill: for row in 0..rows {
        for col in 0..columns {
            if nodes.len() == n {
                break 'fill;
            }
            let idx = nodes.len() + 1;
            nodes.push(opts.node(idx, Position::new(col as f64 * grid.spacing, row as f64 * grid.spacing)));
        }
    }

    // An explicit shape may hold fewer cells than `node_count`.
    let placed = nodes.len();
    let mut edges = Vec::new();
    let mut push = |a: usize, b: usize, edges: &mut Vec<Edge>| {
        if a <= placed && b <= placed {
            let k = edges.len() + 1;
            edges.push(Edge::new(opts.edge_id(k), opts.node_id(a), opts.node_id(b), opts.draw_spin(&mut rng)));
        }
    };

    // Horizontal links, then vertical.
    for row in 0..rows {
        for col in 0..columns.saturating_sub(1) {
            let a = row * columns + col + 1;
            push(a, a + 1, &mut edges);
        }
    }
    for row in 0..rows.saturating_sub(1) {
        for col in 0..columns {
            let a = row * columns + col + 1;
            push(a, a + columns, &mut edges);
        }
    }

    let g = SpinNetwork::from_parts(nodes, edges)?;
    debug!(target: "spinnet::graph", rows, columns, edges = g.edge_count(), "grid graph built");
    Ok(g)
}

/// `columns = ⌈√n⌉`, `rows = ⌈n / columns⌉`.
pub fn grid_dimensions(n: usize) -> (usize, usize) {
    let columns = ((n as f64).sqrt().ceil() as usize).max(1);
    let rows = n.div_ceil(columns);
    (rows, columns)
}

/// Randomly placed nodes with randomly chosen undirected edges.
///
/// Target edge count is `min(max(n, ⌊C·p⌋), C)` where `C = n(n−1)/2` and
/// `p` is the connectivity. With `ensure_connected`, a random spanning tree
/// is laid down first. No undirected pair is ever linked twice.
pub fn create_random_graph(opts: &TemplateOptions, random: RandomOptions) -> Result<SpinNetwork, GraphError> {
    opts.require_nodes("random", 2)?;
    if !(0.0..=1.0).contains(&random.connectivity) {
        return Err(GraphError::InvalidTemplate(format!(
            "connectivity must be between 0 and 1, got {}",
            random.connectivity
        )));
    }
    let mut rng = opts.rng();
    let n = opts.node_count;

    let nodes = (0..n)
        .map(|i| {
            let x = rng.gen::<f64>() * random.width;
            let y = rng.gen::<f64>() * random.height;
            opts.node(i + 1, Position::new(x, y))
        })
        .collect();

    let max_edges = n * (n - 1) / 2;
    let target = ((max_edges as f64 * random.connectivity).floor() as usize)
        .max(n)
        .min(max_edges);

    let mut pairs: HashSet<(usize, usize)> = HashSet::new();
    let mut edges: Vec<Edge> = Vec::with_capacity(target);

    if random.ensure_connected {
        // Grow a spanning tree from node 1.
        let mut connected = vec![1usize];
        for next in 2..=n {
            let source = connected[rng.gen_range(0..connected.len())];
            link_pair(opts, &mut pairs, &mut edges, &mut rng, source, next);
            connected.push(next);
        }
    }

    // Fill with distinct random pairs. Enumerating the remaining pairs and
    // shuffling keeps this bounded even for dense targets.
    if edges.len() < target {
        let mut remaining: Vec<(usize, usize)> = (1..=n)
            .flat_map(|a| (a + 1..=n).map(move |b| (a, b)))
            .filter(|p| !pairs.contains(p))
            .collect();
        remaining.shuffle(&mut rng);
        for (a, b) in remaining.into_iter().take(target - edges.len()) {
            link_pair(opts, &mut pairs, &mut edges, &mut rng, a, b);
        }
    }

    let g = SpinNetwork::from_parts(nodes, edges)?;
    debug!(target: "spinnet::graph", nodes = n, edges = g.edge_count(), target, "random graph built");
    Ok(g)
}

/// Link `a`–`b` unless the undirected pair already exists.
fn link_pair(
    opts:  &TemplateOptions,
    pairs: &mut HashSet<(usize, usize)>,
    edges: &mut Vec<Edge>,
    rng:   &mut StdRng,
    a:     usize,
    b:     usize,
) {
    if a != b && pairs.insert((a.min(b), a.max(b))) {
        let k = edges.len() + 1;
        edges.push(Edge::new(opts.edge_id(k), opts.node_id(a), opts.node_id(b), opts.draw_spin(rng)));
    }
}

// ─────────────────────────────────────────────
// Name-based dispatch
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphTemplate {
    Line,
    Ring,
    Grid,
    Random,
}

impl GraphTemplate {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Ring => "ring",
            Self::Grid => "grid",
            Self::Random => "random",
        }
    }
}

impl FromStr for GraphTemplate {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "line" => Ok(Self::Line),
            "ring" => Ok(Self::Ring),
            "grid" => Ok(Self::Grid),
            "random" => Ok(Self::Random),
            other => Err(GraphError::UnknownTemplate(other.to_string())),
        }
    }
}

/// Build a template with its shape-specific defaults.
pub fn create_template_graph(kind: GraphTemplate, opts: &TemplateOptions) -> Result<SpinNetwork, GraphError> {
    match kind {
        GraphTemplate::Line => create_line_graph(opts, LineOptions::default()),
        GraphTemplate::Ring => create_ring_graph(opts, RingOptions::default()),
        GraphTemplate::Grid => create_grid_graph(opts, GridOptions::default()),
        GraphTemplate::Random => create_random_graph(opts, RandomOptions::default()),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(n: usize) -> TemplateOptions {
        TemplateOptions { seed: Some(7), ..TemplateOptions::with_nodes(n) }
    }

    // ── Line ───────────────────────────────────────

    #[test]
    fn line_graph_layout_and_ids() {
        let g = create_line_graph(&opts(5), LineOptions::default()).unwrap();
        assert_eq!(g.node_count(), 5);
        assert_eq!(g.edge_count(), 4);
        assert_eq!(g.node("node3").unwrap().position.x, 200.0);
        let e = g.edge("edge1").unwrap();
        assert_eq!((e.source_id.as_str(), e.target_id.as_str()), ("node1", "node2"));
        assert!(g.edges().iter().all(|e| e.spin == 0.5));
        assert!(g.nodes().iter().all(|n| n.intertwiner == 2));
    }

    #[test]
    fn line_graph_requires_two_nodes() {
        assert!(matches!(
            create_line_graph(&opts(1), LineOptions::default()),
            Err(GraphError::InvalidTemplate(_))
        ));
    }

    // ── Ring ───────────────────────────────────────

    #[test]
    fn ring_graph_rejects_two_nodes() {
        let err = create_ring_graph(&opts(2), RingOptions::default()).unwrap_err();
        assert!(err.to_string().contains("at least 3"), "unexpected message: {err}");
    }

    #[test]
    fn ring_graph_of_three_is_a_cycle() {
        let g = create_ring_graph(&opts(3), RingOptions::default()).unwrap();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 3);
        for id in g.node_ids() {
            assert_eq!(g.degree(&id), 2, "{id} should have degree 2 in a cycle");
        }
        let closing = g.edge("edge3").unwrap();
        assert_eq!((closing.source_id.as_str(), closing.target_id.as_str()), ("node3", "node1"));
        // First node sits at angle 0 around the default centre (150, 150).
        let p = g.node("node1").unwrap().position;
        assert!((p.x - 300.0).abs() < 1e-9 && (p.y - 150.0).abs() < 1e-9);
    }

    // ── Grid ───────────────────────────────────────

    #[test]
    fn grid_dimensions_follow_ceil_sqrt() {
        assert_eq!(grid_dimensions(4), (2, 2));
        assert_eq!(grid_dimensions(5), (2, 3));
        assert_eq!(grid_dimensions(9), (3, 3));
        assert_eq!(grid_dimensions(10), (3, 4));
    }

    #[test]
    fn full_grid_edge_count() {
        let g = create_grid_graph(&opts(9), GridOptions::default()).unwrap();
        // 3×3 lattice: 3 rows × 2 horizontal + 2 × 3 vertical.
        assert_eq!(g.edge_count(), 12);
        assert_eq!(g.degree("node5"), 4);
    }

    #[test]
    fn partial_grid_skips_missing_cells() {
        let g = create_grid_graph(&opts(5), GridOptions::default()).unwrap();
        // 2×3 with one empty cell: horizontal 2 + 1, vertical 2.
        assert_eq!(g.node_count(), 5);
        assert_eq!(g.edge_count(), 5);
        assert!(create_grid_graph(&opts(3), GridOptions::default()).is_err());
    }

    // ── Random ─────────────────────────────────────

    #[test]
    fn random_graph_is_connected_and_simple() {
        let o = TemplateOptions { spin_type: SpinType::Random, ..opts(12) };
        let g = create_random_graph(&o, RandomOptions::default()).unwrap();
        assert_eq!(g.node_count(), 12);
        assert_eq!(g.edge_count(), 33); // ⌊66 · 0.5⌋

        let mut seen = HashSet::new();
        for e in g.edges() {
            let key = if e.source_id < e.target_id {
                (e.source_id.clone(), e.target_id.clone())
            } else {
                (e.target_id.clone(), e.source_id.clone())
            };
            assert!(seen.insert(key), "duplicate undirected edge {}", e.id);
            assert!((0.5..2.0).contains(&e.spin), "spin {} out of range", e.spin);
        }

        // BFS from node1 reaches everything.
        let mut visited = HashSet::from(["node1".to_string()]);
        let mut frontier = vec!["node1".to_string()];
        while let Some(id) = frontier.pop() {
            for nb in g.neighbors(&id) {
                if visited.insert(nb.clone()) {
                    frontier.push(nb);
                }
            }
        }
        assert_eq!(visited.len(), 12);
    }

    #[test]
    fn random_graph_is_reproducible_with_seed() {
        let a = create_random_graph(&opts(8), RandomOptions::default()).unwrap();
        let b = create_random_graph(&opts(8), RandomOptions::default()).unwrap();
        assert_eq!(a.to_graph_data(), b.to_graph_data());
    }

    #[test]
    fn random_graph_validates_connectivity() {
        let bad = RandomOptions { connectivity: 1.5, ..RandomOptions::default() };
        assert!(create_random_graph(&opts(4), bad).is_err());
    }

    #[test]
    fn minimum_edge_target_is_node_count_capped_by_pairs() {
        let sparse = RandomOptions { connectivity: 0.0, ensure_connected: false, ..RandomOptions::default() };
        assert_eq!(create_random_graph(&opts(2), sparse).unwrap().edge_count(), 1);
        assert_eq!(create_random_graph(&opts(6), sparse).unwrap().edge_count(), 6);
    }

    // ── Dispatch ───────────────────────────────────

    #[test]
    fn template_names_parse() {
        assert_eq!("Ring".parse::<GraphTemplate>().unwrap(), GraphTemplate::Ring);
        assert!(matches!("star".parse::<GraphTemplate>(), Err(GraphError::UnknownTemplate(_))));
        let g = create_template_graph(GraphTemplate::Grid, &opts(4)).unwrap();
        assert_eq!(g.edge_count(), 4);
    }
}
