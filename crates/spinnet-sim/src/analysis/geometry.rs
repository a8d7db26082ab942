//! Geometric observables of a spin network and a state over it.
//!
//! | Property        | Definition                                              |
//! |-----------------|---------------------------------------------------------|
//! | volume          | `Σ φᵢ²`                                                 |
//! | volumeEntropy   | `−Σ p ln p`, `p = φᵢ²/volume`                           |
//! | area            | `Σ_edges √(j(j+1))` with `j` clamped at 0               |
//! | dimension       | spectral dimension from the low Laplacian spectrum      |
//! | totalSpin       | `Σ_edges j`                                             |
//! | averageDegree   | `Σ deg / n`                                             |

use serde::{Deserialize, Serialize};
use spinnet_diffusion::{eigen_decomposition, DiffusionError, StateVector};
use spinnet_graph::{SpinNetwork, WeightFunction};
use tracing::debug;

/// Eigenvalues below this magnitude count as zero modes.
const ZERO_EIGENVALUE: f64 = 1e-10;
/// Upper bound on the number of eigenvalues in the dimension regression.
const DIMENSION_SAMPLE: usize = 10;
const MAX_DIMENSION: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometricProperties {
    pub total_volume:        f64,
    pub volume_entropy:      f64,
    pub total_area:          f64,
    pub effective_dimension: f64,
    pub total_spin:          f64,
    pub average_degree:      f64,
}

impl GeometricProperties {
    pub const NAMES: [&'static str; 6] =
        ["volume", "volumeEntropy", "area", "dimension", "totalSpin", "averageDegree"];

    /// `(name, value)` pairs in [`Self::NAMES`] order.
    pub fn as_named(&self) -> [(&'static str, f64); 6] {
        [
            ("volume", self.total_volume),
            ("volumeEntropy", self.volume_entropy),
            ("area", self.total_area),
            ("dimension", self.effective_dimension),
            ("totalSpin", self.total_spin),
            ("averageDegree", self.average_degree),
        ]
    }
}

/// Holds the graph-only quantities so they are computed once per graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryCalculator {
    total_area:          f64,
    effective_dimension: f64,
    total_spin:          f64,
    average_degree:      f64,
}

impl GeometryCalculator {
    pub fn new(graph: &SpinNetwork, weight: &WeightFunction) -> Self {
        Self {
            total_area:          total_area(graph),
            effective_dimension: effective_dimension(graph, weight),
            total_spin:          total_spin(graph),
            average_degree:      average_degree(graph),
        }
    }

    /// One-shot calculation for a single state.
    pub fn compute(graph: &SpinNetwork, state: &StateVector, weight: &WeightFunction) -> GeometricProperties {
        Self::new(graph, weight).properties(state)
    }

    pub fn properties(&self, state: &StateVector) -> GeometricProperties {
        GeometricProperties {
            total_volume:        total_volume(state),
            volume_entropy:      volume_entropy(state),
            total_area:          self.total_area,
            effective_dimension: self.effective_dimension,
            total_spin:          self.total_spin,
            average_degree:      self.average_degree,
        }
    }
}

pub fn total_volume(state: &StateVector) -> f64 {
    state.volume()
}

/// Shannon entropy of the squared-amplitude distribution. `0` for the zero state.
pub fn volume_entropy(state: &StateVector) -> f64 {
    let volume = state.volume();
    if volume <= 0.0 || !volume.is_finite() {
        return 0.0;
    }
    let entropy: f64 = state
        .values()
        .iter()
        .map(|v| v * v / volume)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum();
    // A single occupied node sums to -0.0.
    if entropy > 0.0 { entropy } else { 0.0 }
}

pub fn total_area(graph: &SpinNetwork) -> f64 {
    graph
        .edges()
        .iter()
        .map(|e| {
            let j = e.spin.max(0.0);
            (j * (j + 1.0)).sqrt()
        })
        .sum()
}

pub fn total_spin(graph: &SpinNetwork) -> f64 {
    graph.edges().iter().map(|e| e.spin).sum()
}

pub fn average_degree(graph: &SpinNetwork) -> f64 {
    if graph.is_empty() {
        return 0.0;
    }
    let total: usize = graph.nodes().iter().map(|n| graph.degree(&n.id)).sum();
    total as f64 / graph.node_count() as f64
}

/// Spectral dimension estimate.
///
/// Takes the `m` non-zero Laplacian eigenvalues in ascending order, samples
/// the smallest `min(10, ⌊m/3⌋)` and regresses `ln((i+1)/m)` on `ln λᵢ`.
/// With `N(λ) ~ λ^{d/2}` the dimension is `2·slope`, clamped to `[0, 10]`;
/// degenerate inputs give 0.
pub fn effective_dimension(graph: &SpinNetwork, weight: &WeightFunction) -> f64 {
    let laplacian = graph.to_laplacian_matrix(weight);
    let eigen = match eigen_decomposition(&laplacian) {
        Ok(e) => e,
        Err(e) => {
            debug!(target: "spinnet::graph", error = %e, "eigendecomposition failed, dimension = 0");
            return 0.0;
        }
    };

    let nonzero: Vec<f64> = eigen
        .values
        .into_iter()
        .filter(|v| v.is_finite() && v.abs() > ZERO_EIGENVALUE)
        .collect();
    let m = nonzero.len();
    let sample = DIMENSION_SAMPLE.min(m / 3);
    if sample < 2 {
        return 0.0;
    }

    let points: Vec<(f64, f64)> = nonzero
        .iter()
        .take(sample)
        .filter(|&&l| l > 0.0)
        .enumerate()
        .map(|(i, &l)| (l.ln(), ((i + 1) as f64 / m as f64).ln()))
        .collect();
    if points.len() < 2 {
        return 0.0;
    }

    let n = points.len() as f64;
    let (sx, sy, sxy, sxx) = points.iter().fold((0.0, 0.0, 0.0, 0.0), |(sx, sy, sxy, sxx), &(x, y)| {
        (sx + x, sy + y, sxy + x * y, sxx + x * x)
    });
    let denominator = n * sxx - sx * sx;
    if denominator.abs() < ZERO_EIGENVALUE {
        return 0.0;
    }
    let slope = (n * sxy - sx * sy) / denominator;
    let dimension = 2.0 * slope;
    if !dimension.is_finite() {
        return 0.0;
    }
    dimension.clamp(0.0, MAX_DIMENSION)
}

/// `‖curr − prev‖² / dt`, paired by node id; `0` when `dt == 0`.
pub fn diffusion_rate(prev: &StateVector, curr: &StateVector, dt: f64) -> Result<f64, DiffusionError> {
    if dt == 0.0 {
        return Ok(0.0);
    }
    Ok(curr.subtract(prev)?.volume() / dt)
}
