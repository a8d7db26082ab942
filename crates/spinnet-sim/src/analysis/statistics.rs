//! Summary statistics over states and histories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use spinnet_diffusion::StateVector;
use spinnet_graph::SpinNetwork;

use crate::error::SimulationError;
use crate::history::SimulationHistory;

/// Probability floor for the KL divergence.
const KL_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStatistics {
    pub mean:     f64,
    pub variance: f64,
    #[serde(rename = "standardDeviation")]
    pub std_dev:  f64,
    pub min:      f64,
    pub max:      f64,
    pub total:    f64,
}

impl StateStatistics {
    pub const NAMES: [&'static str; 6] = ["mean", "variance", "standardDeviation", "min", "max", "total"];

    /// Population statistics over the finite values of `state`. A state with
    /// no finite values yields all zeros.
    pub fn from_state(state: &StateVector) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for &v in state.values().iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += v;
            sum_sq += v * v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self::default();
        }

        let n = count as f64;
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        Self { mean, variance, std_dev: variance.sqrt(), min, max, total: sum }
    }

    pub fn as_named(&self) -> [(&'static str, f64); 6] {
        [
            ("mean", self.mean),
            ("variance", self.variance),
            ("standardDeviation", self.std_dev),
            ("min", self.min),
            ("max", self.max),
            ("total", self.total),
        ]
    }
}

/// Statistics of every recorded snapshot, in time order.
pub fn analyze_history(history: &SimulationHistory) -> Vec<(f64, StateStatistics)> {
    history
        .iter()
        .map(|(t, s)| (t, StateStatistics::from_state(s)))
        .collect()
}

/// `(t₂, ‖φ₂ − φ₁‖ / (t₂ − t₁))` for each consecutive pair of snapshots.
/// Pairs with no time separation are skipped.
pub fn rate_of_change(history: &SimulationHistory) -> Result<Vec<(f64, f64)>, SimulationError> {
    let snapshots: Vec<(f64, &StateVector)> = history.iter().collect();
    let mut rates = Vec::with_capacity(snapshots.len().saturating_sub(1));
    for pair in snapshots.windows(2) {
        let (t0, s0) = pair[0];
        let (t1, s1) = pair[1];
        let dt = t1 - t0;
        if dt <= 0.0 {
            continue;
        }
        let delta = s1.subtract(s0)?;
        rates.push((t1, delta.norm() / dt));
    }
    Ok(rates)
}

/// `D_KL(P ‖ Q)` between the squared-amplitude distributions of two states.
///
/// Values are paired by node id. Both states must cover the same nodes.
pub fn kl_divergence(p: &StateVector, q: &StateVector) -> Result<f64, SimulationError> {
    if p.len() != q.len() {
        return Err(spinnet_diffusion::DiffusionError::SizeMismatch { expected: p.len(), got: q.len() }.into());
    }
    let p_volume = p.volume();
    let q_volume = q.volume();
    if p_volume == 0.0 || q_volume == 0.0 {
        return Ok(0.0);
    }

    let mut divergence = 0.0;
    for (id, pv) in p.iter() {
        let qv = q.get(id)?;
        let pi = (pv * pv / p_volume).max(KL_FLOOR);
        let qi = (qv * qv / q_volume).max(KL_FLOOR);
        divergence += pi * (pi / qi).ln();
    }
    Ok(divergence)
}

// ─────────────────────────────────────────────
// Node ranking
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceCriterion {
    /// `|φᵢ|`
    #[default]
    Value,
    Degree,
    /// `0.5·deg/(n−1) + 0.5·|φᵢ|`
    Centrality,
}

impl ImportanceCriterion {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Degree => "degree",
            Self::Centrality => "centrality",
        }
    }
}

impl FromStr for ImportanceCriterion {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "value" => Ok(Self::Value),
            "degree" => Ok(Self::Degree),
            "centrality" => Ok(Self::Centrality),
            _ => Err(SimulationError::UnknownEnumValue { kind: "importanceCriterion", value: s.to_string() }),
        }
    }
}

impl fmt::Display for ImportanceCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Top `count` node ids under `criterion`, highest score first. Ties keep
/// state order.
pub fn find_important_nodes(
    state: &StateVector,
    graph: &SpinNetwork,
    criterion: ImportanceCriterion,
    count: usize,
) -> Vec<String> {
    let n = state.len();
    let max_degree = n.saturating_sub(1).max(1) as f64;

    let mut scored: Vec<(&str, f64)> = state
        .iter()
        .map(|(id, v)| {
            let score = match criterion {
                ImportanceCriterion::Value => v.abs(),
                ImportanceCriterion::Degree => graph.degree(id) as f64,
                ImportanceCriterion::Centrality => {
                    0.5 * graph.degree(id) as f64 / max_degree + 0.5 * v.abs()
                }
            };
            (id, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(count).map(|(id, _)| id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use spinnet_graph::{create_line_graph, LineOptions, TemplateOptions};

    fn sv(values: &[f64]) -> StateVector {
        let ids = (1..=values.len()).map(|i| format!("node{i}")).collect();
        StateVector::new(ids, values.to_vec()).unwrap()
    }

    // ── StateStatistics ──────────────────────────

    #[test]
    fn population_statistics() {
        let s = StateStatistics::from_state(&sv(&[1.0, 2.0, 3.0, 4.0]));
        assert_relative_eq!(s.mean, 2.5);
        assert_relative_eq!(s.variance, 1.25, epsilon = 1e-12);
        assert_relative_eq!(s.std_dev, 1.25_f64.sqrt(), epsilon = 1e-12);
        assert_eq!((s.min, s.max, s.total), (1.0, 4.0, 10.0));
    }

    #[test]
    fn non_finite_values_are_skipped() {
        let s = StateStatistics::from_state(&sv(&[f64::NAN, 2.0, f64::INFINITY, 4.0]));
        assert_eq!(s.mean, 3.0);
        assert_eq!(s.total, 6.0);
        assert_eq!(StateStatistics::from_state(&sv(&[f64::NAN])), StateStatistics::default());
    }

    #[test]
    fn named_order_matches_names() {
        let s = StateStatistics::from_state(&sv(&[1.0]));
        assert_eq!(s.as_named().map(|(n, _)| n), StateStatistics::NAMES);
    }

    // ── History ──────────────────────────────────

    #[test]
    fn rate_of_change_between_snapshots() {
        let mut h = SimulationHistory::new();
        h.add_state(0.0, sv(&[0.0, 0.0]));
        h.add_state(0.5, sv(&[3.0, 4.0]));
        h.add_state(1.5, sv(&[3.0, 4.0]));

        let rates = rate_of_change(&h).unwrap();
        assert_eq!(rates, vec![(0.5, 10.0), (1.5, 0.0)]);
        assert_eq!(analyze_history(&h).len(), 3);
    }

    // ── KL divergence ────────────────────────────

    #[test]
    fn kl_of_identical_states_is_zero() {
        let p = sv(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(kl_divergence(&p, &p.scale(7.0)).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn kl_is_positive_and_floored() {
        let p = sv(&[1.0, 0.0]);
        let q = sv(&[0.0, 1.0]);
        let d = kl_divergence(&p, &q).unwrap();
        assert!(d.is_finite() && d > 0.0, "floored divergence must be finite and positive, got {d}");
        assert_eq!(kl_divergence(&sv(&[0.0, 0.0]), &q).unwrap(), 0.0);
    }

    #[test]
    fn kl_rejects_different_sizes() {
        assert!(kl_divergence(&sv(&[1.0]), &sv(&[1.0, 2.0])).is_err());
    }

    // ── Node ranking ─────────────────────────────

    #[test]
    fn important_nodes_by_each_criterion() {
        let g = create_line_graph(&TemplateOptions::with_nodes(4), LineOptions::default()).unwrap();
        let s = sv(&[-5.0, 0.1, 0.2, 1.0]);

        assert_eq!(find_important_nodes(&s, &g, ImportanceCriterion::Value, 2), vec!["node1", "node4"]);
        // Interior nodes have degree 2; stable order keeps node2 first.
        assert_eq!(find_important_nodes(&s, &g, ImportanceCriterion::Degree, 2), vec!["node2", "node3"]);
        // node1: 0.5·1/3 + 2.5; node4: 0.5·1/3 + 0.5
        assert_eq!(find_important_nodes(&s, &g, ImportanceCriterion::Centrality, 1), vec!["node1"]);
        assert_eq!(find_important_nodes(&s, &g, ImportanceCriterion::Value, 10).len(), 4);
    }

    #[test]
    fn criterion_parses_names() {
        assert_eq!("Centrality".parse::<ImportanceCriterion>().unwrap(), ImportanceCriterion::Centrality);
        assert!("pagerank".parse::<ImportanceCriterion>().is_err());
    }
}
