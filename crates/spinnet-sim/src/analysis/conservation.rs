//! Conservation checks between two states of the same run.
//!
//! Ordinary diffusion with `M = −L` keeps [`TotalOccupancy`] exactly and
//! lets the L2 norm decay, so [`ProbabilityConservation`] is expected to fail
//! once the state has spread. Both are reported; neither is enforced.

use serde::{Deserialize, Serialize};
use spinnet_diffusion::StateVector;

pub const DEFAULT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConservationReport {
    pub law:                String,
    pub initial:            f64,
    pub current:            f64,
    pub relative_deviation: f64,
    pub conserved:          bool,
}

pub trait ConservationLaw {
    fn name(&self) -> &'static str;

    fn quantity(&self, state: &StateVector) -> f64;

    fn tolerance(&self) -> f64 {
        DEFAULT_TOLERANCE
    }

    /// Default rule: `|current − initial| / max(|initial|, 1)` within tolerance.
    fn check(&self, initial: &StateVector, current: &StateVector) -> ConservationReport {
        let a = self.quantity(initial);
        let b = self.quantity(current);
        let relative_deviation = relative_deviation(a, b);
        ConservationReport {
            law: self.name().to_string(),
            initial: a,
            current: b,
            relative_deviation,
            conserved: relative_deviation <= self.tolerance(),
        }
    }
}

fn relative_deviation(initial: f64, current: f64) -> f64 {
    (current - initial).abs() / initial.abs().max(1.0)
}

/// L2 norm `‖φ‖`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityConservation {
    pub tolerance: f64,
}

impl Default for ProbabilityConservation {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE }
    }
}

impl ConservationLaw for ProbabilityConservation {
    fn name(&self) -> &'static str { "probability" }
    fn quantity(&self, state: &StateVector) -> f64 { state.norm() }
    fn tolerance(&self) -> f64 { self.tolerance }
}

/// `Σ φᵢ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalOccupancy {
    pub tolerance: f64,
}

impl Default for TotalOccupancy {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE }
    }
}

impl ConservationLaw for TotalOccupancy {
    fn name(&self) -> &'static str { "totalOccupancy" }
    fn quantity(&self, state: &StateVector) -> f64 { state.sum() }
    fn tolerance(&self) -> f64 { self.tolerance }
}

/// Smallest value; holds while it stays `≥ −tolerance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Positivity {
    pub tolerance: f64,
}

impl Default for Positivity {
    fn default() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE }
    }
}

impl ConservationLaw for Positivity {
    fn name(&self) -> &'static str { "positivity" }

    fn quantity(&self, state: &StateVector) -> f64 {
        state.values().iter().copied().fold(f64::INFINITY, f64::min)
    }

    fn tolerance(&self) -> f64 { self.tolerance }

    fn check(&self, initial: &StateVector, current: &StateVector) -> ConservationReport {
        let a = self.quantity(initial);
        let b = self.quantity(current);
        ConservationReport {
            law: self.name().to_string(),
            initial: a,
            current: b,
            relative_deviation: relative_deviation(a, b),
            conserved: b >= -self.tolerance,
        }
    }
}

/// The three built-in laws with default tolerances.
pub fn standard_laws() -> Vec<Box<dyn ConservationLaw>> {
    vec![
        Box::new(ProbabilityConservation::default()),
        Box::new(TotalOccupancy::default()),
        Box::new(Positivity::default()),
    ]
}

pub fn check_all(
    laws: &[Box<dyn ConservationLaw>],
    initial: &StateVector,
    current: &StateVector,
) -> Vec<ConservationReport> {
    laws.iter().map(|law| law.check(initial, current)).collect()
}
