//! Diffusion models: time evolution of a [`StateVector`] over a [`SpinNetwork`].
//!
//! | Model       | Equation                         | Step                           |
//! |-------------|----------------------------------|--------------------------------|
//! | `ordinary`  | `dφ/dt = α·M·φ`                  | closed form `expm(α·M·dt)·φ`   |
//! | `telegraph` | `φ'' + β·φ' = c²·M·φ`            | semi-implicit velocity-first   |
//!
//! `M` is the diffusion operator `−L` (see [`crate::linalg`]).
//!
//! Models keep their own clock (`current_time`) which advances by the `dt`
//! passed to [`DiffusionModel::evolve_step`]. States handed to a model may use
//! any node ordering; they are re-keyed into graph order on entry.

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use spinnet_graph::{SpinNetwork, WeightFunction};
use tracing::{debug, trace};

use crate::error::DiffusionError;
use crate::linalg::{apply_operator, diffusion_operator, ordinary_propagator, state_to_vector, vector_to_state};
use crate::solver::{NumericalMethod, NumericalSolver};
use crate::state::StateVector;

// ─────────────────────────────────────────────
// DiffusionType
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffusionType {
    #[default]
    Ordinary,
    Telegraph,
}

impl DiffusionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Telegraph => "telegraph",
        }
    }
}

impl FromStr for DiffusionType {
    type Err = DiffusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ordinary" => Ok(Self::Ordinary),
            "telegraph" => Ok(Self::Telegraph),
            _ => Err(DiffusionError::UnknownDiffusionType(s.to_string())),
        }
    }
}

impl fmt::Display for DiffusionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────
// ModelParameters
// ─────────────────────────────────────────────

/// Coefficients a model reads at `initialize`.
#[derive(Debug, Clone)]
pub struct ModelParameters {
    /// Diffusion coefficient (ordinary).
    pub alpha:            f64,
    /// Damping (telegraph).
    pub beta:             f64,
    /// Wave speed (telegraph).
    pub c:                f64,
    pub weight:           WeightFunction,
    /// Not used by the ordinary model's default step; see
    /// [`OrdinaryDiffusionModel::evolve_step_with`].
    pub numerical_method: NumericalMethod,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            alpha:            1.0,
            beta:             0.5,
            c:                1.0,
            weight:           WeightFunction::Spin,
            numerical_method: NumericalMethod::Euler,
        }
    }
}

// ─────────────────────────────────────────────
// DiffusionModel trait
// ─────────────────────────────────────────────

pub trait DiffusionModel: fmt::Debug + Send {
    fn kind(&self) -> DiffusionType;

    /// Build the operator for `graph`. Current and initial state become the
    /// zero vector over the graph's nodes; time resets to 0.
    fn initialize(&mut self, graph: &SpinNetwork, params: &ModelParameters) -> Result<(), DiffusionError>;

    /// Store `state` as both initial and current state. Must cover exactly
    /// the graph's node set.
    fn set_initial_state(&mut self, state: &StateVector) -> Result<(), DiffusionError>;

    /// Replace the current state without touching the initial state or time.
    fn replace_current_state(&mut self, state: &StateVector) -> Result<(), DiffusionError>;

    /// Multiply the current state by `factor` and return it. Models with
    /// extra dynamical variables scale those too.
    fn rescale(&mut self, factor: f64) -> Result<StateVector, DiffusionError> {
        let scaled = self.current_state()?.scale(factor);
        self.replace_current_state(&scaled)?;
        Ok(scaled)
    }

    /// Advance by `dt` and return the new current state.
    fn evolve_step(&mut self, dt: f64) -> Result<StateVector, DiffusionError>;

    /// Step until `current_time` reaches `t`, shortening the final step so
    /// the model never overshoots.
    fn evolve_to(&mut self, t: f64, dt: f64) -> Result<StateVector, DiffusionError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(DiffusionError::InvalidStep(format!("dt must be positive and finite, got {dt}")));
        }
        let eps = dt * 1e-9;
        while t - self.current_time() > eps {
            let h = dt.min(t - self.current_time());
            self.evolve_step(h)?;
        }
        self.current_state().cloned()
    }

    fn current_state(&self) -> Result<&StateVector, DiffusionError>;

    fn current_time(&self) -> f64;

    /// Restore the stored initial state (and velocity) and zero the clock.
    fn reset(&mut self) -> Result<(), DiffusionError>;
}

/// Re-key `state` into `node_ids` order.
fn conform(node_ids: &[String], state: &StateVector) -> Result<StateVector, DiffusionError> {
    if state.len() != node_ids.len() {
        return Err(DiffusionError::SizeMismatch { expected: node_ids.len(), got: state.len() });
    }
    if state.node_ids() == node_ids {
        return Ok(state.clone());
    }
    let values = node_ids.iter().map(|id| state.get(id)).collect::<Result<Vec<_>, _>>()?;
    StateVector::new(node_ids.to_vec(), values)
}

fn require_dt(dt: f64) -> Result<(), DiffusionError> {
    if dt > 0.0 && dt.is_finite() {
        Ok(())
    } else {
        Err(DiffusionError::InvalidStep(format!("dt must be positive and finite, got {dt}")))
    }
}

// ─────────────────────────────────────────────
// OrdinaryDiffusionModel
// ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct OrdinaryDiffusionModel {
    alpha:      f64,
    operator:   Option<DMatrix<f64>>,
    node_ids:   Vec<String>,
    initial:    Option<StateVector>,
    current:    Option<StateVector>,
    time:       f64,
    /// `expm(α·M·dt)` for the last `dt` used.
    propagator: Option<(f64, DMatrix<f64>)>,
}

impl OrdinaryDiffusionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operator(&self) -> Option<&DMatrix<f64>> {
        self.operator.as_ref()
    }

    fn require_operator(&self) -> Result<&DMatrix<f64>, DiffusionError> {
        self.operator.as_ref().ok_or(DiffusionError::NotInitialized)
    }

    fn propagator_for(&mut self, dt: f64) -> Result<&DMatrix<f64>, DiffusionError> {
        let stale = !matches!(&self.propagator, Some((cached, _)) if *cached == dt);
        if stale {
            let p = ordinary_propagator(self.require_operator()?, self.alpha, dt)?;
            self.propagator = Some((dt, p));
        }
        match &self.propagator {
            Some((_, p)) => Ok(p),
            None => Err(DiffusionError::NotInitialized),
        }
    }

    /// Advance by `dt` through an iterative solver on `dφ/dt = α·M·φ`
    /// instead of the closed form.
    pub fn evolve_step_with(&mut self, solver: &dyn NumericalSolver, dt: f64) -> Result<StateVector, DiffusionError> {
        require_dt(dt)?;
        let rate = self.require_operator()? * self.alpha;
        let current = self.current.as_ref().ok_or(DiffusionError::NotInitialized)?;
        let rhs = |_t: f64, y: &StateVector| apply_operator(&rate, y);

        let next = solver.step(self.time, current, dt, &rhs)?;
        self.time += dt;
        self.current = Some(next.clone());
        trace!(target: "spinnet::model", method = %solver.method(), time = self.time, "ordinary step (iterative)");
        Ok(next)
    }
}

impl DiffusionModel for OrdinaryDiffusionModel {
    fn kind(&self) -> DiffusionType {
        DiffusionType::Ordinary
    }

    fn initialize(&mut self, graph: &SpinNetwork, params: &ModelParameters) -> Result<(), DiffusionError> {
        let node_ids = graph.node_ids();
        let zeros = StateVector::zeros(node_ids.clone());

        self.alpha = params.alpha;
        self.operator = Some(diffusion_operator(graph, &params.weight));
        self.node_ids = node_ids;
        self.initial = Some(zeros.clone());
        self.current = Some(zeros);
        self.time = 0.0;
        self.propagator = None;

        debug!(
            target: "spinnet::model",
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            alpha = params.alpha,
            weight = params.weight.name(),
            "ordinary model initialized"
        );
        Ok(())
    }

    fn set_initial_state(&mut self, state: &StateVector) -> Result<(), DiffusionError> {
        self.require_operator()?;
        let state = conform(&self.node_ids, state)?;
        self.initial = Some(state.clone());
        self.current = Some(state);
        Ok(())
    }

    fn replace_current_state(&mut self, state: &StateVector) -> Result<(), DiffusionError> {
        self.require_operator()?;
        self.current = Some(conform(&self.node_ids, state)?);
        Ok(())
    }

    fn evolve_step(&mut self, dt: f64) -> Result<StateVector, DiffusionError> {
        require_dt(dt)?;
        let current = self.current.clone().ok_or(DiffusionError::NotInitialized)?;
        let next = apply_operator(self.propagator_for(dt)?, &current)?;
        self.time += dt;
        self.current = Some(next.clone());
        Ok(next)
    }

    fn current_state(&self) -> Result<&StateVector, DiffusionError> {
        self.current.as_ref().ok_or(DiffusionError::NotInitialized)
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn reset(&mut self) -> Result<(), DiffusionError> {
        let initial = self.initial.clone().ok_or(DiffusionError::NotInitialized)?;
        self.current = Some(initial);
        self.time = 0.0;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// TelegraphDiffusionModel
// ─────────────────────────────────────────────

/// Damped wave dynamics tracked as position `φ` and velocity `v`.
///
/// Each step computes `a = c²·M·φ − β·v`, then `v ← v + a·dt`, then
/// `φ ← φ + v·dt` with the *updated* velocity. First order, kept for parity
/// with stored runs; [`crate::linalg::solve_telegraph_diffusion`] offers RK4.
#[derive(Debug, Default)]
pub struct TelegraphDiffusionModel {
    beta:             f64,
    c_squared:        f64,
    operator:         Option<DMatrix<f64>>,
    node_ids:         Vec<String>,
    initial:          Option<StateVector>,
    initial_velocity: Option<StateVector>,
    current:          Option<StateVector>,
    velocity:         Option<StateVector>,
    time:             f64,
}

impl TelegraphDiffusionModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_operator(&self) -> Result<&DMatrix<f64>, DiffusionError> {
        self.operator.as_ref().ok_or(DiffusionError::NotInitialized)
    }

    /// Set the initial (and current) velocity. Defaults to zero.
    pub fn set_initial_velocity(&mut self, velocity: &StateVector) -> Result<(), DiffusionError> {
        self.require_operator()?;
        let velocity = conform(&self.node_ids, velocity)?;
        self.initial_velocity = Some(velocity.clone());
        self.velocity = Some(velocity);
        Ok(())
    }

    pub fn current_velocity(&self) -> Result<&StateVector, DiffusionError> {
        self.velocity.as_ref().ok_or(DiffusionError::NotInitialized)
    }
}

impl DiffusionModel for TelegraphDiffusionModel {
    fn kind(&self) -> DiffusionType {
        DiffusionType::Telegraph
    }

    fn initialize(&mut self, graph: &SpinNetwork, params: &ModelParameters) -> Result<(), DiffusionError> {
        let node_ids = graph.node_ids();
        let zeros = StateVector::zeros(node_ids.clone());

        self.beta = params.beta;
        self.c_squared = params.c * params.c;
        self.operator = Some(diffusion_operator(graph, &params.weight));
        self.node_ids = node_ids;
        self.initial = Some(zeros.clone());
        self.current = Some(zeros.clone());
        self.initial_velocity = Some(zeros.clone());
        self.velocity = Some(zeros);
        self.time = 0.0;

        debug!(
            target: "spinnet::model",
            nodes = graph.node_count(),
            beta = params.beta,
            c = params.c,
            weight = params.weight.name(),
            "telegraph model initialized"
        );
        Ok(())
    }

    fn set_initial_state(&mut self, state: &StateVector) -> Result<(), DiffusionError> {
        self.require_operator()?;
        let state = conform(&self.node_ids, state)?;
        self.initial = Some(state.clone());
        self.current = Some(state);
        Ok(())
    }

    fn replace_current_state(&mut self, state: &StateVector) -> Result<(), DiffusionError> {
        self.require_operator()?;
        self.current = Some(conform(&self.node_ids, state)?);
        Ok(())
    }

    /// `φ` and `v` share the factor so the pair stays on one trajectory.
    fn rescale(&mut self, factor: f64) -> Result<StateVector, DiffusionError> {
        self.require_operator()?;
        let current = self.current.as_ref().ok_or(DiffusionError::NotInitialized)?.scale(factor);
        let velocity = self.velocity.as_ref().ok_or(DiffusionError::NotInitialized)?.scale(factor);
        self.current = Some(current.clone());
        self.velocity = Some(velocity);
        Ok(current)
    }

    fn evolve_step(&mut self, dt: f64) -> Result<StateVector, DiffusionError> {
        require_dt(dt)?;
        let m = self.require_operator()?;
        let current = self.current.as_ref().ok_or(DiffusionError::NotInitialized)?;
        let velocity = self.velocity.as_ref().ok_or(DiffusionError::NotInitialized)?;

        let phi = state_to_vector(current);
        let v = state_to_vector(velocity);
        let a: DVector<f64> = (m * &phi) * self.c_squared - &v * self.beta;
        let v_new = v + a * dt;
        let phi_new = phi + &v_new * dt;

        let next = vector_to_state(&phi_new, current)?;
        let next_velocity = vector_to_state(&v_new, velocity)?;
        self.time += dt;
        self.current = Some(next.clone());
        self.velocity = Some(next_velocity);
        Ok(next)
    }

    fn current_state(&self) -> Result<&StateVector, DiffusionError> {
        self.current.as_ref().ok_or(DiffusionError::NotInitialized)
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn reset(&mut self) -> Result<(), DiffusionError> {
        let initial = self.initial.clone().ok_or(DiffusionError::NotInitialized)?;
        let velocity = self
            .initial_velocity
            .clone()
            .unwrap_or_else(|| StateVector::zeros(self.node_ids.clone()));
        self.current = Some(initial);
        self.velocity = Some(velocity);
        self.time = 0.0;
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────

pub fn create_diffusion_model(kind: DiffusionType) -> Box<dyn DiffusionModel> {
    match kind {
        DiffusionType::Ordinary => Box::new(OrdinaryDiffusionModel::new()),
        DiffusionType::Telegraph => Box::new(TelegraphDiffusionModel::new()),
    }
}

/// Fails with [`DiffusionError::UnknownDiffusionType`] for unrecognized names.
pub fn create_diffusion_model_by_name(name: &str) -> Result<Box<dyn DiffusionModel>, DiffusionError> {
    Ok(create_diffusion_model(name.parse()?))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{EulerSolver, Rk4Solver};
    use approx::assert_relative_eq;
    use spinnet_graph::{create_line_graph, LineOptions, TemplateOptions};

    fn line(n: usize) -> SpinNetwork {
        create_line_graph(&TemplateOptions::with_nodes(n), LineOptions::default()).unwrap()
    }

    fn ordinary_on(graph: &SpinNetwork) -> OrdinaryDiffusionModel {
        let mut model = OrdinaryDiffusionModel::new();
        model.initialize(graph, &ModelParameters::default()).unwrap();
        let delta = StateVector::delta(graph.node_ids(), "node1", 1.0).unwrap();
        model.set_initial_state(&delta).unwrap();
        model
    }

    // ── Factory ──────────────────────────────────

    #[test]
    fn factory_selects_by_type() {
        assert_eq!(create_diffusion_model(DiffusionType::Ordinary).kind(), DiffusionType::Ordinary);
        assert_eq!(create_diffusion_model_by_name("telegraph").unwrap().kind(), DiffusionType::Telegraph);
        assert!(matches!(
            create_diffusion_model_by_name("fractional"),
            Err(DiffusionError::UnknownDiffusionType(name)) if name == "fractional"
        ));
    }

    #[test]
    fn uninitialized_model_refuses_to_step() {
        let mut model = OrdinaryDiffusionModel::new();
        assert!(matches!(model.evolve_step(0.1), Err(DiffusionError::NotInitialized)));
        assert!(model.current_state().is_err());
    }

    // ── Ordinary ─────────────────────────────────

    #[test]
    fn ordinary_step_smooths_a_delta() {
        let graph = line(5);
        let mut model = ordinary_on(&graph);
        let mut prev_max = 1.0;
        for _ in 0..20 {
            let s = model.evolve_step(0.01).unwrap();
            let max = s.values().iter().cloned().fold(f64::MIN, f64::max);
            assert!(max < prev_max, "max must strictly decrease: {max} >= {prev_max}");
            prev_max = max;
        }
        assert!(model.current_state().unwrap().get("node2").unwrap() > 0.0);
    }

    #[test]
    fn ordinary_step_conserves_total_mass() {
        // −L has zero column sums, so Σφ is invariant.
        let graph = line(6);
        let mut model = ordinary_on(&graph);
        let s = model.evolve_to(0.5, 0.05).unwrap();
        assert_relative_eq!(s.sum(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn evolve_to_lands_exactly_on_target() {
        let graph = line(3);
        let mut model = ordinary_on(&graph);
        model.evolve_to(0.25, 0.1).unwrap();
        assert_relative_eq!(model.current_time(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn iterative_path_tracks_closed_form() {
        let graph = line(4);
        let mut closed = ordinary_on(&graph);
        let mut rk4 = ordinary_on(&graph);
        for _ in 0..10 {
            closed.evolve_step(0.01).unwrap();
            rk4.evolve_step_with(&Rk4Solver, 0.01).unwrap();
        }
        let a = closed.current_state().unwrap();
        let b = rk4.current_state().unwrap();
        for (x, y) in a.values().iter().zip(b.values()) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }

        let mut euler = ordinary_on(&graph);
        euler.evolve_step_with(&EulerSolver, 0.01).unwrap();
        assert_relative_eq!(euler.current_time(), 0.01);
    }

    #[test]
    fn reset_restores_initial_state_and_time() {
        let graph = line(3);
        let mut model = ordinary_on(&graph);
        model.evolve_step(0.1).unwrap();
        model.reset().unwrap();
        assert_eq!(model.current_time(), 0.0);
        assert_eq!(model.current_state().unwrap().get("node1").unwrap(), 1.0);
    }

    #[test]
    fn foreign_ordering_is_rekeyed() {
        let graph = line(3);
        let mut model = OrdinaryDiffusionModel::new();
        model.initialize(&graph, &ModelParameters::default()).unwrap();
        let reversed = StateVector::new(
            vec!["node3".into(), "node2".into(), "node1".into()],
            vec![3.0, 2.0, 1.0],
        )
        .unwrap();
        model.set_initial_state(&reversed).unwrap();
        let s = model.current_state().unwrap();
        assert_eq!(s.node_ids(), &graph.node_ids()[..]);
        assert_eq!(s.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn state_over_wrong_nodes_is_rejected() {
        let graph = line(3);
        let mut model = OrdinaryDiffusionModel::new();
        model.initialize(&graph, &ModelParameters::default()).unwrap();
        let short = StateVector::uniform(vec!["node1".into()], 1.0);
        assert!(matches!(model.set_initial_state(&short), Err(DiffusionError::SizeMismatch { .. })));
        let stranger = StateVector::uniform(vec!["a".into(), "b".into(), "c".into()], 1.0);
        assert!(matches!(model.set_initial_state(&stranger), Err(DiffusionError::NotFound(_))));
    }

    // ── Telegraph ────────────────────────────────

    #[test]
    fn telegraph_update_is_velocity_first() {
        // Two nodes, one spin-0.5 edge: M = [[-0.5, 0.5], [0.5, -0.5]].
        let graph = line(2);
        let mut model = TelegraphDiffusionModel::new();
        let params = ModelParameters { beta: 0.5, c: 1.0, ..ModelParameters::default() };
        model.initialize(&graph, &params).unwrap();
        model.set_initial_state(&StateVector::delta(graph.node_ids(), "node1", 1.0).unwrap()).unwrap();

        let dt = 0.1;
        let s = model.evolve_step(dt).unwrap();
        // a = M·φ − β·0 = [-0.5, 0.5]; v = a·dt; φ = φ + v·dt.
        assert_relative_eq!(s.get("node1").unwrap(), 1.0 - 0.5 * dt * dt, epsilon = 1e-14);
        assert_relative_eq!(s.get("node2").unwrap(), 0.5 * dt * dt, epsilon = 1e-14);
        assert_relative_eq!(model.current_velocity().unwrap().get("node1").unwrap(), -0.05, epsilon = 1e-14);
    }

    #[test]
    fn telegraph_rescale_scales_velocity_with_state() {
        let graph = line(3);
        let mut model = TelegraphDiffusionModel::new();
        model.initialize(&graph, &ModelParameters::default()).unwrap();
        model.set_initial_state(&StateVector::delta(graph.node_ids(), "node1", 100.0).unwrap()).unwrap();
        model.evolve_step(0.1).unwrap();

        let phi = model.current_state().unwrap().clone();
        let v = model.current_velocity().unwrap().clone();
        assert!(v.max_abs() > 0.0);

        let scaled = model.rescale(0.25).unwrap();
        assert!(scaled.approx_eq(&phi.scale(0.25)));
        assert!(model.current_state().unwrap().approx_eq(&phi.scale(0.25)));
        assert!(model.current_velocity().unwrap().approx_eq(&v.scale(0.25)));
        assert_eq!(model.current_time(), 0.1);
    }

    #[test]
    fn ordinary_rescale_scales_state() {
        let graph = line(3);
        let mut model = ordinary_on(&graph);
        let before = model.current_state().unwrap().clone();
        let scaled = model.rescale(2.0).unwrap();
        assert!(scaled.approx_eq(&before.scale(2.0)));
    }

    #[test]
    fn telegraph_reset_restores_velocity() {
        let graph = line(3);
        let mut model = TelegraphDiffusionModel::new();
        model.initialize(&graph, &ModelParameters::default()).unwrap();
        model.set_initial_state(&StateVector::delta(graph.node_ids(), "node2", 1.0).unwrap()).unwrap();
        let v0 = StateVector::uniform(graph.node_ids(), 0.25);
        model.set_initial_velocity(&v0).unwrap();

        model.evolve_to(0.3, 0.1).unwrap();
        model.reset().unwrap();
        assert_eq!(model.current_time(), 0.0);
        assert!(model.current_velocity().unwrap().approx_eq(&v0));
    }

    #[test]
    fn diffusion_type_parses_case_insensitively() {
        assert_eq!("Telegraph".parse::<DiffusionType>().unwrap(), DiffusionType::Telegraph);
        assert_eq!(DiffusionType::Ordinary.to_string(), "ordinary");
    }
}
