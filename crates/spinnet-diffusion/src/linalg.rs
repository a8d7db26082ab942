//! Dense linear-algebra layer over `nalgebra`.
//!
//! ## Operator convention
//!
//! The solvers here are literal: [`solve_ordinary_diffusion`] evaluates
//! `expm(α·M·t)·φ₀` and [`solve_telegraph_diffusion`] integrates
//! `d/dt[φ; v] = [v; c²·M·φ − β·v]` for whatever operator `M` it is given.
//!
//! Diffusive (smoothing) dynamics need a negative semi-definite `M`. The
//! models therefore pass [`diffusion_operator`], which is `−L` for the
//! combinatorial Laplacian `L = D − A` of [`SpinNetwork::to_laplacian_matrix`].
//!
//! | Operator              | Spectrum     | `expm(α·M·t)` as `t → ∞`         |
//! |-----------------------|--------------|----------------------------------|
//! | `L = D − A`           | `[0, λ_max]` | diverges along high modes        |
//! | `−L` (diffusion op.)  | `[−λ_max, 0]`| projects onto the constant mode  |

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use spinnet_graph::{SpinNetwork, WeightFunction};

use crate::error::DiffusionError;
use crate::state::StateVector;

/// Symmetry tolerance for [`eigen_decomposition`].
const SYMMETRY_EPSILON: f64 = 1e-9;

// ─────────────────────────────────────────────
// Graph → matrix
// ─────────────────────────────────────────────

/// Combinatorial Laplacian `L = D − A_w` in node enumeration order.
pub fn laplacian_matrix(graph: &SpinNetwork, weight: &WeightFunction) -> DMatrix<f64> {
    graph.to_laplacian_matrix(weight)
}

/// Weighted symmetric adjacency in node enumeration order.
pub fn adjacency_matrix(graph: &SpinNetwork, weight: &WeightFunction) -> DMatrix<f64> {
    graph.to_weighted_adjacency_matrix(weight)
}

/// Diffusion operator `−L`: negative semi-definite, rows sum to zero.
pub fn diffusion_operator(graph: &SpinNetwork, weight: &WeightFunction) -> DMatrix<f64> {
    -graph.to_laplacian_matrix(weight)
}

// ─────────────────────────────────────────────
// StateVector ↔ DVector
// ─────────────────────────────────────────────

pub fn state_to_vector(state: &StateVector) -> DVector<f64> {
    DVector::from_column_slice(state.values())
}

/// Re-wrap `v` with the ordering of `like`.
pub fn vector_to_state(v: &DVector<f64>, like: &StateVector) -> Result<StateVector, DiffusionError> {
    like.with_values(v.iter().copied().collect())
}

// ─────────────────────────────────────────────
// Exponential & closed-form diffusion
// ─────────────────────────────────────────────

fn require_square(m: &DMatrix<f64>) -> Result<(), DiffusionError> {
    if !m.is_square() {
        return Err(DiffusionError::InvalidOperator(format!(
            "expected a square matrix, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    Ok(())
}

fn require_operand(m: &DMatrix<f64>, state: &StateVector) -> Result<(), DiffusionError> {
    require_square(m)?;
    if m.nrows() != state.len() {
        return Err(DiffusionError::SizeMismatch { expected: m.nrows(), got: state.len() });
    }
    Ok(())
}

/// `expm(M·t)`.
pub fn matrix_exponential(m: &DMatrix<f64>, t: f64) -> Result<DMatrix<f64>, DiffusionError> {
    require_square(m)?;
    if m.nrows() == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    Ok((m * t).exp())
}

/// Propagator `expm(α·M·t)` for the ordinary diffusion equation.
pub fn ordinary_propagator(m: &DMatrix<f64>, alpha: f64, t: f64) -> Result<DMatrix<f64>, DiffusionError> {
    matrix_exponential(m, alpha * t)
}

/// Apply a precomputed propagator to a state.
pub fn apply_operator(p: &DMatrix<f64>, state: &StateVector) -> Result<StateVector, DiffusionError> {
    require_operand(p, state)?;
    vector_to_state(&(p * state_to_vector(state)), state)
}

/// Closed-form solution of `dφ/dt = α·M·φ`: `expm(α·M·t)·φ₀`.
pub fn solve_ordinary_diffusion(
    m:      &DMatrix<f64>,
    state0: &StateVector,
    alpha:  f64,
    t:      f64,
) -> Result<StateVector, DiffusionError> {
    require_operand(m, state0)?;
    let p = ordinary_propagator(m, alpha, t)?;
    apply_operator(&p, state0)
}

// ─────────────────────────────────────────────
// Telegraph equation (fixed-step RK4)
// ─────────────────────────────────────────────

/// Position and velocity at the end of a telegraph integration.
#[derive(Debug, Clone)]
pub struct TelegraphSolution {
    pub state:    StateVector,
    pub velocity: StateVector,
}

/// Integrate `d/dt[φ; v] = [v; c²·M·φ − β·v]` from 0 to `t` with classical
/// RK4 at fixed step `dt`. The final sub-step is shortened so the
/// integration lands exactly on `t`.
pub fn solve_telegraph_diffusion(
    m:         &DMatrix<f64>,
    state0:    &StateVector,
    velocity0: &StateVector,
    beta:      f64,
    c_squared: f64,
    t:         f64,
    dt:        f64,
) -> Result<TelegraphSolution, DiffusionError> {
    require_operand(m, state0)?;
    require_operand(m, velocity0)?;
    if !(dt > 0.0 && dt.is_finite()) {
        return Err(DiffusionError::InvalidStep(format!("dt must be positive and finite, got {dt}")));
    }
    if !(t >= 0.0 && t.is_finite()) {
        return Err(DiffusionError::InvalidStep(format!("t must be non-negative and finite, got {t}")));
    }

    let rhs = |phi: &DVector<f64>, v: &DVector<f64>| -> (DVector<f64>, DVector<f64>) {
        (v.clone(), (m * phi) * c_squared - v * beta)
    };

    let mut phi = state_to_vector(state0);
    let mut v = state_to_vector(velocity0);
    let steps = (t / dt).ceil() as usize;

    for k in 0..steps {
        let h = dt.min(t - k as f64 * dt);
        if h <= 0.0 {
            break;
        }
        let (k1p, k1v) = rhs(&phi, &v);
        let (k2p, k2v) = rhs(&(&phi + &k1p * (h / 2.0)), &(&v + &k1v * (h / 2.0)));
        let (k3p, k3v) = rhs(&(&phi + &k2p * (h / 2.0)), &(&v + &k2v * (h / 2.0)));
        let (k4p, k4v) = rhs(&(&phi + &k3p * h), &(&v + &k3v * h));

        phi += (k1p + k2p * 2.0 + k3p * 2.0 + k4p) * (h / 6.0);
        v += (k1v + k2v * 2.0 + k3v * 2.0 + k4v) * (h / 6.0);
    }

    Ok(TelegraphSolution {
        state:    vector_to_state(&phi, state0)?,
        velocity: vector_to_state(&v, velocity0)?,
    })
}

// ─────────────────────────────────────────────
// Matrix arithmetic
// ─────────────────────────────────────────────

fn require_same_shape(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<(), DiffusionError> {
    if a.shape() != b.shape() {
        return Err(DiffusionError::SizeMismatch {
            expected: a.nrows() * a.ncols(),
            got:      b.nrows() * b.ncols(),
        });
    }
    Ok(())
}

pub fn add(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, DiffusionError> {
    require_same_shape(a, b)?;
    Ok(a + b)
}

pub fn subtract(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, DiffusionError> {
    require_same_shape(a, b)?;
    Ok(a - b)
}

/// Matrix product `a · b`.
pub fn multiply(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, DiffusionError> {
    if a.ncols() != b.nrows() {
        return Err(DiffusionError::SizeMismatch { expected: a.ncols(), got: b.nrows() });
    }
    Ok(a * b)
}

/// Elementwise quotient. Division by zero follows IEEE-754.
pub fn divide(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, DiffusionError> {
    require_same_shape(a, b)?;
    Ok(a.component_div(b))
}

/// Row-major nested-array view.
pub fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

pub fn from_rows(rows: &[Vec<f64>]) -> Result<DMatrix<f64>, DiffusionError> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
        return Err(DiffusionError::SizeMismatch { expected: ncols, got: bad.len() });
    }
    Ok(DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]))
}

// ─────────────────────────────────────────────
// Eigendecomposition
// ─────────────────────────────────────────────

/// Eigenpairs of a symmetric matrix, sorted by ascending eigenvalue.
/// Column `k` of `vectors` belongs to `values[k]`.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    pub values:  Vec<f64>,
    pub vectors: DMatrix<f64>,
}

pub fn eigen_decomposition(m: &DMatrix<f64>) -> Result<EigenDecomposition, DiffusionError> {
    require_square(m)?;
    if m.nrows() == 0 {
        return Ok(EigenDecomposition { values: Vec::new(), vectors: DMatrix::zeros(0, 0) });
    }
    let asym = (m - m.transpose()).amax();
    if asym > SYMMETRY_EPSILON {
        return Err(DiffusionError::InvalidOperator(format!(
            "eigendecomposition requires a symmetric matrix (max asymmetry {asym:.3e})"
        )));
    }

    let eig = SymmetricEigen::new(m.clone());
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));

    let values = order.iter().map(|&k| eig.eigenvalues[k]).collect();
    let vectors = DMatrix::from_fn(m.nrows(), order.len(), |i, j| eig.eigenvectors[(i, order[j])]);
    Ok(EigenDecomposition { values, vectors })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use spinnet_graph::{Edge, Node, Position};

    fn path(n: usize) -> SpinNetwork {
        let mut g = SpinNetwork::new();
        for i in 0..n {
            g = g.add_node(Node::new(format!("n{i}"), Position::new(i as f64, 0.0))).unwrap();
        }
        for i in 1..n {
            g = g.add_edge(Edge::new(format!("e{i}"), format!("n{}", i - 1), format!("n{i}"), 1.0)).unwrap();
        }
        g
    }

    fn delta(g: &SpinNetwork, at: &str) -> StateVector {
        StateVector::delta(g.node_ids(), at, 1.0).unwrap()
    }

    // ── Exponential ────────────────────────────────

    #[test]
    fn exponential_of_zero_is_identity() {
        let z = DMatrix::<f64>::zeros(3, 3);
        let e = matrix_exponential(&z, 5.0).unwrap();
        assert_relative_eq!(e, DMatrix::identity(3, 3), epsilon = 1e-12);
    }

    #[test]
    fn exponential_of_diagonal() {
        let d = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, -2.0]));
        let e = matrix_exponential(&d, 0.5).unwrap();
        assert_relative_eq!(e[(0, 0)], 0.5_f64.exp(), epsilon = 1e-10);
        assert_relative_eq!(e[(1, 1)], (-1.0_f64).exp(), epsilon = 1e-10);
        assert_relative_eq!(e[(0, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn non_square_operator_is_rejected() {
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(matrix_exponential(&m, 1.0), Err(DiffusionError::InvalidOperator(_))));
    }

    // ── Ordinary diffusion ─────────────────────────

    #[test]
    fn ordinary_diffusion_conserves_sum_and_smooths() {
        let g = path(4);
        let op = diffusion_operator(&g, &WeightFunction::Spin);
        let s0 = delta(&g, "n0");

        let s1 = solve_ordinary_diffusion(&op, &s0, 1.0, 0.5).unwrap();
        assert_relative_eq!(s1.sum(), 1.0, epsilon = 1e-10);
        assert!(s1.get("n0").unwrap() < 1.0);
        assert!(s1.get("n1").unwrap() > 0.0);

        // Long-time limit: uniform 1/n.
        let s_inf = solve_ordinary_diffusion(&op, &s0, 1.0, 200.0).unwrap();
        for (id, v) in s_inf.iter() {
            assert_relative_eq!(v, 0.25, epsilon = 1e-8);
            assert!(v.is_finite(), "{id} is not finite");
        }
    }

    #[test]
    fn ordinary_diffusion_rejects_wrong_size_state() {
        let g = path(3);
        let op = diffusion_operator(&g, &WeightFunction::Spin);
        let s = StateVector::zeros(vec!["x".into()]);
        assert!(matches!(
            solve_ordinary_diffusion(&op, &s, 1.0, 1.0),
            Err(DiffusionError::SizeMismatch { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn propagator_composes() {
        let g = path(3);
        let op = diffusion_operator(&g, &WeightFunction::Casimir);
        let s0 = delta(&g, "n1");
        let p = ordinary_propagator(&op, 0.7, 0.1).unwrap();
        let mut s = s0.clone();
        for _ in 0..10 {
            s = apply_operator(&p, &s).unwrap();
        }
        let direct = solve_ordinary_diffusion(&op, &s0, 0.7, 1.0).unwrap();
        for i in 0..3 {
            assert_relative_eq!(s.get_at(i).unwrap(), direct.get_at(i).unwrap(), epsilon = 1e-10);
        }
    }

    // ── Telegraph ──────────────────────────────────

    #[test]
    fn telegraph_without_coupling_is_pure_damping() {
        // M = 0: φ'' = −β φ', so v(t) = v0·e^{−βt}, φ(t) = φ0 + v0(1−e^{−βt})/β.
        let m = DMatrix::<f64>::zeros(1, 1);
        let ids = vec!["a".to_string()];
        let phi0 = StateVector::new(ids.clone(), vec![1.0]).unwrap();
        let v0 = StateVector::new(ids, vec![2.0]).unwrap();
        let beta = 0.5;

        let sol = solve_telegraph_diffusion(&m, &phi0, &v0, beta, 1.0, 1.0, 0.01).unwrap();
        let decay = (-beta * 1.0_f64).exp();
        assert_relative_eq!(sol.velocity.get_at(0).unwrap(), 2.0 * decay, epsilon = 1e-9);
        assert_relative_eq!(sol.state.get_at(0).unwrap(), 1.0 + 2.0 * (1.0 - decay) / beta, epsilon = 1e-9);
    }

    #[test]
    fn telegraph_clamps_final_substep() {
        // t = 0.25 with dt = 0.1 ⇒ steps 0.1, 0.1, 0.05. Compare with dt = 0.05.
        let g = path(3);
        let op = diffusion_operator(&g, &WeightFunction::Spin);
        let s0 = delta(&g, "n0");
        let v0 = StateVector::zeros(g.node_ids());

        let coarse = solve_telegraph_diffusion(&op, &s0, &v0, 0.5, 1.0, 0.25, 0.1).unwrap();
        let fine = solve_telegraph_diffusion(&op, &s0, &v0, 0.5, 1.0, 0.25, 0.05).unwrap();
        for i in 0..3 {
            assert_relative_eq!(
                coarse.state.get_at(i).unwrap(),
                fine.state.get_at(i).unwrap(),
                epsilon = 1e-4
            );
        }
    }

    #[test]
    fn telegraph_rejects_bad_step() {
        let m = DMatrix::<f64>::zeros(1, 1);
        let s = StateVector::zeros(vec!["a".into()]);
        assert!(solve_telegraph_diffusion(&m, &s, &s, 0.1, 1.0, 1.0, 0.0).is_err());
    }

    // ── Arithmetic ─────────────────────────────────

    #[test]
    fn arithmetic_checks_shapes() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DMatrix::from_row_slice(2, 2, &[2.0, 2.0, 2.0, 2.0]);
        assert_eq!(to_rows(&add(&a, &b).unwrap()), vec![vec![3.0, 4.0], vec![5.0, 6.0]]);
        assert_eq!(to_rows(&subtract(&a, &b).unwrap()), vec![vec![-1.0, 0.0], vec![1.0, 2.0]]);
        assert_eq!(to_rows(&divide(&a, &b).unwrap()), vec![vec![0.5, 1.0], vec![1.5, 2.0]]);
        assert_eq!(to_rows(&multiply(&a, &b).unwrap()), vec![vec![6.0, 6.0], vec![14.0, 14.0]]);

        let c = DMatrix::<f64>::zeros(3, 1);
        assert!(add(&a, &c).is_err());
        assert!(multiply(&a, &c).is_err());
    }

    #[test]
    fn rows_round_trip_and_ragged_rows_fail() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(to_rows(&from_rows(&rows).unwrap()), rows);
        assert!(from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    // ── Eigen ──────────────────────────────────────

    #[test]
    fn laplacian_spectrum_of_path() {
        let g = path(3);
        let l = laplacian_matrix(&g, &WeightFunction::Spin);
        let eig = eigen_decomposition(&l).unwrap();
        // Path P3: eigenvalues 0, 1, 3.
        assert_relative_eq!(eig.values[0], 0.0, epsilon = 1e-10);
        assert_relative_eq!(eig.values[1], 1.0, epsilon = 1e-10);
        assert_relative_eq!(eig.values[2], 3.0, epsilon = 1e-10);

        // L·v = λ·v for each column.
        for k in 0..3 {
            let v = eig.vectors.column(k);
            let lhs = &l * v;
            let rhs = v * eig.values[k];
            assert_relative_eq!(lhs, rhs, epsilon = 1e-9);
        }
    }

    #[test]
    fn eigen_rejects_asymmetric_input() {
        let m = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        assert!(eigen_decomposition(&m).is_err());
    }
}
