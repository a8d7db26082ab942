//! `spinnet-diffusion` — state vectors, operators and time evolution over spin networks.
//!
//! ## Crate structure
//!
//! | Module          | Responsibility                                                 |
//! |-----------------|----------------------------------------------------------------|
//! | [`state`]       | [`StateVector`]: immutable node-indexed values                 |
//! | [`linalg`]      | Laplacian / diffusion operator, `expm`, telegraph RK4, eigen   |
//! | [`solver`]      | Euler, midpoint, RK4 and embedded RKF45 integrators            |
//! | [`model`]       | [`OrdinaryDiffusionModel`], [`TelegraphDiffusionModel`]        |
//! | [`stability`]   | [`StabilityMonitor`] volume threshold + auto-normalization     |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use spinnet_diffusion::{create_diffusion_model, DiffusionType, ModelParameters, StateVector};
//!
//! let mut model = create_diffusion_model(DiffusionType::Ordinary);
//! model.initialize(&graph, &ModelParameters::default())?;
//! model.set_initial_state(&StateVector::delta(graph.node_ids(), "node1", 1.0)?)?;
//! let state = model.evolve_to(1.0, 0.01)?;
//! ```

pub mod error;
pub mod linalg;
pub mod model;
pub mod solver;
pub mod stability;
pub mod state;

// ── Errors ────────────────────────────────────────────────────────────────────
pub use error::DiffusionError;

// ── State ─────────────────────────────────────────────────────────────────────
pub use state::{StateData, StateVector, STATE_EPSILON};

// ── Linear algebra ────────────────────────────────────────────────────────────
pub use linalg::{
    diffusion_operator, eigen_decomposition, matrix_exponential, solve_ordinary_diffusion,
    solve_telegraph_diffusion, EigenDecomposition, TelegraphSolution,
};

// ── Solvers ───────────────────────────────────────────────────────────────────
pub use solver::{
    solver_for, solver_from_name, AdaptiveRkf45, AdaptiveStep, EulerSolver, MidpointSolver,
    NumericalMethod, NumericalSolver, Rhs, Rk4Solver,
};

// ── Models ────────────────────────────────────────────────────────────────────
pub use model::{
    create_diffusion_model, create_diffusion_model_by_name, DiffusionModel, DiffusionType,
    ModelParameters, OrdinaryDiffusionModel, TelegraphDiffusionModel,
};

// ── Stability ─────────────────────────────────────────────────────────────────
pub use stability::{
    NormalizationEvent, StabilityCheck, StabilityConfig, StabilityMetrics, StabilityMonitor,
};
