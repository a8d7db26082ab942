//! One-step integrators for `dy/dt = f(t, y)` over [`StateVector`]s.
//!
//! | Method       | Order | Stages | Step control            |
//! |--------------|-------|--------|-------------------------|
//! | Euler        | 1     | 1      | fixed                   |
//! | Midpoint     | 2     | 2      | fixed                   |
//! | RK4          | 4     | 4      | fixed                   |
//! | RKF45        | 4(5)  | 6      | embedded error estimate |
//!
//! [`solver_from_name`] degrades gracefully: an unknown method name logs a
//! warning and yields RK4.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::DiffusionError;
use crate::state::StateVector;

/// Right-hand side `f(t, y)`.
pub type Rhs<'a> = dyn Fn(f64, &StateVector) -> Result<StateVector, DiffusionError> + 'a;

pub trait NumericalSolver: fmt::Debug + Send + Sync {
    fn method(&self) -> NumericalMethod;

    /// Advance `y` from `t` to `t + dt`.
    fn step(&self, t: f64, y: &StateVector, dt: f64, f: &Rhs<'_>) -> Result<StateVector, DiffusionError>;
}

fn require_step(dt: f64) -> Result<(), DiffusionError> {
    if dt > 0.0 && dt.is_finite() {
        Ok(())
    } else {
        Err(DiffusionError::InvalidStep(format!("dt must be positive and finite, got {dt}")))
    }
}

// ─────────────────────────────────────────────
// NumericalMethod
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericalMethod {
    #[default]
    Euler,
    Midpoint,
    Rk4,
    Adaptive,
}

impl NumericalMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::Midpoint => "midpoint",
            Self::Rk4 => "rk4",
            Self::Adaptive => "adaptive",
        }
    }

    /// Lenient parse: unknown names warn and map to RK4.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(target: "spinnet::solver", name, "unknown numerical method, falling back to rk4");
            Self::Rk4
        })
    }
}

impl FromStr for NumericalMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euler" => Ok(Self::Euler),
            "midpoint" => Ok(Self::Midpoint),
            "rk4" | "runge-kutta" => Ok(Self::Rk4),
            "adaptive" | "rkf45" => Ok(Self::Adaptive),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for NumericalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────
// Fixed-step methods
// ─────────────────────────────────────────────

/// `y + dt·f(t, y)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EulerSolver;

impl NumericalSolver for EulerSolver {
    fn method(&self) -> NumericalMethod {
        NumericalMethod::Euler
    }

    fn step(&self, t: f64, y: &StateVector, dt: f64, f: &Rhs<'_>) -> Result<StateVector, DiffusionError> {
        require_step(dt)?;
        let k1 = f(t, y)?;
        y.add_scaled(&k1, dt)
    }
}

/// `k1 = f(t, y)`, `k2 = f(t + dt/2, y + dt/2·k1)`, `y + dt·k2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidpointSolver;

impl NumericalSolver for MidpointSolver {
    fn method(&self) -> NumericalMethod {
        NumericalMethod::Midpoint
    }

    fn step(&self, t: f64, y: &StateVector, dt: f64, f: &Rhs<'_>) -> Result<StateVector, DiffusionError> {
        require_step(dt)?;
        let k1 = f(t, y)?;
        let k2 = f(t + dt / 2.0, &y.add_scaled(&k1, dt / 2.0)?)?;
        y.add_scaled(&k2, dt)
    }
}

/// Classical four-stage Runge–Kutta.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4Solver;

impl NumericalSolver for Rk4Solver {
    fn method(&self) -> NumericalMethod {
        NumericalMethod::Rk4
    }

    fn step(&self, t: f64, y: &StateVector, dt: f64, f: &Rhs<'_>) -> Result<StateVector, DiffusionError> {
        require_step(dt)?;
        let half = dt / 2.0;
        let k1 = f(t, y)?;
        let k2 = f(t + half, &y.add_scaled(&k1, half)?)?;
        let k3 = f(t + half, &y.add_scaled(&k2, half)?)?;
        let k4 = f(t + dt, &y.add_scaled(&k3, dt)?)?;

        y.add_scaled(&k1, dt / 6.0)?
            .add_scaled(&k2, dt / 3.0)?
            .add_scaled(&k3, dt / 3.0)?
            .add_scaled(&k4, dt / 6.0)
    }
}

// ─────────────────────────────────────────────
// Runge–Kutta–Fehlberg 4(5)
// ─────────────────────────────────────────────

/// Result of a single accepted adaptive step.
#[derive(Debug, Clone)]
pub struct AdaptiveStep {
    pub state:     StateVector,
    /// Step actually taken.
    pub taken:     f64,
    /// Step proposed for the next attempt.
    pub next:      f64,
    /// Error estimate of the accepted step.
    pub error:     f64,
    /// Rejected attempts before acceptance.
    pub rejected:  usize,
}

/// Embedded RKF45 with max-abs error control.
///
/// The 4th-order solution is propagated; the 5th-order one only feeds the
/// error estimate. The step-size factor is `0.84·(tol/err)^{1/4}` clamped to
/// `[0.1, 4]`, and steps are clamped to `[min_step, max_step]` (a final
/// sub-step may be shorter than `min_step` to land on the target time).
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveRkf45 {
    pub tolerance: f64,
    pub min_step:  f64,
    pub max_step:  f64,
}

impl Default for AdaptiveRkf45 {
    fn default() -> Self {
        Self { tolerance: 1e-6, min_step: 1e-6, max_step: 0.1 }
    }
}

impl AdaptiveRkf45 {
    pub fn new(tolerance: f64, min_step: f64, max_step: f64) -> Self {
        Self { tolerance, min_step, max_step }
    }

    /// One trial step of size `h`: returns `(y4, error)`.
    fn trial(&self, t: f64, y: &StateVector, h: f64, f: &Rhs<'_>) -> Result<(StateVector, f64), DiffusionError> {
        let k1 = f(t, y)?;
        let k2 = f(t + h / 4.0, &y.add_scaled(&k1, h / 4.0)?)?;
        let k3 = f(
            t + 3.0 * h / 8.0,
            &y.add_scaled(&k1, h * 3.0 / 32.0)?.add_scaled(&k2, h * 9.0 / 32.0)?,
        )?;
        let k4 = f(
            t + 12.0 * h / 13.0,
            &y.add_scaled(&k1, h * 1932.0 / 2197.0)?
                .add_scaled(&k2, -h * 7200.0 / 2197.0)?
                .add_scaled(&k3, h * 7296.0 / 2197.0)?,
        )?;
        let k5 = f(
            t + h,
            &y.add_scaled(&k1, h * 439.0 / 216.0)?
                .add_scaled(&k2, -h * 8.0)?
                .add_scaled(&k3, h * 3680.0 / 513.0)?
                .add_scaled(&k4, -h * 845.0 / 4104.0)?,
        )?;
        let k6 = f(
            t + h / 2.0,
            &y.add_scaled(&k1, -h * 8.0 / 27.0)?
                .add_scaled(&k2, h * 2.0)?
                .add_scaled(&k3, -h * 3544.0 / 2565.0)?
                .add_scaled(&k4, h * 1859.0 / 4104.0)?
                .add_scaled(&k5, -h * 11.0 / 40.0)?,
        )?;

        let y4 = y
            .add_scaled(&k1, h * 25.0 / 216.0)?
            .add_scaled(&k3, h * 1408.0 / 2565.0)?
            .add_scaled(&k4, h * 2197.0 / 4104.0)?
            .add_scaled(&k5, -h / 5.0)?;

        // y5 − y4, expressed directly in the stage derivatives.
        let diff = k1
            .scale(h * (16.0 / 135.0 - 25.0 / 216.0))
            .add_scaled(&k3, h * (6656.0 / 12825.0 - 1408.0 / 2565.0))?
            .add_scaled(&k4, h * (28561.0 / 56430.0 - 2197.0 / 4104.0))?
            .add_scaled(&k5, h * (-9.0 / 50.0 + 1.0 / 5.0))?
            .add_scaled(&k6, h * 2.0 / 55.0)?;

        Ok((y4, diff.max_abs()))
    }

    fn factor(&self, error: f64) -> f64 {
        if error <= f64::EPSILON {
            return 4.0;
        }
        (0.84 * (self.tolerance / error).powf(0.25)).clamp(0.1, 4.0)
    }

    /// Take one accepted step starting with trial size `h`, shrinking on
    /// rejection. Fails once a rejected trial is already at `min_step`.
    pub fn step_adaptive(&self, t: f64, y: &StateVector, h: f64, f: &Rhs<'_>) -> Result<AdaptiveStep, DiffusionError> {
        require_step(h)?;
        let mut h = h.min(self.max_step);
        let mut rejected = 0usize;

        loop {
            let (y4, error) = self.trial(t, y, h, f)?;
            if !error.is_finite() {
                return Err(DiffusionError::InvalidStep(format!("non-finite error estimate at t = {t}")));
            }
            let factor = self.factor(error);

            if error <= self.tolerance {
                let next = (h * factor).clamp(self.min_step, self.max_step);
                return Ok(AdaptiveStep { state: y4, taken: h, next, error, rejected });
            }

            if h <= self.min_step {
                return Err(DiffusionError::InvalidStep(format!(
                    "step size underflow at t = {t}: error {error:.3e} > tolerance {:.3e} at min_step {:.3e}",
                    self.tolerance, self.min_step
                )));
            }
            rejected += 1;
            h = (h * factor).max(self.min_step);
        }
    }
}

impl NumericalSolver for AdaptiveRkf45 {
    fn method(&self) -> NumericalMethod {
        NumericalMethod::Adaptive
    }

    /// Integrate from `t` to `t + dt` with as many adaptive sub-steps as the
    /// tolerance demands.
    fn step(&self, t: f64, y: &StateVector, dt: f64, f: &Rhs<'_>) -> Result<StateVector, DiffusionError> {
        require_step(dt)?;
        let end = t + dt;
        let mut now = t;
        let mut state = y.clone();
        let mut h = dt.min(self.max_step);
        let mut substeps = 0usize;

        while end - now > dt * 1e-12 {
            let trial = h.min(end - now);
            let accepted = self.step_adaptive(now, &state, trial, f)?;
            now += accepted.taken;
            state = accepted.state;
            h = accepted.next;
            substeps += 1;
        }

        trace!(target: "spinnet::solver", t, dt, substeps, "rkf45 step complete");
        Ok(state)
    }
}

// ─────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────

pub fn solver_for(method: NumericalMethod) -> Box<dyn NumericalSolver> {
    match method {
        NumericalMethod::Euler => Box::new(EulerSolver),
        NumericalMethod::Midpoint => Box::new(MidpointSolver),
        NumericalMethod::Rk4 => Box::new(Rk4Solver),
        NumericalMethod::Adaptive => Box::new(AdaptiveRkf45::default()),
    }
}

/// Name-based lookup; unknown names warn and yield RK4.
pub fn solver_from_name(name: &str) -> Box<dyn NumericalSolver> {
    solver_for(NumericalMethod::from_name(name))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
