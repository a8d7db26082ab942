//! Simulation engine: the run state machine around a [`DiffusionModel`].
//!
//! ```text
//!  Uninitialized ──initialize──▶ Stopped ──resume/run_*──▶ Running ──pause──▶ Paused
//!                                   ▲                        │                  │
//!                                   └────────reset───────────┴──────────────────┘
//!                                         step() at t ≥ total_time ──▶ Completed
//! ```
//!
//! Everything is synchronous. `step`, `run_until` and `run_steps` run to
//! completion on the caller's stack and deliver events before returning.
//! Listeners receive `&SimulationEvent` only; the engine is exclusively
//! borrowed while it dispatches, so a listener cannot call back into it.

use std::collections::HashMap;
use std::time::Instant;

use spinnet_diffusion::{
    create_diffusion_model, DiffusionModel, DiffusionType, StabilityMetrics, StabilityMonitor,
    StateVector,
};
use spinnet_graph::{Edge, Position, SpinNetwork, WeightRegistry};
use tracing::{debug, info, trace};

use crate::error::SimulationError;
use crate::events::{EventKind, ListenerError, ListenerId, SimulationEvent, SimulationEventBus};
use crate::history::SimulationHistory;
use crate::params::{InitialStateSpec, SimulationParameters};

/// Relative tolerance for time comparisons (end of run, history boundaries).
const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Uninitialized,
    Stopped,
    Running,
    Paused,
    Completed,
}

impl EngineState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// Everything that exists only after `initialize`.
#[derive(Debug)]
struct Run {
    graph:         SpinNetwork,
    params:        SimulationParameters,
    model:         Box<dyn DiffusionModel>,
    initial_state: StateVector,
    current_state: StateVector,
}

#[derive(Debug)]
pub struct SimulationEngine {
    run:        Option<Run>,
    registry:   WeightRegistry,
    monitor:    StabilityMonitor,
    history:    SimulationHistory,
    step_count: u64,
    state:      EngineState,
    bus:        SimulationEventBus,
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::with_registry(WeightRegistry::new())
    }

    /// Engine resolving weight-function names through `registry`.
    pub fn with_registry(registry: WeightRegistry) -> Self {
        Self {
            run:        None,
            registry,
            monitor:    StabilityMonitor::default(),
            history:    SimulationHistory::new(),
            step_count: 0,
            state:      EngineState::Uninitialized,
            bus:        SimulationEventBus::new(),
        }
    }

    /// Register a custom weight function; takes effect at the next `initialize`.
    pub fn register_weight_function<F>(&mut self, name: &str, f: F) -> Result<(), SimulationError>
    where
        F: Fn(&Edge) -> f64 + Send + Sync + 'static,
    {
        self.registry.register(name, f)?;
        Ok(())
    }

    pub fn weight_registry(&self) -> &WeightRegistry {
        &self.registry
    }

    // ── Listeners ──────────────────────────────────

    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&SimulationEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        self.bus.subscribe(kind, listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    fn emit(&mut self, event: SimulationEvent) {
        self.bus.publish(&event);
    }

    // ── Lifecycle ──────────────────────────────────

    /// Start a new run on `graph`. Valid from any state. On failure the
    /// engine keeps whatever run it had before.
    pub fn initialize(&mut self, graph: SpinNetwork, params: SimulationParameters) -> Result<(), SimulationError> {
        params.validate()?;
        let params = params.with_stability_defaults();
        if graph.is_empty() {
            return Err(SimulationError::Validation(vec!["graph has no nodes".to_string()]));
        }

        let initial_state = build_initial_state(&graph, &params.initial_state)?;

        let mut model = create_diffusion_model(params.diffusion_type);
        model.initialize(&graph, &params.model_parameters(&self.registry))?;
        model.set_initial_state(&initial_state)?;
        let initial_state = model.current_state()?.clone();

        self.monitor = StabilityMonitor::new(params.stability());
        self.history.clear();
        if params.record_history {
            self.history.add_state(0.0, initial_state.clone());
        }
        self.step_count = 0;
        self.state = EngineState::Stopped;

        info!(
            target: "spinnet::general",
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            diffusion = params.diffusion_type.label(),
            initial_state = params.initial_state.type_name(),
            dt = params.time_step,
            total_time = params.total_time,
            "simulation initialized"
        );

        self.run = Some(Run {
            graph,
            params,
            model,
            current_state: initial_state.clone(),
            initial_state,
        });
        self.emit(SimulationEvent::SimulationReset { time: 0.0 });
        Ok(())
    }

    fn run_ref(&self) -> Result<&Run, SimulationError> {
        self.run.as_ref().ok_or(SimulationError::NotInitialized)
    }

    fn dt(&self) -> f64 {
        self.run.as_ref().map_or(0.0, |r| r.params.time_step)
    }

    fn time(&self) -> f64 {
        self.step_count as f64 * self.dt()
    }

    fn reached(&self, target: f64) -> bool {
        self.time() >= target - TIME_EPSILON * self.dt()
    }

    fn on_history_boundary(time: f64, interval: f64) -> bool {
        let nearest = (time / interval).round() * interval;
        (time - nearest).abs() < TIME_EPSILON * interval.max(1.0)
    }

    /// Advance one `dt`. At or past `total_time` this instead marks the run
    /// completed, emits `SimulationComplete` and leaves the state unchanged.
    /// Returns the current state after the call.
    pub fn step(&mut self) -> Result<StateVector, SimulationError> {
        let total_time = self.run_ref()?.params.total_time;

        if self.reached(total_time) {
            self.state = EngineState::Completed;
            let (time, steps) = (self.time(), self.step_count);
            debug!(target: "spinnet::general", time, steps, "simulation complete");
            self.emit(SimulationEvent::SimulationComplete { time, steps });
            return Ok(self.run_ref()?.current_state.clone());
        }

        let dt = self.dt();
        let run = self.run.as_mut().ok_or(SimulationError::NotInitialized)?;
        let evolved = match run.model.evolve_step(dt) {
            Ok(s) => s,
            Err(e) => {
                let message = e.to_string();
                self.emit(SimulationEvent::Error { message });
                return Err(e.into());
            }
        };

        self.step_count += 1;
        let time = self.step_count as f64 * dt;

        let check = match run.model.kind() {
            DiffusionType::Telegraph => Some(self.monitor.check(&evolved, time)),
            DiffusionType::Ordinary => self.monitor.observe_step(&evolved, time),
        };
        let mut normalized = None;
        let state = match check {
            Some(c) if c.normalized => {
                normalized = Some(c.volume);
                run.model.rescale(1.0 / c.volume.sqrt())?
            }
            _ => evolved,
        };
        run.current_state = state.clone();

        let params = &run.params;
        let finished = time >= params.total_time - TIME_EPSILON * dt;
        if params.record_history
            && (finished || Self::on_history_boundary(time, params.history_interval))
        {
            self.history.add_state(time, state.clone());
        }

        trace!(target: "spinnet::state", step = self.step_count, time, volume = state.volume(), "step complete");

        let step = self.step_count;
        self.emit(SimulationEvent::StepComplete { time, step, state: state.clone() });
        if let Some(volume_before) = normalized {
            let normalization_count = self.monitor.metrics().normalization_count;
            self.emit(SimulationEvent::StateNormalized { time, volume_before, normalization_count });
        }
        Ok(state)
    }

    fn enter_running(&mut self) {
        if self.state != EngineState::Running {
            self.state = EngineState::Running;
            let time = self.time();
            self.emit(SimulationEvent::SimulationResumed { time });
        }
    }

    /// Step until `min(time, total_time)` is reached. Reaching `total_time`
    /// also completes the run. A completed run is returned unchanged and
    /// emits nothing.
    pub fn run_until(&mut self, time: f64) -> Result<StateVector, SimulationError> {
        let total_time = self.run_ref()?.params.total_time;
        if self.state == EngineState::Completed && self.reached(total_time) {
            return Ok(self.run_ref()?.current_state.clone());
        }
        let target = time.min(total_time);
        self.enter_running();

        let started = Instant::now();
        let first_step = self.step_count;
        while !self.reached(target) {
            self.step()?;
        }
        if self.reached(total_time) {
            self.step()?;
        }

        debug!(
            target: "spinnet::performance",
            steps = self.step_count - first_step,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "run_until finished"
        );
        Ok(self.run_ref()?.current_state.clone())
    }

    /// Call `step()` up to `n` times, stopping early on completion. Like
    /// [`run_until`](Self::run_until), a completed run emits nothing.
    pub fn run_steps(&mut self, n: usize) -> Result<StateVector, SimulationError> {
        let total_time = self.run_ref()?.params.total_time;
        if self.state == EngineState::Completed && self.reached(total_time) {
            return Ok(self.run_ref()?.current_state.clone());
        }
        self.enter_running();

        let started = Instant::now();
        for _ in 0..n {
            self.step()?;
            if self.state == EngineState::Completed {
                break;
            }
        }

        debug!(
            target: "spinnet::performance",
            requested = n,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "run_steps finished"
        );
        Ok(self.run_ref()?.current_state.clone())
    }

    /// Running → Paused. No-op otherwise.
    pub fn pause(&mut self) {
        if self.state == EngineState::Running {
            self.state = EngineState::Paused;
            let time = self.time();
            self.emit(SimulationEvent::SimulationPaused { time });
        }
    }

    /// Paused/Stopped → Running while time remains. No-op otherwise.
    pub fn resume(&mut self) {
        let Some(run) = self.run.as_ref() else { return };
        let total_time = run.params.total_time;
        if matches!(self.state, EngineState::Paused | EngineState::Stopped) && !self.reached(total_time) {
            self.enter_running();
        }
    }

    /// Back to the initial state at time 0, history re-seeded.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        let run = self.run.as_mut().ok_or(SimulationError::NotInitialized)?;
        run.model.reset()?;
        run.current_state = run.initial_state.clone();

        self.history.clear();
        if run.params.record_history {
            self.history.add_state(0.0, run.initial_state.clone());
        }
        self.monitor.reset();
        self.step_count = 0;
        self.state = EngineState::Stopped;

        debug!(target: "spinnet::general", "simulation reset");
        self.emit(SimulationEvent::SimulationReset { time: 0.0 });
        Ok(())
    }

    /// Replace the current state (same node set, any ordering). Time and
    /// history are left alone.
    pub fn set_current_state(&mut self, state: &StateVector) -> Result<(), SimulationError> {
        let run = self.run.as_mut().ok_or(SimulationError::NotInitialized)?;
        run.model.replace_current_state(state)?;
        run.current_state = run.model.current_state()?.clone();
        let state = run.current_state.clone();

        let time = self.time();
        self.emit(SimulationEvent::StateChanged { time, state });
        Ok(())
    }

    /// Swap in a recorded history, e.g. from an import. Time and step count
    /// are left alone.
    pub fn replace_history(&mut self, history: SimulationHistory) -> Result<(), SimulationError> {
        self.run_ref()?;
        debug!(target: "spinnet::state", snapshots = history.len(), "history replaced");
        self.history = history;
        Ok(())
    }

    // ── Queries ────────────────────────────────────

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.run.is_some()
    }

    pub fn current_state(&self) -> Result<&StateVector, SimulationError> {
        Ok(&self.run_ref()?.current_state)
    }

    pub fn initial_state(&self) -> Result<&StateVector, SimulationError> {
        Ok(&self.run_ref()?.initial_state)
    }

    pub fn current_time(&self) -> Result<f64, SimulationError> {
        self.run_ref()?;
        Ok(self.time())
    }

    pub fn history(&self) -> Result<&SimulationHistory, SimulationError> {
        self.run_ref()?;
        Ok(&self.history)
    }

    pub fn is_running(&self) -> Result<bool, SimulationError> {
        self.run_ref()?;
        Ok(self.state == EngineState::Running)
    }

    pub fn graph(&self) -> Result<&SpinNetwork, SimulationError> {
        Ok(&self.run_ref()?.graph)
    }

    pub fn parameters(&self) -> Result<&SimulationParameters, SimulationError> {
        Ok(&self.run_ref()?.params)
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn stability_metrics(&self) -> &StabilityMetrics {
        self.monitor.metrics()
    }
}

/// Initial state per `spec` over the graph's node order.
fn build_initial_state(graph: &SpinNetwork, spec: &InitialStateSpec) -> Result<StateVector, SimulationError> {
    let ids = graph.node_ids();
    let resolve = |id: &Option<String>| -> Result<String, SimulationError> {
        match id {
            Some(id) if graph.contains_node(id) => Ok(id.clone()),
            Some(id) => Err(SimulationError::NodeNotFound(id.clone())),
            None => ids
                .first()
                .cloned()
                .ok_or_else(|| SimulationError::NodeNotFound("<first node>".to_string())),
        }
    };

    let state = match spec {
        InitialStateSpec::Delta { node_id, value } => {
            let id = resolve(node_id)?;
            StateVector::delta(ids.clone(), &id, *value)?
        }
        InitialStateSpec::Uniform { value } => StateVector::uniform(ids.clone(), *value),
        InitialStateSpec::Gaussian { center_node_id, sigma } => {
            let center = resolve(center_node_id)?;
            let positions: HashMap<String, Position> =
                graph.nodes().iter().map(|n| (n.id.clone(), n.position)).collect();
            StateVector::gaussian(ids.clone(), &center, *sigma, &positions)?
        }
        InitialStateSpec::Custom { values } => StateVector::custom(ids.clone(), values.clone())?,
    };
    Ok(state)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
