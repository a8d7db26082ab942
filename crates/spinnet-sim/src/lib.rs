//! `spinnet-sim` — run spin-network diffusion simulations.
//!
//! This crate is the library entry point: it re-exports the graph and
//! diffusion layers and adds the run state machine, history, analysis and
//! persistence on top.
//!
//! ## Crate structure
//!
//! | Module        | Responsibility                                                    |
//! |---------------|-------------------------------------------------------------------|
//! | [`params`]    | [`SimulationParameters`] with JSON and environment loading        |
//! | [`engine`]    | [`SimulationEngine`]: initialize / step / run / pause / reset     |
//! | [`events`]    | typed [`SimulationEvent`]s and the synchronous listener bus       |
//! | [`history`]   | [`SimulationHistory`]: sorted time → state snapshots              |
//! | [`analysis`]  | geometric properties, statistics, conservation checks             |
//! | [`io`]        | JSON / JSONL / CSV export and validated import                    |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use spinnet_sim::{create_line_graph, LineOptions, SimulationEngine, SimulationParameters, TemplateOptions};
//!
//! let graph = create_line_graph(&TemplateOptions::with_nodes(5), LineOptions::default())?;
//! let mut engine = SimulationEngine::new();
//! engine.initialize(graph, SimulationParameters { total_time: 1.0, ..Default::default() })?;
//! let state = engine.run_until(1.0)?;
//! ```

pub mod analysis;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod io;
pub mod params;

// ── Lower layers ──────────────────────────────────────────────────────────────
pub use spinnet_diffusion::{
    create_diffusion_model, solver_for, solver_from_name, DiffusionError, DiffusionModel, DiffusionType,
    ModelParameters, NumericalMethod, NumericalSolver, StabilityConfig, StabilityMetrics, StateData, StateVector,
};
pub use spinnet_graph::{
    create_grid_graph, create_line_graph, create_random_graph, create_ring_graph, create_template_graph, Edge,
    GraphData, GraphError, GraphTemplate, GridOptions, LineOptions, Node, Position, RandomOptions, RingOptions,
    SpinNetwork, SpinType, TemplateOptions, WeightFunction, WeightRegistry,
};

// ── Errors ────────────────────────────────────────────────────────────────────
pub use error::SimulationError;

// ── Engine ────────────────────────────────────────────────────────────────────
pub use engine::{EngineState, SimulationEngine};
pub use events::{EventKind, Listener, ListenerError, ListenerId, SimulationEvent, SimulationEventBus};
pub use history::{HistoryData, SimulationHistory};
pub use params::{InitialStateSpec, SimulationParameters, StabilityParameters};

// ── Analysis ──────────────────────────────────────────────────────────────────
pub use analysis::{
    analyze_history, find_important_nodes, kl_divergence, rate_of_change, ConservationLaw, ConservationReport,
    GeometricProperties, GeometryCalculator, ImportanceCriterion, StateStatistics,
};

// ── Import / export ───────────────────────────────────────────────────────────
pub use io::{
    export_simulation, import_graph, import_parameters, import_simulation, parse_csv_results, to_csv, write_csv,
    write_json, write_jsonl, CsvResults, ExportOptions, ImportedSimulation, SerializedSimulation, ValidationMode,
};
