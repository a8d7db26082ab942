//! # spinnet diffusion experiment
//!
//! Runs a diffusion simulation on a generated spin network and writes one
//! telemetry row per step.
//!
//! ## Usage
//!
//! ```text
//! spinnet-experiment --template line --nodes 20 --diffusion ordinary --steps 500
//! spinnet-experiment --template grid --nodes 36 --diffusion telegraph --dt 0.005
//! spinnet-experiment --template random --seed 7 --export-json run.json
//! ```
//!
//! Parameters not covered by a flag come from `SPINNET_*` environment
//! variables (see `SimulationParameters::from_env`).
//!
//! Output: `telemetry_{template}_{diffusion}.csv` in the current directory
//! unless `--output` is given.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use spinnet_experiment::telemetry::{write_csv, StepRecord};

use spinnet_diffusion::DiffusionType;
use spinnet_graph::{create_template_graph, GraphTemplate, TemplateOptions};
use spinnet_sim::{
    export_simulation, write_json, EventKind, ExportOptions, SimulationEngine, SimulationError, SimulationEvent,
    SimulationParameters,
};

// ─────────────────────────────────────────────
// Experiment configuration
// ─────────────────────────────────────────────

struct ExperimentConfig {
    template: GraphTemplate,
    nodes: usize,
    diffusion: DiffusionType,
    steps: usize,
    dt: Option<f64>,
    seed: Option<u64>,
    output_csv: PathBuf,
    export_json: Option<PathBuf>,
}

// ─────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter("spinnet=info,spinnet_experiment=info")
        .init();

    let config = parse_args();

    tracing::info!(
        template = config.template.label(),
        nodes = config.nodes,
        diffusion = config.diffusion.label(),
        steps = config.steps,
        "Starting diffusion experiment"
    );

    match run(&config) {
        Ok(records) => {
            tracing::info!(
                rows = records,
                output = %config.output_csv.display(),
                "Telemetry written"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Experiment failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ExperimentConfig) -> Result<usize, SimulationError> {
    // 1. Graph
    let template_opts = TemplateOptions { seed: config.seed, ..TemplateOptions::with_nodes(config.nodes) };
    let graph = create_template_graph(config.template, &template_opts)?;
    tracing::info!(nodes = graph.node_count(), edges = graph.edge_count(), "Graph generated");

    // 2. Parameters: environment first, flags on top. The run must not hit
    //    total_time before the requested number of steps.
    let mut params = SimulationParameters::from_env();
    params.diffusion_type = config.diffusion;
    if let Some(dt) = config.dt {
        params.time_step = dt;
    }
    params.total_time = params.total_time.max(config.steps as f64 * params.time_step);

    // 3. Engine + listeners
    let mut engine = SimulationEngine::new();
    let records = Arc::new(Mutex::new(Vec::with_capacity(config.steps)));
    let normalizations = Arc::new(AtomicU64::new(0));

    let counter = Arc::clone(&normalizations);
    engine.subscribe(EventKind::StateNormalized, move |_e: &SimulationEvent| {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    let sink = Arc::clone(&records);
    let counter = Arc::clone(&normalizations);
    engine.subscribe(EventKind::StepComplete, move |e: &SimulationEvent| {
        if let SimulationEvent::StepComplete { time, step, state } = e {
            let record = StepRecord::new(*step, *time, state, counter.load(Ordering::Relaxed));
            sink.lock().map_err(|_| "telemetry buffer poisoned")?.push(record);
        }
        Ok(())
    });

    engine.initialize(graph, params)?;

    // 4. Run
    let final_state = engine.run_steps(config.steps)?;
    tracing::info!(
        time = engine.current_time()?,
        volume = final_state.volume(),
        normalizations = engine.stability_metrics().normalization_count,
        "Run finished"
    );

    // 5. Outputs
    let records = records
        .lock()
        .map_err(|_| SimulationError::Validation(vec!["telemetry buffer poisoned".to_string()]))?
        .clone();
    write_csv(&config.output_csv, &records)?;

    if let Some(path) = &config.export_json {
        let exported = export_simulation(&engine, &ExportOptions::default())?;
        let mut w = BufWriter::new(File::create(path)?);
        write_json(&exported, &mut w)?;
        tracing::info!(path = %path.display(), "Simulation exported");
    }

    Ok(records.len())
}

fn parse_args() -> ExperimentConfig {
    let args: Vec<String> = std::env::args().collect();

    let mut template = GraphTemplate::Line;
    let mut nodes: usize = 10;
    let mut diffusion = DiffusionType::Ordinary;
    let mut steps: usize = 100;
    let mut dt = None;
    let mut seed = None;
    let mut output_csv = None;
    let mut export_json = None;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).map(String::as_str).unwrap_or("");
        match args[i].as_str() {
            "--template" => {
                i += 1;
                template = value.parse().unwrap_or_else(|_| {
                    eprintln!("Unknown template '{value}'. Use: line, ring, grid, random");
                    std::process::exit(1);
                });
            }
            "--nodes" => {
                i += 1;
                nodes = value.parse().unwrap_or(10);
            }
            "--diffusion" => {
                i += 1;
                diffusion = value.parse().unwrap_or_else(|_| {
                    eprintln!("Unknown diffusion type '{value}'. Use: ordinary, telegraph");
                    std::process::exit(1);
                });
            }
            "--steps" => {
                i += 1;
                steps = value.parse().unwrap_or(100);
            }
            "--dt" => {
                i += 1;
                dt = value.parse().ok();
            }
            "--seed" => {
                i += 1;
                seed = value.parse().ok();
            }
            "--output" => {
                i += 1;
                output_csv = Some(PathBuf::from(value));
            }
            "--export-json" => {
                i += 1;
                export_json = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: spinnet-experiment [--template line|ring|grid|random] [--nodes N] \
                     [--diffusion ordinary|telegraph] [--steps N] [--dt X] [--seed S] \
                     [--output PATH] [--export-json PATH]"
                );
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    let output_csv = output_csv
        .unwrap_or_else(|| PathBuf::from(format!("telemetry_{}_{}.csv", template.label(), diffusion.label())));

    ExperimentConfig {
        template,
        nodes,
        diffusion,
        steps,
        dt,
        seed,
        output_csv,
        export_json,
    }
}
