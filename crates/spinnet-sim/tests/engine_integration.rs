//! End-to-end runs of the simulation engine over template graphs.

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use spinnet_diffusion::TelegraphDiffusionModel;
use spinnet_sim::analysis::{ConservationLaw, TotalOccupancy};
use spinnet_sim::{
    analyze_history, create_line_graph, create_ring_graph, rate_of_change, DiffusionModel, DiffusionType, EngineState,
    EventKind, GraphError, InitialStateSpec, LineOptions, RingOptions, SimulationEngine, SimulationEvent,
    SimulationParameters, TemplateOptions,
};

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

fn line_params() -> SimulationParameters {
    SimulationParameters {
        time_step:        0.01,
        total_time:       1.0,
        alpha:            1.0,
        weight_function:  "spin".to_string(),
        initial_state:    InitialStateSpec::Delta { node_id: Some("node1".to_string()), value: 1.0 },
        history_interval: 0.1,
        ..Default::default()
    }
}

fn event_log(engine: &mut SimulationEngine) -> Arc<Mutex<Vec<EventKind>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let log = Arc::clone(&log);
        engine.subscribe(kind, move |e: &SimulationEvent| {
            log.lock().unwrap().push(e.kind());
            Ok(())
        });
    }
    log
}

// ─────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────

#[test]
fn delta_on_line_spreads_over_one_time_unit() {
    let graph = create_line_graph(&TemplateOptions::with_nodes(5), LineOptions::default()).unwrap();
    let mut engine = SimulationEngine::new();
    engine.initialize(graph, line_params()).unwrap();

    let state = engine.run_until(1.0).unwrap();

    assert!((engine.current_time().unwrap() - 1.0).abs() <= 0.01, "time should land on 1.0");
    assert_eq!(engine.state(), EngineState::Completed);
    assert_eq!(state.len(), 5);
    for id in ["node2", "node3", "node4", "node5"] {
        assert!(state.get(id).unwrap().abs() > 0.0, "{id} should have received mass");
    }
    assert!(state.get("node1").unwrap() < 1.0, "the source must have lost mass");

    let history = engine.history().unwrap();
    assert_eq!(history.len(), 11, "t = 0, 0.1, …, 1.0");
    assert_relative_eq!(history.latest().unwrap().0, 1.0, epsilon = 1e-12);
}

#[test]
fn ordinary_run_conserves_total_occupancy_and_smooths() {
    let graph = create_line_graph(&TemplateOptions::with_nodes(5), LineOptions::default()).unwrap();
    let mut engine = SimulationEngine::new();
    engine.initialize(graph, line_params()).unwrap();
    engine.run_until(1.0).unwrap();

    let report = TotalOccupancy::default().check(engine.initial_state().unwrap(), engine.current_state().unwrap());
    assert!(report.conserved, "Σφ is invariant under −L: {report:?}");

    let stats = analyze_history(engine.history().unwrap());
    let maxima: Vec<f64> = stats.iter().map(|(_, s)| s.max).collect();
    assert!(maxima.windows(2).all(|w| w[1] <= w[0] + 1e-12), "max must not grow: {maxima:?}");

    let rates = rate_of_change(engine.history().unwrap()).unwrap();
    assert_eq!(rates.len(), 10);
    assert!(rates.iter().all(|(_, r)| r.is_finite() && *r >= 0.0));
}

#[test]
fn ring_template_enforces_minimum_size() {
    let err = create_ring_graph(&TemplateOptions::with_nodes(2), RingOptions::default()).unwrap_err();
    assert!(matches!(err, GraphError::InvalidTemplate(_)), "got {err:?}");

    let ring = create_ring_graph(&TemplateOptions::with_nodes(3), RingOptions::default()).unwrap();
    assert_eq!(ring.node_count(), 3);
    assert_eq!(ring.edge_count(), 3);
    for node in ring.nodes() {
        assert_eq!(ring.degree(&node.id), 2, "every ring node closes the cycle");
    }
}

#[test]
fn lifecycle_events_arrive_in_order() {
    let graph = create_line_graph(&TemplateOptions::with_nodes(3), LineOptions::default()).unwrap();
    let mut engine = SimulationEngine::new();
    let log = event_log(&mut engine);

    let params = SimulationParameters { time_step: 0.1, total_time: 0.5, ..Default::default() };
    engine.initialize(graph, params).unwrap();
    engine.run_steps(2).unwrap();
    engine.pause();
    assert_eq!(engine.state(), EngineState::Paused);
    engine.resume();
    engine.run_until(10.0).unwrap();

    use EventKind::*;
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            SimulationReset,
            SimulationResumed,
            StepComplete,
            StepComplete,
            SimulationPaused,
            SimulationResumed,
            StepComplete,
            StepComplete,
            StepComplete,
            SimulationComplete,
        ]
    );
    assert_eq!(engine.step_count(), 5);
    assert!(!engine.is_running().unwrap());
}

#[test]
fn telegraph_blow_up_is_normalized_once() {
    let graph = create_line_graph(&TemplateOptions::with_nodes(4), LineOptions::default()).unwrap();
    let mut engine = SimulationEngine::new();
    let normalized = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&normalized);
    engine.subscribe(EventKind::StateNormalized, move |e| {
        if let SimulationEvent::StateNormalized { volume_before, .. } = e {
            sink.lock().unwrap().push(*volume_before);
        }
        Ok(())
    });

    let params = SimulationParameters {
        diffusion_type: DiffusionType::Telegraph,
        time_step:      0.01,
        total_time:     1.0,
        initial_state:  InitialStateSpec::Uniform { value: 1e4 },
        ..Default::default()
    };
    engine.initialize(graph, params).unwrap();
    let state = engine.run_steps(5).unwrap();

    assert_eq!(normalized.lock().unwrap().len(), 1, "only the first step exceeds the threshold");
    assert_relative_eq!(normalized.lock().unwrap()[0], 4e8, max_relative = 1e-9);
    assert_relative_eq!(state.volume(), 1.0, epsilon = 1e-9);
    assert_eq!(engine.stability_metrics().normalization_count, 1);
}

#[test]
fn telegraph_normalization_rescales_velocity_too() {
    let graph = create_line_graph(&TemplateOptions::with_nodes(4), LineOptions::default()).unwrap();
    let params = SimulationParameters {
        diffusion_type: DiffusionType::Telegraph,
        time_step:      0.1,
        total_time:     1.0,
        initial_state:  InitialStateSpec::Delta { node_id: Some("node1".to_string()), value: 1e4 },
        ..Default::default()
    };
    let mut engine = SimulationEngine::new();
    engine.initialize(graph.clone(), params).unwrap();
    let model_params = engine.parameters().unwrap().model_parameters(engine.weight_registry());
    let dt = 0.1;

    // First step by hand: φ₁, v₁, then both scaled by 1/√volume(φ₁).
    let mut free = TelegraphDiffusionModel::new();
    free.initialize(&graph, &model_params).unwrap();
    free.set_initial_state(engine.initial_state().unwrap()).unwrap();
    let phi1 = free.evolve_step(dt).unwrap();
    let v1 = free.current_velocity().unwrap().clone();
    assert!(v1.max_abs() > 0.0, "a delta start must move");
    let factor = 1.0 / phi1.volume().sqrt();

    let mut expected = TelegraphDiffusionModel::new();
    expected.initialize(&graph, &model_params).unwrap();
    expected.set_initial_state(&phi1.scale(factor)).unwrap();
    expected.set_initial_velocity(&v1.scale(factor)).unwrap();
    let phi2 = expected.evolve_step(dt).unwrap();

    let after_one = engine.run_steps(1).unwrap();
    assert_eq!(engine.stability_metrics().normalization_count, 1);
    assert_relative_eq!(after_one.volume(), 1.0, epsilon = 1e-9);

    let after_two = engine.run_steps(1).unwrap();
    assert_eq!(engine.stability_metrics().normalization_count, 1);
    for ((_, got), (_, want)) in after_two.iter().zip(phi2.iter()) {
        assert_relative_eq!(got, want, epsilon = 1e-9);
    }
}

#[test]
fn reset_restores_initial_state_and_time() {
    let graph = create_line_graph(&TemplateOptions::with_nodes(5), LineOptions::default()).unwrap();
    let mut engine = SimulationEngine::new();
    engine.initialize(graph, line_params()).unwrap();
    engine.run_steps(25).unwrap();
    assert!(engine.current_time().unwrap() > 0.0);

    engine.reset().unwrap();
    assert_eq!(engine.current_time().unwrap(), 0.0);
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.current_state().unwrap(), engine.initial_state().unwrap());
    assert_eq!(engine.history().unwrap().times(), &[0.0]);
}
