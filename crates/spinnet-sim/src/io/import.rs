//! Loading exported documents back into typed values.
//!
//! Every entry point checks the raw JSON shape first and then reports the
//! problems according to [`ValidationMode`]. Typed decoding runs afterwards
//! regardless of the mode, so structurally broken input still fails there.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use spinnet_graph::SpinNetwork;
use tracing::{info, warn};

use crate::engine::SimulationEngine;
use crate::error::SimulationError;
use crate::history::SimulationHistory;
use crate::io::export::SerializedSimulation;
use crate::params::SimulationParameters;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    /// Fail with [`SimulationError::Validation`].
    #[default]
    Error,
    /// Log the collected messages and carry on.
    Warn,
    /// Skip the checks.
    Ignore,
}

impl ValidationMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Ignore => "ignore",
        }
    }
}

impl FromStr for ValidationMode {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "ignore" => Ok(Self::Ignore),
            _ => Err(SimulationError::UnknownEnumValue { kind: "validationMode", value: s.to_string() }),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decoded document plus the runtime values rebuilt from it.
#[derive(Debug, Clone)]
pub struct ImportedSimulation {
    pub data:       SerializedSimulation,
    pub graph:      Option<SpinNetwork>,
    pub parameters: Option<SimulationParameters>,
    pub history:    Option<SimulationHistory>,
}

impl ImportedSimulation {
    /// Fresh engine initialized on the imported graph and parameters, with
    /// the imported history installed and the latest snapshot as the
    /// current state. Time restarts at 0.
    pub fn into_engine(self) -> Result<SimulationEngine, SimulationError> {
        let graph = self
            .graph
            .ok_or_else(|| SimulationError::Validation(vec!["import has no graph section".to_string()]))?;
        let parameters = self
            .parameters
            .ok_or_else(|| SimulationError::Validation(vec!["import has no parameters section".to_string()]))?;

        let mut engine = SimulationEngine::new();
        engine.initialize(graph, parameters)?;
        if let Some(history) = self.history {
            let latest = history.latest().map(|(_, s)| s.clone());
            engine.replace_history(history)?;
            if let Some(state) = latest {
                engine.set_current_state(&state)?;
            }
        }
        Ok(engine)
    }
}

// ── Import ───────────────────────────────────────────────────────────────────

pub fn import_simulation(json: &str, mode: ValidationMode) -> Result<ImportedSimulation, SimulationError> {
    let raw: Value = serde_json::from_str(json)?;
    report("simulation", check_simulation(&raw), mode)?;

    let data: SerializedSimulation = serde_json::from_value(raw)?;
    let graph = data.graph.clone().map(SpinNetwork::from_graph_data).transpose()?;
    let history = data.history.clone().map(SimulationHistory::from_data).transpose()?;
    let parameters = data.parameters.clone();

    info!(
        target: "spinnet::general",
        version = %data.version,
        graph = graph.is_some(),
        snapshots = history.as_ref().map_or(0, SimulationHistory::len),
        "simulation imported"
    );
    Ok(ImportedSimulation { data, graph, parameters, history })
}

/// A bare `{nodes, edges}` document. Reference errors surface from
/// [`SpinNetwork`] construction.
pub fn import_graph(json: &str, mode: ValidationMode) -> Result<SpinNetwork, SimulationError> {
    let raw: Value = serde_json::from_str(json)?;
    report("graph", check_graph(&raw), mode)?;
    Ok(SpinNetwork::from_json(json)?)
}

/// Either a bare parameter object or a document with a `parameters` field.
/// A bare object's own `parameters` bag is not mistaken for the wrapper.
pub fn import_parameters(json: &str, mode: ValidationMode) -> Result<SimulationParameters, SimulationError> {
    let mut raw: Value = serde_json::from_str(json)?;
    if raw.get("timeStep").is_none() {
        if let Some(inner) = raw.get_mut("parameters").map(Value::take) {
            raw = inner;
        }
    }
    report("parameters", check_parameters(&raw), mode)?;
    SimulationParameters::from_json_value(raw)
}

fn report(section: &str, errors: Vec<String>, mode: ValidationMode) -> Result<(), SimulationError> {
    if errors.is_empty() {
        return Ok(());
    }
    match mode {
        ValidationMode::Error => Err(SimulationError::Validation(errors)),
        ValidationMode::Warn => {
            warn!(target: "spinnet::general", section, errors = %errors.join("; "), "import validation failed");
            Ok(())
        }
        ValidationMode::Ignore => Ok(()),
    }
}

// ── Shape checks ─────────────────────────────────────────────────────────────

fn check_simulation(raw: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if !is_present(raw.get("version")) {
        errors.push("Missing version field".to_string());
    }
    if !is_present(raw.get("exportedAt")) {
        errors.push("Missing exportedAt field".to_string());
    }

    let graph = raw.get("graph").filter(|v| !v.is_null());
    let history = raw.get("history").filter(|v| !v.is_null());
    if graph.is_none() && history.is_none() && raw.get("parameters").filter(|v| !v.is_null()).is_none() {
        errors.push("Missing required sections: at least one of graph, parameters, or history must be present".to_string());
    }

    if let Some(history) = history {
        let times = history.get("times").and_then(Value::as_array);
        let states = history.get("states").and_then(Value::as_array);
        if times.is_none() {
            errors.push("Invalid history format: times should be an array".to_string());
        }
        match states {
            None => errors.push("Invalid history format: states should be an array".to_string()),
            Some(states) => {
                for (i, state) in states.iter().enumerate() {
                    let ok = state.get("nodeIds").is_some_and(Value::is_array)
                        && state.get("values").is_some_and(Value::is_array);
                    if !ok {
                        errors.push(format!("Invalid history state {i}: nodeIds and values should be arrays"));
                    }
                }
            }
        }
        if let (Some(t), Some(s)) = (times, states) {
            if t.len() != s.len() {
                errors.push("Invalid history format: times and states arrays should have the same length".to_string());
            }
        }
    }

    if let Some(graph) = graph {
        if !graph.get("nodes").is_some_and(Value::is_array) {
            errors.push("Invalid graph format: nodes should be an array".to_string());
        }
        if !graph.get("edges").is_some_and(Value::is_array) {
            errors.push("Invalid graph format: edges should be an array".to_string());
        }
    }
    errors
}

fn check_graph(raw: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    match raw.get("nodes").and_then(Value::as_array) {
        None => errors.push("Missing or invalid nodes array".to_string()),
        Some(nodes) => {
            for (i, node) in nodes.iter().enumerate() {
                if !is_present(node.get("id")) {
                    errors.push(format!("Node at index {i} is missing required 'id' field"));
                }
            }
        }
    }
    match raw.get("edges").and_then(Value::as_array) {
        None => errors.push("Missing or invalid edges array".to_string()),
        Some(edges) => {
            for (i, edge) in edges.iter().enumerate() {
                for field in ["id", "sourceId", "targetId"] {
                    if !is_present(edge.get(field)) {
                        errors.push(format!("Edge at index {i} is missing required '{field}' field"));
                    }
                }
            }
        }
    }
    errors
}

fn check_parameters(raw: &Value) -> Vec<String> {
    if !raw.is_object() {
        return vec!["Parameters must be an object".to_string()];
    }
    ["timeStep", "totalTime", "diffusionType"]
        .into_iter()
        .filter(|key| raw.get(key).is_none())
        .map(|key| format!("Missing required parameter: {key}"))
        .collect()
}

/// Present and not null or an empty string.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── Simulation documents ─────────────────────

    #[test]
    fn empty_document_reports_every_missing_piece() {
        let err = import_simulation("{}", ValidationMode::Error).unwrap_err();
        match err {
            SimulationError::Validation(msgs) => {
                assert_eq!(msgs.len(), 3, "version, exportedAt, sections: {msgs:?}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn history_length_mismatch_is_caught() {
        let doc = json!({
            "version": "1.0.0",
            "exportedAt": "now",
            "history": { "times": [0.0, 1.0], "states": [{ "nodeIds": ["a"], "values": [1.0] }] }
        });
        let errors = check_simulation(&doc);
        assert!(errors.iter().any(|e| e.contains("same length")), "{errors:?}");
    }

    #[test]
    fn ignore_mode_still_decodes_what_it_can() {
        let doc = json!({ "parameters": { "timeStep": 0.1, "totalTime": 1.0, "diffusionType": "telegraph" } });
        let imported = import_simulation(&doc.to_string(), ValidationMode::Ignore).unwrap();
        assert!(imported.graph.is_none());
        assert_eq!(imported.parameters.unwrap().time_step, 0.1);

        let warned = import_simulation(&doc.to_string(), ValidationMode::Warn);
        assert!(warned.is_ok());
        assert!(import_simulation(&doc.to_string(), ValidationMode::Error).is_err());
    }

    // ── Graph documents ──────────────────────────

    #[test]
    fn graph_checks_edge_fields() {
        let doc = json!({ "nodes": [{ "id": "a" }, {}], "edges": [{ "id": "e1", "sourceId": "a" }] });
        let errors = check_graph(&doc);
        assert_eq!(errors, vec![
            "Node at index 1 is missing required 'id' field".to_string(),
            "Edge at index 0 is missing required 'targetId' field".to_string(),
        ]);
    }

    #[test]
    fn graph_reference_errors_surface_after_validation() {
        let doc = json!({
            "nodes": [{ "id": "a" }],
            "edges": [{ "id": "e1", "sourceId": "a", "targetId": "ghost", "spin": 0.5 }]
        });
        assert!(import_graph(&doc.to_string(), ValidationMode::Error).is_err());
    }

    // ── Parameter documents ──────────────────────

    #[test]
    fn parameters_accept_wrapped_or_bare_objects() {
        let bare = json!({ "timeStep": 0.05, "totalTime": 2.0, "diffusionType": "ordinary" });
        let wrapped = json!({ "parameters": bare.clone() });
        let a = import_parameters(&bare.to_string(), ValidationMode::Error).unwrap();
        let b = import_parameters(&wrapped.to_string(), ValidationMode::Error).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_time, 2.0);

        let with_bag = json!({ "timeStep": 0.05, "totalTime": 2.0, "diffusionType": "ordinary", "parameters": { "stabilityThreshold": 10.0 } });
        let c = import_parameters(&with_bag.to_string(), ValidationMode::Error).unwrap();
        assert_eq!(c.parameters.get("stabilityThreshold"), Some(&json!(10.0)));
    }

    #[test]
    fn parameters_missing_fields_are_listed() {
        let err = import_parameters(r#"{"alpha": 2.0}"#, ValidationMode::Error).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation errors:\nMissing required parameter: timeStep\nMissing required parameter: totalTime\nMissing required parameter: diffusionType"
        );
    }

    #[test]
    fn validation_mode_parses() {
        assert_eq!("warn".parse::<ValidationMode>().unwrap(), ValidationMode::Warn);
        assert!("loud".parse::<ValidationMode>().is_err());
    }
}
