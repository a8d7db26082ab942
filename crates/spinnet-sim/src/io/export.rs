//! Snapshot of a run as a self-describing JSON document.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use spinnet_diffusion::{DiffusionType, StateData, StateVector};
use spinnet_graph::GraphData;
use tracing::debug;
use uuid::Uuid;

use crate::analysis::{GeometryCalculator, StateStatistics};
use crate::engine::SimulationEngine;
use crate::error::SimulationError;
use crate::history::HistoryData;
use crate::params::SimulationParameters;

pub const FORMAT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub include_graph:                bool,
    pub include_parameters:           bool,
    pub include_history:              bool,
    pub include_geometric_properties: bool,
    pub include_statistics:           bool,
    /// Keep every k-th snapshot by index.
    pub history_stride:               Option<usize>,
    /// Thin (after the stride) to roughly this many snapshots.
    pub max_history_states:           Option<usize>,
    /// Decimal places kept for state values, properties and statistics.
    pub precision:                    u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_graph:                true,
            include_parameters:           true,
            include_history:              true,
            include_geometric_properties: true,
            include_statistics:           true,
            history_stride:               None,
            max_history_states:           None,
            precision:                    6,
        }
    }
}

/// `{time, properties: {name: value}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySample {
    pub time:       f64,
    pub properties: BTreeMap<String, f64>,
}

/// `{time, statistics: {name: value}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSample {
    pub time:       f64,
    pub statistics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub run_id:         Uuid,
    pub node_count:     usize,
    pub edge_count:     usize,
    pub step_count:     u64,
    pub current_time:   f64,
    pub diffusion_type: DiffusionType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedSimulation {
    #[serde(default)]
    pub version:              String,
    #[serde(default)]
    pub exported_at:          String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters:           Option<SimulationParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph:                Option<GraphData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history:              Option<HistoryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometric_properties: Option<Vec<PropertySample>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics:           Option<Vec<StatisticsSample>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata:             Option<ExportMetadata>,
}

impl SerializedSimulation {
    pub fn to_json_string(&self) -> Result<String, SimulationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ── Export ───────────────────────────────────────────────────────────────────

/// Serialize the engine's current run.
pub fn export_simulation(engine: &SimulationEngine, opts: &ExportOptions) -> Result<SerializedSimulation, SimulationError> {
    let graph = engine.graph()?;
    let params = engine.parameters()?;
    let history = engine.history()?;

    let kept = sample_indices(history.len(), opts);
    let snapshots: Vec<(f64, &StateVector)> = kept
        .iter()
        .filter_map(|&i| history.times().get(i).copied().zip(history.states().get(i)))
        .collect();

    let history_data = opts.include_history.then(|| HistoryData {
        times:  snapshots.iter().map(|(t, _)| *t).collect(),
        states: snapshots
            .iter()
            .map(|(_, s)| StateData {
                node_ids: s.node_ids().to_vec(),
                values:   s.values().iter().map(|&v| round_to(v, opts.precision)).collect(),
            })
            .collect(),
    });

    let geometric_properties = opts.include_geometric_properties.then(|| {
        let weight = engine.weight_registry().resolve(&params.weight_function);
        let calculator = GeometryCalculator::new(graph, &weight);
        snapshots
            .iter()
            .map(|(t, s)| PropertySample {
                time:       *t,
                properties: rounded_map(&calculator.properties(s).as_named(), opts.precision),
            })
            .collect()
    });

    let statistics = opts.include_statistics.then(|| {
        snapshots
            .iter()
            .map(|(t, s)| StatisticsSample {
                time:       *t,
                statistics: rounded_map(&StateStatistics::from_state(s).as_named(), opts.precision),
            })
            .collect()
    });

    let metadata = ExportMetadata {
        run_id:         Uuid::new_v4(),
        node_count:     graph.node_count(),
        edge_count:     graph.edge_count(),
        step_count:     engine.step_count(),
        current_time:   engine.current_time()?,
        diffusion_type: params.diffusion_type,
    };
    debug!(
        target: "spinnet::general",
        run_id = %metadata.run_id,
        snapshots = snapshots.len(),
        "simulation exported"
    );

    Ok(SerializedSimulation {
        version:     FORMAT_VERSION.to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        parameters:  opts.include_parameters.then(|| params.clone()),
        graph:       opts.include_graph.then(|| graph.to_graph_data()),
        history:     history_data,
        geometric_properties,
        statistics,
        metadata:    Some(metadata),
    })
}

/// Pretty JSON document.
pub fn write_json<W: Write>(data: &SerializedSimulation, writer: &mut W) -> Result<(), SimulationError> {
    serde_json::to_writer_pretty(&mut *writer, data)?;
    writeln!(writer)?;
    Ok(())
}

/// One JSON object per line, tagged by `type`: parameters, graph, one
/// `state` line per snapshot, then property and statistics samples.
pub fn write_jsonl<W: Write>(data: &SerializedSimulation, writer: &mut W) -> Result<usize, SimulationError> {
    let mut lines = 0;
    let mut emit = |value: serde_json::Value, writer: &mut W| -> Result<(), SimulationError> {
        serde_json::to_writer(&mut *writer, &value)?;
        writeln!(writer)?;
        lines += 1;
        Ok(())
    };

    if let Some(params) = &data.parameters {
        emit(serde_json::json!({ "type": "parameters", "data": params }), &mut *writer)?;
    }
    if let Some(graph) = &data.graph {
        emit(serde_json::json!({ "type": "graph", "data": graph }), &mut *writer)?;
    }
    if let Some(history) = &data.history {
        for (time, state) in history.times.iter().zip(&history.states) {
            emit(
                serde_json::json!({
                    "type": "state",
                    "time": time,
                    "nodeIds": state.node_ids,
                    "values": state.values,
                }),
                &mut *writer,
            )?;
        }
    }
    for sample in data.geometric_properties.iter().flatten() {
        emit(
            serde_json::json!({ "type": "geometricProperties", "time": sample.time, "properties": sample.properties }),
            &mut *writer,
        )?;
    }
    for sample in data.statistics.iter().flatten() {
        emit(
            serde_json::json!({ "type": "statistics", "time": sample.time, "statistics": sample.statistics }),
            &mut *writer,
        )?;
    }
    Ok(lines)
}

/// Indices surviving the stride and then the max-count thinning.
fn sample_indices(len: usize, opts: &ExportOptions) -> Vec<usize> {
    let stride = opts.history_stride.unwrap_or(1).max(1);
    let mut kept: Vec<usize> = (0..len).step_by(stride).collect();
    if let Some(max) = opts.max_history_states.filter(|&m| m > 0) {
        if kept.len() > max {
            let step = kept.len().div_ceil(max);
            kept = kept.into_iter().step_by(step).collect();
        }
    }
    kept
}

pub(crate) fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() { rounded } else { value }
}

fn rounded_map(named: &[(&'static str, f64)], precision: u32) -> BTreeMap<String, f64> {
    named
        .iter()
        .map(|&(name, v)| (name.to_string(), round_to(v, precision)))
        .collect()
}
