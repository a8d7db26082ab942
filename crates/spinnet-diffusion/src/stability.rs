//! Stability monitor: blow-up detection and auto-normalization.
//!
//! The monitor measures `volume = Σ φᵢ²` and `max |φᵢ|`. When the volume
//! exceeds the configured threshold it logs a warning and, if
//! auto-normalization is on, rescales the state by `1/√volume` so the
//! returned state has volume `1`.
//!
//! Checks are sampled: [`StabilityMonitor::observe_step`] only runs the check
//! once every `normalize_frequency` steps, so detection can lag by up to
//! `normalize_frequency − 1` steps. [`StabilityMonitor::check`] always runs.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::StateVector;

/// Stability knobs.
///
/// Serialized with the same camelCase keys the simulation parameter bag uses
/// (`stabilityThreshold`, `autoNormalize`, `normalizeFrequency`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StabilityConfig {
    /// Volume above which the state is considered unstable.
    pub stability_threshold: f64,
    pub auto_normalize:      bool,
    /// Steps between sampled checks. `0` and `1` both mean every step.
    pub normalize_frequency: usize,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            stability_threshold: 1e6,
            auto_normalize:      true,
            normalize_frequency: 10,
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone)]
pub struct StabilityCheck {
    /// Volume before any normalization.
    pub volume:     f64,
    pub max_abs:    f64,
    pub exceeded:   bool,
    pub normalized: bool,
    /// The input state, or its normalized replacement.
    pub state:      StateVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationEvent {
    pub time:          f64,
    pub volume_before: f64,
}

/// Running counters exposed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilityMetrics {
    pub normalization_count:     u64,
    pub last_normalization_time: Option<f64>,
    pub max_volume_observed:     f64,
    pub checks_performed:        u64,
}

#[derive(Debug, Clone, Default)]
pub struct StabilityMonitor {
    pub config:          StabilityConfig,
    steps_since_check:   usize,
    metrics:             StabilityMetrics,
    events:              Vec<NormalizationEvent>,
}

impl StabilityMonitor {
    pub fn new(config: StabilityConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn metrics(&self) -> &StabilityMetrics {
        &self.metrics
    }

    pub fn events(&self) -> &[NormalizationEvent] {
        &self.events
    }

    /// Count one completed step; run [`check`](Self::check) when the sampling
    /// counter reaches `normalize_frequency`, then restart the counter.
    pub fn observe_step(&mut self, state: &StateVector, time: f64) -> Option<StabilityCheck> {
        self.steps_since_check += 1;
        if self.steps_since_check < self.config.normalize_frequency.max(1) {
            return None;
        }
        self.steps_since_check = 0;
        Some(self.check(state, time))
    }

    /// Measure `state` and normalize it if it has blown past the threshold.
    pub fn check(&mut self, state: &StateVector, time: f64) -> StabilityCheck {
        let volume = state.volume();
        let max_abs = state.max_abs();
        let threshold = self.config.stability_threshold;

        self.metrics.checks_performed += 1;
        if volume > self.metrics.max_volume_observed {
            self.metrics.max_volume_observed = volume;
        }

        let exceeded = volume > threshold || !volume.is_finite();
        if !exceeded {
            return StabilityCheck { volume, max_abs, exceeded, normalized: false, state: state.clone() };
        }

        warn!(target: "spinnet::stability", volume, max_abs, threshold, time, "state volume exceeded stability threshold");

        if !self.config.auto_normalize || !volume.is_finite() || volume <= 0.0 {
            return StabilityCheck { volume, max_abs, exceeded, normalized: false, state: state.clone() };
        }

        let factor = 1.0 / volume.sqrt();
        let normalized = state.scale(factor);
        self.metrics.normalization_count += 1;
        self.metrics.last_normalization_time = Some(time);
        self.events.push(NormalizationEvent { time, volume_before: volume });

        debug!(
            target: "spinnet::stability",
            count = self.metrics.normalization_count,
            time,
            "state normalized"
        );

        StabilityCheck { volume, max_abs, exceeded, normalized: true, state: normalized }
    }

    /// Clear counters, events and the sampling phase. Keeps the config.
    pub fn reset(&mut self) {
        self.steps_since_check = 0;
        self.metrics = StabilityMetrics::default();
        self.events.clear();
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
