//! Simulation parameters and their JSON / environment surfaces.
//!
//! The JSON shape uses the camelCase keys of the parameter object the editor
//! sends (`timeStep`, `diffusionType`, `initialStateType`, ...). Stability
//! knobs live in the free-form `parameters` bag:
//!
//! | Key                  | Default | Meaning                                  |
//! |----------------------|---------|------------------------------------------|
//! | `stabilityThreshold` | `1e6`   | volume above which the state is unstable |
//! | `autoNormalize`      | `true`  | rescale to unit volume when unstable     |
//! | `normalizeFrequency` | `10`    | steps between sampled checks             |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spinnet_diffusion::{DiffusionType, ModelParameters, NumericalMethod, StabilityConfig};
use spinnet_graph::WeightRegistry;

use crate::error::SimulationError;

pub const STABILITY_THRESHOLD_KEY: &str = "stabilityThreshold";
pub const AUTO_NORMALIZE_KEY: &str = "autoNormalize";
pub const NORMALIZE_FREQUENCY_KEY: &str = "normalizeFrequency";

/// Stability knobs as read from the `parameters` bag.
pub type StabilityParameters = StabilityConfig;

// ─────────────────────────────────────────────
// InitialStateSpec
// ─────────────────────────────────────────────

/// How the engine builds the state at `initialize`.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialStateSpec {
    /// `value` at one node, zero elsewhere. `None` means the first node.
    Delta { node_id: Option<String>, value: f64 },
    Uniform { value: f64 },
    /// Normalized Gaussian over node positions. `None` means the first node.
    Gaussian { center_node_id: Option<String>, sigma: f64 },
    /// Explicit values in graph node order.
    Custom { values: Vec<f64> },
}

impl Default for InitialStateSpec {
    fn default() -> Self {
        Self::Delta { node_id: None, value: 1.0 }
    }
}

fn one() -> f64 {
    1.0
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeltaParams {
    node_id: Option<String>,
    #[serde(default = "one")]
    value:   f64,
}

#[derive(Deserialize)]
struct UniformParams {
    #[serde(default = "one")]
    value: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GaussianParams {
    center_node_id: Option<String>,
    #[serde(default = "one")]
    sigma:          f64,
}

#[derive(Deserialize)]
struct CustomParams {
    values: Vec<f64>,
}

impl InitialStateSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Delta { .. } => "delta",
            Self::Uniform { .. } => "uniform",
            Self::Gaussian { .. } => "gaussian",
            Self::Custom { .. } => "custom",
        }
    }

    /// `initialStateParams` object for this spec.
    pub fn params_json(&self) -> Value {
        let mut m = Map::new();
        match self {
            Self::Delta { node_id, value } => {
                if let Some(id) = node_id {
                    m.insert("nodeId".into(), Value::from(id.clone()));
                }
                m.insert("value".into(), Value::from(*value));
            }
            Self::Uniform { value } => {
                m.insert("value".into(), Value::from(*value));
            }
            Self::Gaussian { center_node_id, sigma } => {
                if let Some(id) = center_node_id {
                    m.insert("centerNodeId".into(), Value::from(id.clone()));
                }
                m.insert("sigma".into(), Value::from(*sigma));
            }
            Self::Custom { values } => {
                m.insert("values".into(), Value::from(values.clone()));
            }
        }
        Value::Object(m)
    }

    /// Build from `initialStateType` + `initialStateParams`.
    pub fn from_parts(kind: &str, params: &Value) -> Result<Self, SimulationError> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        match kind {
            "delta" => {
                let p: DeltaParams = serde_json::from_value(params)?;
                Ok(Self::Delta { node_id: p.node_id, value: p.value })
            }
            "uniform" => {
                let p: UniformParams = serde_json::from_value(params)?;
                Ok(Self::Uniform { value: p.value })
            }
            "gaussian" => {
                let p: GaussianParams = serde_json::from_value(params)?;
                Ok(Self::Gaussian { center_node_id: p.center_node_id, sigma: p.sigma })
            }
            "custom" => {
                let p: CustomParams = serde_json::from_value(params)?;
                Ok(Self::Custom { values: p.values })
            }
            other => Err(SimulationError::UnknownEnumValue { kind: "initialStateType", value: other.to_string() }),
        }
    }
}

// ─────────────────────────────────────────────
// Wire form
// ─────────────────────────────────────────────

/// JSON shape with enum tags kept as strings so that unknown values can be
/// reported as typed errors instead of generic decode failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ParametersWire {
    time_step:            f64,
    total_time:           f64,
    diffusion_type:       String,
    alpha:                f64,
    beta:                 f64,
    c:                    f64,
    numerical_method:     String,
    weight_function:      String,
    initial_state_type:   String,
    initial_state_params: Value,
    record_history:       bool,
    history_interval:     f64,
    parameters:           Map<String, Value>,
}

impl Default for ParametersWire {
    fn default() -> Self {
        SimulationParameters::default().into()
    }
}

impl From<SimulationParameters> for ParametersWire {
    fn from(p: SimulationParameters) -> Self {
        Self {
            time_step:            p.time_step,
            total_time:           p.total_time,
            diffusion_type:       p.diffusion_type.label().to_string(),
            alpha:                p.alpha,
            beta:                 p.beta,
            c:                    p.c,
            numerical_method:     p.numerical_method.label().to_string(),
            weight_function:      p.weight_function,
            initial_state_type:   p.initial_state.type_name().to_string(),
            initial_state_params: p.initial_state.params_json(),
            record_history:       p.record_history,
            history_interval:     p.history_interval,
            parameters:           p.parameters,
        }
    }
}

impl TryFrom<ParametersWire> for SimulationParameters {
    type Error = SimulationError;

    fn try_from(w: ParametersWire) -> Result<Self, Self::Error> {
        let diffusion_type = w
            .diffusion_type
            .parse::<DiffusionType>()
            .map_err(|_| SimulationError::UnknownEnumValue { kind: "diffusionType", value: w.diffusion_type.clone() })?;

        Ok(Self {
            time_step:        w.time_step,
            total_time:       w.total_time,
            diffusion_type,
            alpha:            w.alpha,
            beta:             w.beta,
            c:                w.c,
            numerical_method: NumericalMethod::from_name(&w.numerical_method),
            weight_function:  w.weight_function,
            initial_state:    InitialStateSpec::from_parts(&w.initial_state_type, &w.initial_state_params)?,
            record_history:   w.record_history,
            history_interval: w.history_interval,
            parameters:       w.parameters,
        })
    }
}

// ─────────────────────────────────────────────
// SimulationParameters
// ─────────────────────────────────────────────

/// Everything a run needs besides the graph. Fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParametersWire", into = "ParametersWire")]
pub struct SimulationParameters {
    pub time_step:        f64,
    pub total_time:       f64,
    pub diffusion_type:   DiffusionType,
    /// Ordinary diffusion coefficient.
    pub alpha:            f64,
    /// Telegraph damping.
    pub beta:             f64,
    /// Telegraph wave speed.
    pub c:                f64,
    pub numerical_method: NumericalMethod,
    /// Weight-function name, resolved through a [`WeightRegistry`].
    pub weight_function:  String,
    pub initial_state:    InitialStateSpec,
    pub record_history:   bool,
    /// Time between recorded history snapshots.
    pub history_interval: f64,
    /// Extensibility bag (stability knobs live here).
    pub parameters:       Map<String, Value>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            time_step:        0.01,
            total_time:       10.0,
            diffusion_type:   DiffusionType::Ordinary,
            alpha:            1.0,
            beta:             0.5,
            c:                1.0,
            numerical_method: NumericalMethod::Euler,
            weight_function:  "spin".to_string(),
            initial_state:    InitialStateSpec::default(),
            record_history:   true,
            history_interval: 10.0,
            parameters:       Map::new(),
        }
    }
}

impl SimulationParameters {
    /// Defaults overlaid with `SPINNET_*` environment variables. Each variable
    /// is parsed on its own; unparseable values keep the default.
    pub fn from_env() -> Self {
        fn env_f64(key: &str, default: f64) -> f64 {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn env_usize(key: &str, default: usize) -> usize {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }

        let d = Self::default();
        let stability = StabilityConfig::default();

        let mut parameters = Map::new();
        parameters.insert(
            STABILITY_THRESHOLD_KEY.into(),
            Value::from(env_f64("SPINNET_STABILITY_THRESHOLD", stability.stability_threshold)),
        );
        parameters.insert(AUTO_NORMALIZE_KEY.into(), Value::from(stability.auto_normalize));
        parameters.insert(
            NORMALIZE_FREQUENCY_KEY.into(),
            Value::from(env_usize("SPINNET_NORMALIZE_FREQUENCY", stability.normalize_frequency)),
        );

        Self {
            time_step:        env_f64("SPINNET_TIME_STEP", d.time_step),
            total_time:       env_f64("SPINNET_TOTAL_TIME", d.total_time),
            diffusion_type:   env_parse("SPINNET_DIFFUSION_TYPE", d.diffusion_type),
            alpha:            env_f64("SPINNET_ALPHA", d.alpha),
            beta:             env_f64("SPINNET_BETA", d.beta),
            c:                env_f64("SPINNET_C", d.c),
            numerical_method: env_parse("SPINNET_NUMERICAL_METHOD", d.numerical_method),
            weight_function:  std::env::var("SPINNET_WEIGHT_FUNCTION").unwrap_or(d.weight_function),
            history_interval: env_f64("SPINNET_HISTORY_INTERVAL", d.history_interval),
            parameters,
            ..d
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SimulationError> {
        let wire: ParametersWire = serde_json::from_str(json)?;
        Self::try_from(wire)
    }

    pub fn from_json_value(value: Value) -> Result<Self, SimulationError> {
        let wire: ParametersWire = serde_json::from_value(value)?;
        Self::try_from(wire)
    }

    pub fn to_json_string(&self) -> Result<String, SimulationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Stability knobs from the bag; absent or mistyped keys use defaults.
    pub fn stability(&self) -> StabilityParameters {
        let d = StabilityConfig::default();
        let bag = &self.parameters;
        StabilityConfig {
            stability_threshold: bag.get(STABILITY_THRESHOLD_KEY).and_then(Value::as_f64).unwrap_or(d.stability_threshold),
            auto_normalize:      bag.get(AUTO_NORMALIZE_KEY).and_then(Value::as_bool).unwrap_or(d.auto_normalize),
            normalize_frequency: bag
                .get(NORMALIZE_FREQUENCY_KEY)
                .and_then(Value::as_u64)
                .map(|v| v as usize)
                .unwrap_or(d.normalize_frequency),
        }
    }

    /// Write the default stability knobs into the bag where absent.
    pub fn with_stability_defaults(mut self) -> Self {
        let d = StabilityConfig::default();
        self.parameters.entry(STABILITY_THRESHOLD_KEY).or_insert_with(|| Value::from(d.stability_threshold));
        self.parameters.entry(AUTO_NORMALIZE_KEY).or_insert_with(|| Value::from(d.auto_normalize));
        self.parameters.entry(NORMALIZE_FREQUENCY_KEY).or_insert_with(|| Value::from(d.normalize_frequency));
        self
    }

    /// Model coefficients, with the weight function resolved in `registry`.
    pub fn model_parameters(&self, registry: &WeightRegistry) -> ModelParameters {
        ModelParameters {
            alpha:            self.alpha,
            beta:             self.beta,
            c:                self.c,
            weight:           registry.resolve(&self.weight_function),
            numerical_method: self.numerical_method,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let mut errors = Vec::new();
        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            errors.push(format!("timeStep must be positive and finite, got {}", self.time_step));
        }
        if !(self.total_time >= 0.0 && self.total_time.is_finite()) {
            errors.push(format!("totalTime must be non-negative and finite, got {}", self.total_time));
        }
        if !(self.history_interval > 0.0 && self.history_interval.is_finite()) {
            errors.push(format!("historyInterval must be positive and finite, got {}", self.history_interval));
        }
        if let InitialStateSpec::Gaussian { sigma, .. } = self.initial_state {
            if !(sigma > 0.0 && sigma.is_finite()) {
                errors.push(format!("gaussian sigma must be positive and finite, got {sigma}"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SimulationError::Validation(errors))
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
