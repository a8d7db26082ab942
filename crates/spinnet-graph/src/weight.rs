//! Edge-weight functions: spin label `j` → diffusion coupling `w`.
//!
//! | Name        | Formula            |
//! |-------------|--------------------|
//! | `spin`      | `j`                |
//! | `casimir`   | `j(j+1)`           |
//! | `dimension` | `2j+1`             |
//! | `area`      | `√(j(j+1))`        |
//!
//! Named lookup is a *policy* choice: an unknown name degrades to `spin`
//! with a warning instead of failing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::GraphError;
use crate::model::Edge;

/// Signature of a user-registered weight function.
pub type WeightFn = dyn Fn(&Edge) -> f64 + Send + Sync;

// ─────────────────────────────────────────────
// WeightFunction
// ─────────────────────────────────────────────

#[derive(Clone)]
pub enum WeightFunction {
    Spin,
    Casimir,
    Dimension,
    Area,
    Custom { name: String, f: Arc<WeightFn> },
}

impl WeightFunction {
    pub const BUILTIN_NAMES: [&'static str; 4] = ["spin", "casimir", "dimension", "area"];

    /// Weight of a single edge.
    #[inline]
    pub fn weight(&self, edge: &Edge) -> f64 {
        let j = edge.spin;
        match self {
            Self::Spin => j,
            Self::Casimir => j * (j + 1.0),
            Self::Dimension => 2.0 * j + 1.0,
            Self::Area => (j * (j + 1.0)).sqrt(),
            Self::Custom { f, .. } => f(edge),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Spin => "spin",
            Self::Casimir => "casimir",
            Self::Dimension => "dimension",
            Self::Area => "area",
            Self::Custom { name, .. } => name,
        }
    }

    /// Built-in lookup, exact match only.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "spin" => Some(Self::Spin),
            "casimir" => Some(Self::Casimir),
            "dimension" => Some(Self::Dimension),
            "area" => Some(Self::Area),
            _ => None,
        }
    }

    /// Built-in lookup with the `spin` fallback.
    pub fn from_name(name: &str) -> Self {
        Self::builtin(name).unwrap_or_else(|| {
            warn!(target: "spinnet::model", name, "unknown weight function, falling back to spin");
            Self::Spin
        })
    }
}

impl Default for WeightFunction {
    fn default() -> Self {
        Self::Spin
    }
}

impl fmt::Debug for WeightFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
            other => f.write_str(other.name()),
        }
    }
}

// ─────────────────────────────────────────────
// WeightRegistry
// ─────────────────────────────────────────────

/// Name → weight function table. Names are validated when registered, so a
/// lookup can only ever miss, never observe a malformed entry.
#[derive(Debug, Clone, Default)]
pub struct WeightRegistry {
    custom: HashMap<String, WeightFunction>,
}

impl WeightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom function under `name`.
    ///
    /// Fails for empty names and for names that shadow a built-in.
    /// Re-registering a custom name replaces the previous entry.
    pub fn register<F>(&mut self, name: &str, f: F) -> Result<(), GraphError>
    where
        F: Fn(&Edge) -> f64 + Send + Sync + 'static,
    {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(GraphError::InvalidWeightFunction("name must not be empty".into()));
        }
        if WeightFunction::BUILTIN_NAMES.contains(&trimmed) {
            return Err(GraphError::InvalidWeightFunction(format!(
                "'{trimmed}' is a built-in weight function"
            )));
        }
        self.custom.insert(
            trimmed.to_string(),
            WeightFunction::Custom { name: trimmed.to_string(), f: Arc::new(f) },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        WeightFunction::builtin(name).is_some() || self.custom.contains_key(name)
    }

    /// Every resolvable name: built-ins first, then custom names sorted.
    pub fn names(&self) -> Vec<String> {
        let mut custom: Vec<String> = self.custom.keys().cloned().collect();
        custom.sort();
        WeightFunction::BUILTIN_NAMES
            .iter()
            .map(|s| s.to_string())
            .chain(custom)
            .collect()
    }

    /// Resolve a name, falling back to `spin` with a warning.
    pub fn resolve(&self, name: &str) -> WeightFunction {
        if let Some(w) = WeightFunction::builtin(name) {
            return w;
        }
        if let Some(w) = self.custom.get(name) {
            return w.clone();
        }
        warn!(target: "spinnet::model", name, "unknown weight function, falling back to spin");
        WeightFunction::Spin
    }
}
