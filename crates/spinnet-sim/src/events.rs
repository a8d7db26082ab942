use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;

use spinnet_diffusion::StateVector;
use thiserror::Error;
use tracing::error;

use crate::error::SimulationError;

/// Events emitted by the simulation engine.
#[derive(Debug, Clone)]
pub enum SimulationEvent {
    /// One `dt` advanced.
    StepComplete { time: f64, step: u64, state: StateVector },

    /// `total_time` reached; repeated on every `step()` past the end.
    SimulationComplete { time: f64, steps: u64 },

    /// Fired by `initialize` and `reset`.
    SimulationReset { time: f64 },

    SimulationPaused { time: f64 },

    SimulationResumed { time: f64 },

    /// Current state replaced from outside the time loop.
    StateChanged { time: f64, state: StateVector },

    /// Stability monitor rescaled the state to unit volume.
    StateNormalized {
        time:                f64,
        volume_before:       f64,
        normalization_count: u64,
    },

    /// A step failed; the error is returned to the caller right after.
    Error { message: String },
}

impl SimulationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StepComplete { .. } => EventKind::StepComplete,
            Self::SimulationComplete { .. } => EventKind::SimulationComplete,
            Self::SimulationReset { .. } => EventKind::SimulationReset,
            Self::SimulationPaused { .. } => EventKind::SimulationPaused,
            Self::SimulationResumed { .. } => EventKind::SimulationResumed,
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::StateNormalized { .. } => EventKind::StateNormalized,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// Event names as exposed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StepComplete,
    SimulationComplete,
    SimulationReset,
    SimulationPaused,
    SimulationResumed,
    StateChanged,
    StateNormalized,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::StepComplete,
        Self::SimulationComplete,
        Self::SimulationReset,
        Self::SimulationPaused,
        Self::SimulationResumed,
        Self::StateChanged,
        Self::StateNormalized,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StepComplete => "step-complete",
            Self::SimulationComplete => "simulation-complete",
            Self::SimulationReset => "simulation-reset",
            Self::SimulationPaused => "simulation-paused",
            Self::SimulationResumed => "simulation-resumed",
            Self::StateChanged => "state-changed",
            Self::StateNormalized => "state-normalized",
            Self::Error => "error",
        }
    }
}

impl FromStr for EventKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SimulationError::UnknownEnumValue { kind: "event", value: s.to_string() })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────
// Bus
// ─────────────────────────────────────────────

/// Failure reported by a listener. Logged, never propagated.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl From<String> for ListenerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ListenerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

pub type Listener = Box<dyn FnMut(&SimulationEvent) -> Result<(), ListenerError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Synchronous observer list.
///
/// Listeners for an event kind run in registration order on the publishing
/// call's stack. A listener that errors or panics is logged and skipped; the
/// remaining listeners still run.
#[derive(Default)]
pub struct SimulationEventBus {
    listeners: Vec<(ListenerId, EventKind, Listener)>,
    next_id:   u64,
}

impl SimulationEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&SimulationEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, kind, Box::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.iter().filter(|(_, k, _)| *k == kind).count()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Deliver `event` to every listener of its kind.
    pub fn publish(&mut self, event: &SimulationEvent) {
        let kind = event.kind();
        for (id, k, listener) in self.listeners.iter_mut() {
            if *k != kind {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(target: "spinnet::general", event = kind.as_str(), listener = id.0, error = %e, "event listener failed");
                }
                Err(_) => {
                    error!(target: "spinnet::general", event = kind.as_str(), listener = id.0, "event listener panicked");
                }
            }
        }
    }
}

impl fmt::Debug for SimulationEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationEventBus")
            .field("listeners", &self.listeners.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
