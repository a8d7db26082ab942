use serde::{Deserialize, Serialize};
use spinnet_diffusion::{StateData, StateVector};

use crate::error::SimulationError;

/// Time-indexed snapshots of a run. Times are kept sorted; adding at an
/// existing time overwrites that snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationHistory {
    times:  Vec<f64>,
    states: Vec<StateVector>,
}

/// `{times, states: [{nodeIds, values}]}` as exported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    pub times:  Vec<f64>,
    pub states: Vec<StateData>,
}

impl SimulationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline] pub fn len(&self) -> usize { self.times.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.times.is_empty() }
    #[inline] pub fn times(&self) -> &[f64] { &self.times }
    #[inline] pub fn states(&self) -> &[StateVector] { &self.states }

    pub fn add_state(&mut self, time: f64, state: StateVector) {
        match self.times.binary_search_by(|t| t.total_cmp(&time)) {
            Ok(i) => self.states[i] = state,
            Err(i) => {
                self.times.insert(i, time);
                self.states.insert(i, state);
            }
        }
    }

    /// Snapshot recorded at exactly `time`.
    pub fn get_state(&self, time: f64) -> Option<&StateVector> {
        self.times
            .binary_search_by(|t| t.total_cmp(&time))
            .ok()
            .map(|i| &self.states[i])
    }

    /// Snapshot nearest to `time`; the earlier one wins on equal distance.
    pub fn get_closest_state(&self, time: f64) -> Option<(f64, &StateVector)> {
        if self.times.is_empty() {
            return None;
        }
        let i = self.times.partition_point(|&t| t < time);
        let best = if i == 0 {
            0
        } else if i == self.times.len() {
            i - 1
        } else {
            let before = time - self.times[i - 1];
            let after = self.times[i] - time;
            if after < before { i } else { i - 1 }
        };
        Some((self.times[best], &self.states[best]))
    }

    pub fn latest(&self) -> Option<(f64, &StateVector)> {
        self.times.last().copied().zip(self.states.last())
    }

    /// Span between first and last recorded times.
    pub fn duration(&self) -> f64 {
        match (self.times.first(), self.times.last()) {
            (Some(a), Some(b)) => b - a,
            _ => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &StateVector)> + '_ {
        self.times.iter().copied().zip(self.states.iter())
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.states.clear();
    }

    pub fn to_data(&self) -> HistoryData {
        HistoryData {
            times:  self.times.clone(),
            states: self.states.iter().map(StateVector::to_data).collect(),
        }
    }

    /// Rebuild from exported data. Lengths must agree.
    pub fn from_data(data: HistoryData) -> Result<Self, SimulationError> {
        if data.times.len() != data.states.len() {
            return Err(SimulationError::Validation(vec![format!(
                "history.times has {} entries but history.states has {}",
                data.times.len(),
                data.states.len()
            )]));
        }
        let mut history = Self::new();
        for (t, s) in data.times.into_iter().zip(data.states) {
            history.add_state(t, StateVector::try_from(s)?);
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(v: f64) -> StateVector {
        StateVector::uniform(vec!["a".into(), "b".into()], v)
    }

    fn sample() -> SimulationHistory {
        let mut h = SimulationHistory::new();
        for t in [5.0, 0.0, 2.0, 1.0] {
            h.add_state(t, sv(t));
        }
        h
    }

    #[test]
    fn times_stay_sorted() {
        assert_eq!(sample().times(), &[0.0, 1.0, 2.0, 5.0]);
    }

    #[test]
    fn add_at_existing_time_overwrites() {
        let mut h = sample();
        h.add_state(2.0, sv(42.0));
        assert_eq!(h.len(), 4);
        assert_eq!(h.get_state(2.0).unwrap().get("a").unwrap(), 42.0);
    }

    #[test]
    fn closest_prefers_nearer_then_earlier() {
        let h = sample();
        assert_eq!(h.get_closest_state(3.0).unwrap().0, 2.0, "distance 1 beats distance 2");
        assert_eq!(h.get_closest_state(3.5).unwrap().0, 2.0, "tie goes to the earlier time");
        assert_eq!(h.get_closest_state(4.0).unwrap().0, 5.0);
        assert_eq!(h.get_closest_state(-3.0).unwrap().0, 0.0);
        assert_eq!(h.get_closest_state(99.0).unwrap().0, 5.0);
        assert_eq!(h.get_closest_state(1.0).unwrap().0, 1.0);
    }

    #[test]
    fn exact_lookup_misses_between_samples() {
        let h = sample();
        assert!(h.get_state(1.5).is_none());
        assert!(SimulationHistory::new().get_closest_state(0.0).is_none());
    }

    #[test]
    fn duration_and_clear() {
        let mut h = sample();
        assert_eq!(h.duration(), 5.0);
        assert_eq!(h.latest().unwrap().0, 5.0);
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.duration(), 0.0);
    }

    #[test]
    fn data_round_trip_and_length_check() {
        let h = sample();
        assert_eq!(SimulationHistory::from_data(h.to_data()).unwrap(), h);

        let mut bad = h.to_data();
        bad.times.pop();
        assert!(matches!(SimulationHistory::from_data(bad), Err(SimulationError::Validation(_))));
    }
}
