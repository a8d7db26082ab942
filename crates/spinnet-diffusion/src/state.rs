//! Node-indexed scalar field with value semantics.
//!
//! A [`StateVector`] pairs a fixed node-id ordering with one `f64` per node.
//! Every "mutating" operation returns a new vector; the receiver is never
//! changed. The ordering is reference-counted, so snapshots derived from one
//! another share it instead of copying ids.
//!
//! ## Combining vectors
//!
//! `add` / `subtract` walk the **receiver's** ordering and look the other
//! operand up by node id, so two vectors over the same ids in different
//! orders still combine correctly. The result keeps the receiver's order.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spinnet_graph::Position;

use crate::error::DiffusionError;

/// Absolute per-component tolerance used by [`StateVector::approx_eq`].
pub const STATE_EPSILON: f64 = 1e-10;

// ─────────────────────────────────────────────
// NodeOrdering — id ↔ index bijection
// ─────────────────────────────────────────────

#[derive(Debug)]
struct NodeOrdering {
    ids:   Vec<String>,
    index: HashMap<String, usize>,
}

impl NodeOrdering {
    fn new(ids: Vec<String>) -> Self {
        let index = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        Self { ids, index }
    }
}

// ─────────────────────────────────────────────
// StateVector
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StateData", into = "StateData")]
pub struct StateVector {
    ordering: Arc<NodeOrdering>,
    values:   Vec<f64>,
}

/// Flat wire shape `{nodeIds, values}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    pub node_ids: Vec<String>,
    pub values:   Vec<f64>,
}

impl TryFrom<StateData> for StateVector {
    type Error = DiffusionError;

    fn try_from(data: StateData) -> Result<Self, Self::Error> {
        StateVector::new(data.node_ids, data.values)
    }
}

impl From<StateVector> for StateData {
    fn from(state: StateVector) -> Self {
        state.to_data()
    }
}

impl StateVector {
    // ── Construction ───────────────────────────────

    /// Explicit values; `values.len()` must equal `node_ids.len()`.
    pub fn new(node_ids: Vec<String>, values: Vec<f64>) -> Result<Self, DiffusionError> {
        if values.len() != node_ids.len() {
            return Err(DiffusionError::SizeMismatch { expected: node_ids.len(), got: values.len() });
        }
        Ok(Self { ordering: Arc::new(NodeOrdering::new(node_ids)), values })
    }

    /// Alias of [`new`](Self::new) matching the `custom` initial-state kind.
    pub fn custom(node_ids: Vec<String>, values: Vec<f64>) -> Result<Self, DiffusionError> {
        Self::new(node_ids, values)
    }

    pub fn zeros(node_ids: Vec<String>) -> Self {
        Self::uniform(node_ids, 0.0)
    }

    pub fn uniform(node_ids: Vec<String>, value: f64) -> Self {
        let values = vec![value; node_ids.len()];
        Self { ordering: Arc::new(NodeOrdering::new(node_ids)), values }
    }

    /// All zero except `value` at `node_id`.
    pub fn delta(node_ids: Vec<String>, node_id: &str, value: f64) -> Result<Self, DiffusionError> {
        let ordering = NodeOrdering::new(node_ids);
        let &i = ordering
            .index
            .get(node_id)
            .ok_or_else(|| DiffusionError::NotFound(node_id.to_string()))?;
        let mut values = vec![0.0; ordering.ids.len()];
        values[i] = value;
        Ok(Self { ordering: Arc::new(ordering), values })
    }

    /// `exp(−d²/2σ²)` around `center`, then L2-normalized.
    ///
    /// `d` is the Euclidean distance between positions (missing `z` = 0).
    /// Nodes without a known position get `0`. Fails if `center` is not in
    /// `node_ids` or has no position, and if `sigma` is not positive and finite.
    pub fn gaussian(
        node_ids:  Vec<String>,
        center:    &str,
        sigma:     f64,
        positions: &HashMap<String, Position>,
    ) -> Result<Self, DiffusionError> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(DiffusionError::InvalidParameter(format!("sigma must be positive and finite, got {sigma}")));
        }
        if !node_ids.iter().any(|id| id == center) {
            return Err(DiffusionError::NotFound(center.to_string()));
        }
        let c = positions
            .get(center)
            .ok_or_else(|| DiffusionError::NotFound(center.to_string()))?;
        let two_sigma_sq = 2.0 * sigma * sigma;

        let values = node_ids
            .iter()
            .map(|id| match positions.get(id) {
                Some(p) => {
                    let d = c.distance(p);
                    (-d * d / two_sigma_sq).exp()
                }
                None => 0.0,
            })
            .collect();

        Ok(Self { ordering: Arc::new(NodeOrdering::new(node_ids)), values }.normalize())
    }

    /// Same ordering as `self`, new values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, DiffusionError> {
        if values.len() != self.values.len() {
            return Err(DiffusionError::SizeMismatch { expected: self.values.len(), got: values.len() });
        }
        Ok(Self { ordering: Arc::clone(&self.ordering), values })
    }

    /// Same ordering, values produced by `f(i, v)`.
    pub fn map(&self, f: impl Fn(usize, f64) -> f64) -> Self {
        let values = self.values.iter().enumerate().map(|(i, &v)| f(i, v)).collect();
        Self { ordering: Arc::clone(&self.ordering), values }
    }

    // ── Access ─────────────────────────────────────

    #[inline] pub fn len(&self) -> usize { self.values.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.values.is_empty() }
    #[inline] pub fn node_ids(&self) -> &[String] { &self.ordering.ids }
    #[inline] pub fn values(&self) -> &[f64] { &self.values }

    pub fn index_of(&self, node_id: &str) -> Option<usize> {
        self.ordering.index.get(node_id).copied()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.ordering.index.contains_key(node_id)
    }

    pub fn get(&self, node_id: &str) -> Result<f64, DiffusionError> {
        self.index_of(node_id)
            .map(|i| self.values[i])
            .ok_or_else(|| DiffusionError::NotFound(node_id.to_string()))
    }

    pub fn get_at(&self, index: usize) -> Result<f64, DiffusionError> {
        self.values
            .get(index)
            .copied()
            .ok_or(DiffusionError::IndexOutOfRange { index, len: self.values.len() })
    }

    pub fn set(&self, node_id: &str, value: f64) -> Result<Self, DiffusionError> {
        let i = self
            .index_of(node_id)
            .ok_or_else(|| DiffusionError::NotFound(node_id.to_string()))?;
        self.set_at(i, value)
    }

    pub fn set_at(&self, index: usize, value: f64) -> Result<Self, DiffusionError> {
        if index >= self.values.len() {
            return Err(DiffusionError::IndexOutOfRange { index, len: self.values.len() });
        }
        let mut values = self.values.clone();
        values[index] = value;
        Ok(Self { ordering: Arc::clone(&self.ordering), values })
    }

    /// `(node_id, value)` pairs in ordering order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.ordering.ids.iter().map(String::as_str).zip(self.values.iter().copied())
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.clone()
    }

    pub fn to_data(&self) -> StateData {
        StateData { node_ids: self.ordering.ids.clone(), values: self.values.clone() }
    }

    /// True when both vectors share the exact same ordering instance or an
    /// equal id sequence, i.e. positional pairing is valid.
    pub fn same_ordering(&self, other: &StateVector) -> bool {
        Arc::ptr_eq(&self.ordering, &other.ordering) || self.ordering.ids == other.ordering.ids
    }

    // ── Arithmetic ─────────────────────────────────

    pub fn add(&self, other: &StateVector) -> Result<Self, DiffusionError> {
        self.combine(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &StateVector) -> Result<Self, DiffusionError> {
        self.combine(other, |a, b| a - b)
    }

    /// `self + k · other`, combined by node id.
    pub fn add_scaled(&self, other: &StateVector, k: f64) -> Result<Self, DiffusionError> {
        self.combine(other, |a, b| a + k * b)
    }

    /// Scale every value.
    pub fn scale(&self, factor: f64) -> Self {
        self.map(|_, v| v * factor)
    }

    fn combine(&self, other: &StateVector, op: impl Fn(f64, f64) -> f64) -> Result<Self, DiffusionError> {
        if self.len() != other.len() {
            return Err(DiffusionError::SizeMismatch { expected: self.len(), got: other.len() });
        }
        let values = if self.same_ordering(other) {
            self.values.iter().zip(&other.values).map(|(&a, &b)| op(a, b)).collect()
        } else {
            self.iter()
                .map(|(id, a)| other.get(id).map(|b| op(a, b)))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self { ordering: Arc::clone(&self.ordering), values })
    }

    // ── Norms ──────────────────────────────────────

    /// Euclidean (L2) norm.
    pub fn norm(&self) -> f64 {
        self.volume().sqrt()
    }

    /// `Σ vᵢ²`.
    pub fn volume(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// Divide by the L2 norm. A zero norm returns an unchanged clone.
    pub fn normalize(&self) -> Self {
        let norm = self.norm();
        if norm == 0.0 {
            return self.clone();
        }
        self.scale(1.0 / norm)
    }

    /// Equal length, and every node id of `self` present in `other` with a
    /// value within [`STATE_EPSILON`].
    pub fn approx_eq(&self, other: &StateVector) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|(id, a)| match other.get(id) {
            Ok(b) => (a - b).abs() <= STATE_EPSILON,
            Err(_) => false,
        })
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

impl PartialEq for StateVector {
    /// Exact equality of ordering and values. See [`StateVector::approx_eq`]
    /// for the tolerance-based comparison.
    fn eq(&self, other: &Self) -> bool {
        self.ordering.ids == other.ordering.ids && self.values == other.values
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // ── Construction ───────────────────────────────

    #[test]
    fn delta_places_mass_on_one_node() {
        let v = StateVector::delta(ids(&["a", "b", "c"]), "b", 2.5).unwrap();
        assert_eq!(v.get("b").unwrap(), 2.5);
        assert_eq!(v.get("a").unwrap(), 0.0);
        assert_eq!(v.get("c").unwrap(), 0.0);
    }

    #[test]
    fn delta_on_missing_node_fails() {
        let err = StateVector::delta(ids(&["a"]), "zz", 1.0).unwrap_err();
        assert!(matches!(err, DiffusionError::NotFound(ref id) if id == "zz"));
    }

    #[test]
    fn custom_requires_matching_length() {
        assert!(matches!(
            StateVector::custom(ids(&["a", "b"]), vec![1.0]),
            Err(DiffusionError::SizeMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn gaussian_is_unit_norm_and_peaks_at_center() {
        let mut positions = HashMap::new();
        positions.insert("a".to_string(), Position::new(0.0, 0.0));
        positions.insert("b".to_string(), Position::new(1.0, 0.0));
        positions.insert("c".to_string(), Position::with_z(0.0, 0.0, 2.0));

        let v = StateVector::gaussian(ids(&["a", "b", "c"]), "a", 1.0, &positions).unwrap();
        assert!((v.norm() - 1.0).abs() < 1e-12, "norm = {}", v.norm());
        let (a, b, c) = (v.get("a").unwrap(), v.get("b").unwrap(), v.get("c").unwrap());
        assert!(a > b && b > c, "values should decay with distance: {a} {b} {c}");
        // Ratio b/a = exp(-1/2).
        assert!((b / a - (-0.5_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn gaussian_requires_center() {
        let positions = HashMap::new();
        assert!(StateVector::gaussian(ids(&["a"]), "zz", 1.0, &positions).is_err());
        assert!(StateVector::gaussian(ids(&["a"]), "a", 1.0, &positions).is_err());
    }

    #[test]
    fn gaussian_rejects_degenerate_width() {
        let mut positions = HashMap::new();
        positions.insert("a".to_string(), Position::new(0.0, 0.0));
        positions.insert("b".to_string(), Position::new(1.0, 0.0));

        for sigma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = StateVector::gaussian(ids(&["a", "b"]), "a", sigma, &positions);
            assert!(
                matches!(result, Err(DiffusionError::InvalidParameter(_))),
                "sigma = {sigma} should be rejected, got {result:?}"
            );
        }
    }

    // ── Access ─────────────────────────────────────

    #[test]
    fn positional_access_is_bounds_checked() {
        let v = StateVector::uniform(ids(&["a", "b"]), 1.0);
        assert_eq!(v.get_at(1).unwrap(), 1.0);
        assert!(matches!(v.get_at(2), Err(DiffusionError::IndexOutOfRange { index: 2, len: 2 })));
        assert!(v.set_at(5, 0.0).is_err());
        assert!(v.get("zz").is_err());
    }

    #[test]
    fn set_returns_new_vector() {
        let v = StateVector::zeros(ids(&["a", "b"]));
        let w = v.set("b", 3.0).unwrap();
        assert_eq!(v.get("b").unwrap(), 0.0, "receiver must be untouched");
        assert_eq!(w.get("b").unwrap(), 3.0);
    }

    // ── Arithmetic ─────────────────────────────────

    #[test]
    fn add_pairs_by_node_id_not_position() {
        let a = StateVector::new(ids(&["x", "y"]), vec![1.0, 2.0]).unwrap();
        let b = StateVector::new(ids(&["y", "x"]), vec![10.0, 20.0]).unwrap();
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.node_ids(), a.node_ids());
        assert_eq!(sum.values(), &[21.0, 12.0]);
    }

    #[test]
    fn add_with_different_length_fails() {
        let a = StateVector::zeros(ids(&["x", "y"]));
        let b = StateVector::zeros(ids(&["x"]));
        assert!(matches!(a.add(&b), Err(DiffusionError::SizeMismatch { .. })));
    }

    #[test]
    fn add_with_foreign_ids_fails() {
        let a = StateVector::zeros(ids(&["x", "y"]));
        let b = StateVector::zeros(ids(&["x", "z"]));
        assert!(matches!(a.subtract(&b), Err(DiffusionError::NotFound(_))));
    }

    #[test]
    fn add_then_subtract_is_identity() {
        let a = StateVector::new(ids(&["p", "q", "r"]), vec![0.1, -3.7, 1e3]).unwrap();
        let b = StateVector::new(ids(&["r", "p", "q"]), vec![2.2, 5.5, -0.25]).unwrap();
        let back = a.add(&b).unwrap().subtract(&b).unwrap();
        assert!(back.approx_eq(&a));
    }

    // ── Norms ──────────────────────────────────────

    #[test]
    fn normalize_is_idempotent() {
        let v = StateVector::new(ids(&["a", "b", "c"]), vec![3.0, -4.0, 12.0]).unwrap();
        let once = v.normalize();
        let twice = once.normalize();
        assert!((once.norm() - 1.0).abs() < 1e-12);
        assert!(twice.approx_eq(&once));
    }

    #[test]
    fn normalize_zero_vector_is_noop() {
        let z = StateVector::zeros(ids(&["a", "b"]));
        let n = z.normalize();
        assert!(n.is_finite());
        assert!(n.approx_eq(&z));
    }

    #[test]
    fn volume_and_max_abs() {
        let v = StateVector::new(ids(&["a", "b"]), vec![-3.0, 2.0]).unwrap();
        assert_eq!(v.volume(), 13.0);
        assert_eq!(v.max_abs(), 3.0);
        assert_eq!(v.sum(), -1.0);
    }

    #[test]
    fn approx_eq_requires_same_length() {
        let a = StateVector::zeros(ids(&["a"]));
        let b = StateVector::zeros(ids(&["a", "b"]));
        assert!(!a.approx_eq(&b));
    }

    // ── Serialization ──────────────────────────────

    #[test]
    fn serde_uses_flat_shape_and_validates() {
        let v = StateVector::new(ids(&["a", "b"]), vec![1.0, 2.0]).unwrap();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["nodeIds"], serde_json::json!(["a", "b"]));
        let back: StateVector = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);

        let bad = serde_json::json!({"nodeIds": ["a"], "values": [1.0, 2.0]});
        assert!(serde_json::from_value::<StateVector>(bad).is_err());
    }
}
