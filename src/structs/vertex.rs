use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A single point of a simplex: a parameter vector together with the
/// objective value the evaluator assigned to it.
///
/// A vertex starts out unevaluated (`value` is `None`), and is filled in
/// once the evaluator returns the chunk that carried its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    value: Option<f64>,
    params: Vec<f64>,
}

impl Vertex {
    /// Create a vertex awaiting evaluation
    pub fn unevaluated(params: Vec<f64>) -> Self {
        Vertex {
            value: None,
            params,
        }
    }

    /// Create an evaluated vertex
    pub fn new(value: f64, params: Vec<f64>) -> Self {
        Vertex {
            value: Some(value),
            params,
        }
    }

    /// The objective value, or `None` if the vertex has not been evaluated
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// The parameter vector
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut Vec<f64> {
        &mut self.params
    }

    pub(crate) fn set_value(&mut self, value: f64) {
        self.value = Some(value);
    }

    pub(crate) fn clear_value(&mut self) {
        self.value = None;
    }

    pub fn is_evaluated(&self) -> bool {
        self.value.is_some()
    }

    /// The value as a plain float, with unevaluated vertices mapped to NaN
    pub fn value_or_nan(&self) -> f64 {
        self.value.unwrap_or(f64::NAN)
    }

    /// Ordering by value, ascending. NaN and unevaluated vertices sort last,
    /// so they are the first to be evicted as the worst vertex.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        match (self.value, other.value) {
            (Some(a), Some(b)) => match (a.is_nan(), b.is_nan()) {
                (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (true, true) => Ordering::Equal,
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}
