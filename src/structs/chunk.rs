use serde::{Deserialize, Serialize};

/// One entry of an evaluation chunk: a candidate point emitted by a
/// simplex operation, tagged with the worker that owns it.
///
/// The evaluator receives a slice of these, writes a value into each with
/// [`EvalRequest::write`], and must not reorder the slice. An entry left
/// unfilled is a contract violation surfaced by the next call to
/// [`Colony::run`](crate::algorithms::colony::Colony::run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    worker: usize,
    params: Vec<f64>,
    value: Option<f64>,
}

impl EvalRequest {
    pub(crate) fn new(worker: usize, params: Vec<f64>) -> Self {
        EvalRequest {
            worker,
            params,
            value: None,
        }
    }

    /// Index of the simplex that emitted this candidate
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// The candidate point to evaluate
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// The objective value, once written by the evaluator
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Write the objective value for this candidate
    pub fn write(&mut self, value: f64) {
        self.value = Some(value);
    }

    pub fn is_filled(&self) -> bool {
        self.value.is_some()
    }

    pub(crate) fn into_parts(self) -> (Vec<f64>, Option<f64>) {
        (self.params, self.value)
    }
}
