use anyhow::Result;
use rayon::prelude::*;

use crate::structs::chunk::EvalRequest;

/// The external evaluator contract
///
/// Implementations receive the current evaluation chunk and must write a
/// value into every entry before returning. The slice must not be
/// reordered. The core treats the chunk as read-only while it is out for
/// evaluation, so implementations are free to compute entries in parallel.
pub trait Evaluate {
    fn evaluate(&self, chunk: &mut [EvalRequest]) -> Result<()>;
}

/// Sequential evaluator wrapping a plain objective function
pub struct Objective<F>
where
    F: Fn(&[f64]) -> f64,
{
    function: F,
}

impl<F> Objective<F>
where
    F: Fn(&[f64]) -> f64,
{
    pub fn new(function: F) -> Self {
        Objective { function }
    }
}

impl<F> Evaluate for Objective<F>
where
    F: Fn(&[f64]) -> f64,
{
    fn evaluate(&self, chunk: &mut [EvalRequest]) -> Result<()> {
        for request in chunk.iter_mut() {
            let value = (self.function)(request.params());
            request.write(value);
        }
        Ok(())
    }
}

/// Parallel evaluator wrapping a thread-safe objective function
///
/// Entries of the chunk are evaluated concurrently on the rayon thread
/// pool; each entry is a pure function of its own parameters, so order of
/// completion does not matter and positions are preserved.
pub struct ParObjective<F>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    function: F,
}

impl<F> ParObjective<F>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    pub fn new(function: F) -> Self {
        ParObjective { function }
    }
}

impl<F> Evaluate for ParObjective<F>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn evaluate(&self, chunk: &mut [EvalRequest]) -> Result<()> {
        chunk.par_iter_mut().for_each(|request| {
            let value = (self.function)(request.params());
            request.write(value);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_fills_all() {
        let mut chunk = vec![
            EvalRequest::new(0, vec![1.0, 2.0]),
            EvalRequest::new(1, vec![3.0, 4.0]),
        ];
        let evaluator = Objective::new(|p: &[f64]| p.iter().sum());
        evaluator.evaluate(&mut chunk).unwrap();
        assert_eq!(chunk[0].value(), Some(3.0));
        assert_eq!(chunk[1].value(), Some(7.0));
    }

    #[test]
    fn test_parallel_preserves_order() {
        let mut chunk: Vec<EvalRequest> = (0..64)
            .map(|i| EvalRequest::new(i, vec![i as f64]))
            .collect();
        let evaluator = ParObjective::new(|p: &[f64]| p[0] * 2.0);
        evaluator.evaluate(&mut chunk).unwrap();
        for (i, request) in chunk.iter().enumerate() {
            assert_eq!(request.value(), Some(i as f64 * 2.0));
        }
    }
}
