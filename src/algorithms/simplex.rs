use anyhow::{bail, Result};
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::routines::initialization::{self, Sampler};
use crate::routines::settings::SimplexSpec;
use crate::structs::bounds::Bounds;
use crate::structs::chunk::EvalRequest;
use crate::structs::vertex::Vertex;

/// Operations of the Nelder-Mead state machine
///
/// The colony stores these on its task queue. Each operation consumes the
/// evaluations its predecessor requested, mutates the simplex, and names
/// its successor. A simplex suspends precisely between two operations:
/// it never advances past an operation whose evaluations are not yet
/// written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Sort, recompute the centroid sum and emit the reflected candidate
    Reflect,
    /// Consume the reflection and decide between expansion, contraction
    /// or another reflection
    ExpandOrContract,
    /// Consume the expansion, keep it if it improves the worst vertex
    UpdateAndReflect,
    /// Consume the contraction; on failure shrink the whole simplex
    /// toward the best vertex
    ContractAll,
    /// Flush logs and signal completion
    Terminate,
}

/// One Nelder-Mead polytope of `D + 1` vertices
///
/// The simplex emits candidate points through the colony's evaluation
/// queue, consumes the values the evaluator wrote back, and advances one
/// operation at a time until its evaluation budget or its relative-size
/// stopping criterion is reached.
#[derive(Debug, Clone)]
pub struct Simplex {
    id: String,
    index: usize,
    vertices: Vec<Vertex>,
    /// Coordinate-wise sum of all vertex parameters, divided only on use
    psum: Vec<f64>,
    bounds: Bounds,
    spec: SimplexSpec,
    rng: Pcg64,
    iterations: usize,
    evaluations: usize,
    finished: bool,
    /// Evaluated requests delivered by the colony, in emission order
    inbox: Vec<EvalRequest>,
    /// Vertex slots awaiting values from the initial or shrink batch
    pending_slots: Vec<usize>,
}

impl Simplex {
    /// Create a worker with empty vertices
    ///
    /// Initial vertices are installed afterwards with one of the
    /// `initial_vectors` methods
    pub(crate) fn create(index: usize, bounds: Bounds, spec: SimplexSpec, seed: u64) -> Result<Self> {
        spec.validate(bounds.dim())?;
        Ok(Simplex {
            id: format!("worker_{}", index),
            index,
            vertices: Vec::new(),
            psum: vec![0.0; bounds.dim()],
            bounds,
            spec,
            rng: Pcg64::seed_from_u64(seed),
            iterations: 0,
            evaluations: 0,
            finished: false,
            inbox: Vec::new(),
            pending_slots: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn dim(&self) -> usize {
        self.bounds.dim()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn iteration_count(&self) -> usize {
        self.iterations
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluations
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The vertex with the lowest evaluated value
    pub fn best_vertex(&self) -> Option<&Vertex> {
        self.vertices.iter().min_by(|a, b| a.cmp_value(b))
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_vertex().and_then(|v| v.value())
    }

    pub fn best_params(&self) -> Option<&[f64]> {
        self.best_vertex().map(|v| v.params())
    }

    /// Centroid of all vertices
    pub fn center(&self) -> Vec<f64> {
        let d = self.dim();
        let n = self.vertices.len().max(1) as f64;
        let mut center = vec![0.0; d];
        for vertex in &self.vertices {
            for (i, x) in vertex.params().iter().enumerate() {
                center[i] += x;
            }
        }
        center.iter_mut().for_each(|x| *x /= n);
        center
    }

    /// Mean distance between the best vertex and the center, normalized
    /// per dimension by the width of the box
    pub fn relative_size(&self) -> f64 {
        let best = match self.best_vertex() {
            Some(vertex) => vertex.params().to_vec(),
            None => return f64::INFINITY,
        };
        let center = self.center();
        let n = self.vertices.len() as f64;
        best.iter()
            .zip(center.iter())
            .enumerate()
            .map(|(i, (b, c))| (b - c).abs() / self.bounds.range(i))
            .sum::<f64>()
            / n
    }

    /// Euclidean distance between the best vertex and the center
    pub fn euclidean_size(&self) -> f64 {
        let best = match self.best_vertex() {
            Some(vertex) => vertex.params().to_vec(),
            None => return f64::INFINITY,
        };
        let center = self.center();
        best.iter()
            .zip(center.iter())
            .map(|(b, c)| (b - c) * (b - c))
            .sum::<f64>()
            .sqrt()
    }

    /// Construct `D + 1` vertices from a starting point, offsetting each
    /// axis by the matching scale
    pub fn initial_vectors(&mut self, point: &[f64], scales: &[f64]) -> Result<()> {
        let d = self.dim();
        if point.len() != d {
            bail!(
                "Starting point has {} dimensions, but the bounds have {}",
                point.len(),
                d
            );
        }
        if scales.len() != d {
            bail!("Expected {} scales, got {}", d, scales.len());
        }
        let mut vertices = vec![self.confine(point.to_vec())];
        for i in 0..d {
            let mut offset = point.to_vec();
            offset[i] += scales[i];
            vertices.push(self.confine(offset));
        }
        self.install(vertices);
        Ok(())
    }

    /// As [Simplex::initial_vectors], with the same scale on every axis
    pub fn initial_vectors_scalar(&mut self, point: &[f64], scale: f64) -> Result<()> {
        let scales = vec![scale; self.dim()];
        self.initial_vectors(point, &scales)
    }

    /// Draw `D + 1` vertices from the box with the worker's own generator
    pub fn initial_vectors_random(&mut self, sampler: Sampler) {
        let points = initialization::sample(sampler, &self.bounds, self.dim() + 1, &mut self.rng);
        self.install(points);
    }

    /// Replace the generator, cutting a fresh deterministic stream
    pub(crate) fn reseed(&mut self, seed: u64) {
        self.rng = Pcg64::seed_from_u64(seed);
    }

    /// Install recombined parameter vectors as the new, unevaluated
    /// vertices and take on a child name
    pub(crate) fn adopt(&mut self, genomes: Vec<Vec<f64>>, id: String) {
        self.install(genomes);
        self.id = id;
    }

    pub(crate) fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    /// Per-worker override of the evaluation budget
    pub fn set_max_evaluations(&mut self, max_evaluations: usize) -> Result<()> {
        if max_evaluations <= self.dim() + 1 {
            bail!(
                "A simplex in {} dimensions needs more than {} evaluations, got {}",
                self.dim(),
                self.dim() + 1,
                max_evaluations
            );
        }
        self.spec.max_evaluations = max_evaluations;
        Ok(())
    }

    fn install(&mut self, points: Vec<Vec<f64>>) {
        self.vertices = points
            .into_iter()
            .map(|p| Vertex::unevaluated(self.confine_ref(&p)))
            .collect();
    }

    /// Mark all vertices unevaluated, enqueue them as the first
    /// evaluation batch and name the first operation
    pub(crate) fn begin(&mut self, out: &mut Vec<EvalRequest>) -> Step {
        debug_assert_eq!(self.vertices.len(), self.dim() + 1);
        self.iterations = 0;
        self.evaluations = 0;
        self.finished = false;
        self.inbox.clear();
        self.pending_slots.clear();
        for (slot, vertex) in self.vertices.iter_mut().enumerate() {
            vertex.clear_value();
            out.push(EvalRequest::new(self.index, vertex.params().to_vec()));
            self.pending_slots.push(slot);
        }
        Step::Reflect
    }

    /// Receive one evaluated request back from the colony
    pub(crate) fn deliver(&mut self, request: EvalRequest) {
        self.inbox.push(request);
    }

    /// Execute one operation. Returns the successor, or `None` once the
    /// worker has terminated.
    pub(crate) fn advance(&mut self, step: Step, out: &mut Vec<EvalRequest>) -> Option<Step> {
        match step {
            Step::Reflect => Some(self.reflect(out)),
            Step::ExpandOrContract => Some(self.expand_or_contract(out)),
            Step::UpdateAndReflect => Some(self.update_and_reflect()),
            Step::ContractAll => Some(self.contract_all(out)),
            Step::Terminate => {
                self.finish();
                None
            }
        }
    }

    /// Mark the worker finished; invoked by its own Terminate operation,
    /// or directly by the colony when lazy workers cut the run short
    pub(crate) fn finish(&mut self) {
        self.finished = true;
        tracing::debug!(
            "{} finished after {} iterations and {} evaluations",
            self.id,
            self.iterations,
            self.evaluations
        );
    }

    fn reflect(&mut self, out: &mut Vec<EvalRequest>) -> Step {
        self.absorb_batch();
        if self.evaluations >= self.spec.max_evaluations
            || self.relative_size() <= self.spec.min_relative_size
        {
            return Step::Terminate;
        }
        self.iterations += 1;
        self.vertices.sort_by(|a, b| a.cmp_value(b));
        self.recompute_psum();
        let trial = self.extrapolate(self.dim(), -1.0);
        out.push(EvalRequest::new(self.index, trial));
        Step::ExpandOrContract
    }

    fn expand_or_contract(&mut self, out: &mut Vec<EvalRequest>) -> Step {
        let (params, v_r) = self.take_reply();
        let d = self.dim();
        let v_best = self.vertices[0].value_or_nan();
        let v_second_worst = self.vertices[d - 1].value_or_nan();
        let v_worst = self.vertices[d].value_or_nan();
        if v_r < v_worst {
            self.replace_worst(Vertex::new(v_r, params));
        }
        if self.evaluations >= self.spec.max_evaluations {
            // Budget exhausted mid-iteration: give the terminal check a
            // chance before paying for another candidate
            return Step::Terminate;
        }
        if v_r < v_best {
            let trial = self.extrapolate(d, self.spec.grow_factor);
            out.push(EvalRequest::new(self.index, trial));
            Step::UpdateAndReflect
        } else if v_r >= v_second_worst {
            let trial = self.extrapolate(d, self.spec.shrink_factor);
            out.push(EvalRequest::new(self.index, trial));
            Step::ContractAll
        } else {
            Step::Reflect
        }
    }

    fn update_and_reflect(&mut self) -> Step {
        let (params, v_e) = self.take_reply();
        let d = self.dim();
        if v_e < self.vertices[d].value_or_nan() {
            self.replace_worst(Vertex::new(v_e, params));
        }
        Step::Reflect
    }

    fn contract_all(&mut self, out: &mut Vec<EvalRequest>) -> Step {
        let (params, v_c) = self.take_reply();
        let d = self.dim();
        if v_c < self.vertices[d].value_or_nan() {
            self.replace_worst(Vertex::new(v_c, params));
            return Step::Reflect;
        }
        // The contraction did not help: pull every vertex toward the best
        for slot in 1..=d {
            let shrunk: Vec<f64> = (0..d)
                .map(|i| {
                    self.spec.shrink_factor
                        * (self.vertices[slot].params()[i] + self.vertices[0].params()[i])
                })
                .collect();
            let shrunk = self.confine(shrunk);
            out.push(EvalRequest::new(self.index, shrunk.clone()));
            self.pending_slots.push(slot);
            let vertex = &mut self.vertices[slot];
            *vertex.params_mut() = shrunk;
            vertex.clear_value();
        }
        Step::Reflect
    }

    /// Write the values of a delivered batch back into their vertex slots
    fn absorb_batch(&mut self) {
        debug_assert!(self.inbox.len() >= self.pending_slots.len());
        for slot in std::mem::take(&mut self.pending_slots) {
            let request = self.inbox.remove(0);
            let (params, value) = request.into_parts();
            let vertex = &mut self.vertices[slot];
            *vertex.params_mut() = params;
            vertex.set_value(value.unwrap_or(f64::NAN));
            self.evaluations += 1;
        }
    }

    /// Consume a single delivered evaluation
    fn take_reply(&mut self) -> (Vec<f64>, f64) {
        debug_assert!(!self.inbox.is_empty());
        let request = self.inbox.remove(0);
        self.evaluations += 1;
        let (params, value) = request.into_parts();
        (params, value.unwrap_or(f64::NAN))
    }

    fn recompute_psum(&mut self) {
        let d = self.dim();
        self.psum = vec![0.0; d];
        for vertex in &self.vertices {
            for (i, x) in vertex.params().iter().enumerate() {
                self.psum[i] += x;
            }
        }
    }

    /// Swap a new vertex into the worst slot, adjusting the centroid sum
    /// incrementally rather than re-adding all `D + 1` vertices
    fn replace_worst(&mut self, vertex: Vertex) {
        let d = self.dim();
        for i in 0..d {
            self.psum[i] += vertex.params()[i] - self.vertices[d].params()[i];
        }
        self.vertices[d] = vertex;
    }

    /// Project a trial point through the vertex at `index`
    ///
    /// A factor of -1 reflects through the opposite face, a factor above 1
    /// expands outward and a factor in (0, 1) contracts inward
    fn extrapolate(&mut self, index: usize, factor: f64) -> Vec<f64> {
        let d = self.dim() as f64;
        let f1 = (1.0 - factor) / d;
        let f2 = factor - f1;
        let trial: Vec<f64> = (0..self.dim())
            .map(|i| self.psum[i] * f1 + self.vertices[index].params()[i] * f2)
            .collect();
        self.confine(trial)
    }

    /// Apply the boundary policy per coordinate, if enabled
    fn confine(&mut self, params: Vec<f64>) -> Vec<f64> {
        if !self.spec.force_boundary {
            return params;
        }
        params
            .into_iter()
            .enumerate()
            .map(|(i, x)| {
                self.spec
                    .boundary
                    .apply(x, self.bounds.lower()[i], self.bounds.upper()[i], &mut self.rng)
            })
            .collect()
    }

    fn confine_ref(&mut self, params: &[f64]) -> Vec<f64> {
        self.confine(params.to_vec())
    }

    #[cfg(test)]
    pub(crate) fn psum(&self) -> &[f64] {
        &self.psum
    }
}
