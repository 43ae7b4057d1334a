use std::collections::VecDeque;

use anyhow::{bail, Result};

use crate::algorithms::simplex::{Simplex, Step};
use crate::routines::settings::{ColonyConfig, SimplexSpec};
use crate::structs::bounds::Bounds;
use crate::structs::chunk::EvalRequest;

/// What the caller must do after a call to [Colony::run]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColonyState {
    /// An evaluation chunk is ready; fill it and call `run` again
    NeedsEvaluation,
    /// Every worker has finished and both queues have drained
    Finished,
}

/// A pending simplex operation
#[derive(Debug, Clone, Copy)]
struct Task {
    worker: usize,
    step: Step,
}

/// Owns the simplexes and multiplexes their operations against a shared,
/// batched evaluation queue
///
/// The colony keeps two FIFOs: the task queue of pending simplex
/// operations and the evaluation queue of candidate points awaiting the
/// evaluator. Operations run in insertion order; before each one the
/// colony checks whether a chunk must be yielded, which guarantees that
/// no operation ever runs ahead of its own evaluations.
#[derive(Debug)]
pub struct Colony {
    workers: Vec<Simplex>,
    tasks: VecDeque<Task>,
    queue: VecDeque<EvalRequest>,
    chunk: Vec<EvalRequest>,
    config: ColonyConfig,
    finished_workers: usize,
    /// Per-worker best value after each executed operation, padded to
    /// equal length once the run completes
    best_lists: Vec<Vec<f64>>,
}

impl Colony {
    /// Allocate `population` workers with fresh identities
    /// `worker_0 .. worker_{N-1}`
    ///
    /// Seeds are dealt from the caller's stream so that every worker owns
    /// an independent, reproducible generator
    pub(crate) fn create(
        population: usize,
        bounds: Bounds,
        spec: SimplexSpec,
        config: ColonyConfig,
        seeds: Vec<u64>,
    ) -> Result<Self> {
        if population == 0 {
            bail!("Population must be at least 1");
        }
        config.validate()?;
        let workers = (0..population)
            .map(|index| Simplex::create(index, bounds.clone(), spec, seeds[index]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Colony {
            workers,
            tasks: VecDeque::new(),
            queue: VecDeque::new(),
            chunk: Vec::new(),
            config,
            finished_workers: 0,
            best_lists: vec![Vec::new(); population],
        })
    }

    pub fn population(&self) -> usize {
        self.workers.len()
    }

    pub fn dim(&self) -> usize {
        self.workers[0].dim()
    }

    pub fn workers(&self) -> &[Simplex] {
        &self.workers
    }

    pub fn worker(&self, index: usize) -> &Simplex {
        &self.workers[index]
    }

    pub fn worker_mut(&mut self, index: usize) -> &mut Simplex {
        &mut self.workers[index]
    }

    pub(crate) fn workers_mut(&mut self) -> &mut [Simplex] {
        &mut self.workers
    }

    /// The chunk currently out for evaluation
    pub fn chunk(&self) -> &[EvalRequest] {
        &self.chunk
    }

    pub fn chunk_mut(&mut self) -> &mut [EvalRequest] {
        &mut self.chunk
    }

    /// Per-worker best value histories from the last run
    pub fn best_lists(&self) -> &[Vec<f64>] {
        &self.best_lists
    }

    /// Target size of an evaluation batch; 1 yields after every request
    pub fn set_evaluation_chunk_size(&mut self, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 {
            bail!("Evaluation chunk size must be at least 1");
        }
        self.config.chunk_size = chunk_size;
        Ok(())
    }

    pub fn set_lazy_workers(&mut self, lazy_workers: bool) {
        self.config.lazy_workers = lazy_workers;
    }

    /// Evaluations spent by all workers in the current run
    pub fn total_evaluations(&self) -> usize {
        self.workers.iter().map(|w| w.evaluation_count()).sum()
    }

    /// Begin a fresh run: every worker re-emits its vertices as the
    /// first evaluation batch and schedules its first reflection
    pub fn restart(&mut self) {
        self.tasks.clear();
        self.queue.clear();
        self.chunk.clear();
        self.finished_workers = 0;
        self.best_lists = vec![Vec::new(); self.workers.len()];
        for index in 0..self.workers.len() {
            let mut emitted = Vec::new();
            let step = self.workers[index].begin(&mut emitted);
            self.queue.extend(emitted);
            self.tasks.push_back(Task {
                worker: index,
                step,
            });
        }
    }

    /// Drain the task queue until an evaluation chunk is ready or the
    /// colony has finished
    ///
    /// The caller fills the exposed chunk and calls `run` again. A chunk
    /// returned with unfilled entries is a contract violation and fails
    /// here on the next call.
    pub fn run(&mut self) -> Result<ColonyState> {
        self.deliver_chunk()?;
        loop {
            if self.fill_chunk() {
                return Ok(ColonyState::NeedsEvaluation);
            }
            match self.tasks.pop_front() {
                Some(task) => self.execute(task),
                None => {
                    debug_assert!(self.queue.is_empty());
                    self.pad_best_lists();
                    tracing::debug!(
                        "Colony finished, {} of {} workers terminated naturally",
                        self.finished_workers,
                        self.workers.len()
                    );
                    return Ok(ColonyState::Finished);
                }
            }
        }
    }

    /// Route the evaluated chunk back to the owning workers
    fn deliver_chunk(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        if let Some(unfilled) = self.chunk.iter().find(|r| !r.is_filled()) {
            tracing::error!(
                "Evaluator returned the chunk with an unfilled entry for worker {}",
                unfilled.worker()
            );
            bail!(
                "Evaluator contract violation: unfilled value for worker {}",
                unfilled.worker()
            );
        }
        for request in self.chunk.drain(..) {
            if request.value().is_some_and(|v| v.is_nan()) {
                tracing::warn!(
                    "Evaluator returned NaN for worker {}",
                    request.worker()
                );
            }
            self.workers[request.worker()].deliver(request);
        }
        Ok(())
    }

    /// Decide whether a chunk must be yielded before the next task runs
    ///
    /// Returns true with the chunk populated when it is time to suspend.
    /// The rules, in order:
    /// - an empty evaluation queue never yields;
    /// - if the next task belongs to the worker whose requests sit at the
    ///   head of the queue, that task is blocked: its requests are
    ///   drained into the chunk (up to the cap) and topped up from other
    ///   workers to amortize evaluator overhead;
    /// - otherwise a chunk is yielded only once a full batch has
    ///   accumulated.
    fn fill_chunk(&mut self) -> bool {
        debug_assert!(self.chunk.is_empty());
        if self.queue.is_empty() {
            return false;
        }
        let head_request = self.queue.front().map(|r| r.worker());
        let head_task = self.tasks.front().map(|t| t.worker);
        if head_task == head_request {
            let blocked = head_request;
            while self.chunk.len() < self.config.chunk_size {
                let owned = self
                    .queue
                    .front()
                    .is_some_and(|request| Some(request.worker()) == blocked);
                if !owned {
                    break;
                }
                let request = self.queue.pop_front().unwrap();
                self.chunk.push(request);
            }
            // Opportunistic top-up from the rest of the queue
            while self.chunk.len() < self.config.chunk_size {
                match self.queue.pop_front() {
                    Some(request) => self.chunk.push(request),
                    None => break,
                }
            }
            return true;
        }
        if self.queue.len() >= self.config.chunk_size {
            while self.chunk.len() < self.config.chunk_size {
                let request = self.queue.pop_front().unwrap();
                self.chunk.push(request);
            }
            return true;
        }
        false
    }

    fn execute(&mut self, task: Task) {
        if self.workers[task.worker].is_finished() {
            return;
        }
        let mut emitted = Vec::new();
        let next = self.workers[task.worker].advance(task.step, &mut emitted);
        self.queue.extend(emitted);
        if let Some(best) = self.workers[task.worker].best_value() {
            self.best_lists[task.worker].push(best);
        }
        match next {
            Some(step) => self.tasks.push_back(Task {
                worker: task.worker,
                step,
            }),
            None => self.on_worker_finished(task.worker),
        }
    }

    fn on_worker_finished(&mut self, worker: usize) {
        self.finished_workers += 1;
        if self.config.lazy_workers && self.workers.len() > 1 {
            tracing::debug!(
                "{} finished first, cutting the remaining workers short",
                self.workers[worker].id()
            );
            for other in self.workers.iter_mut() {
                if !other.is_finished() {
                    other.finish();
                    self.finished_workers += 1;
                }
            }
            self.tasks.clear();
            self.queue.clear();
        }
    }

    /// Equalize the best-value histories by repeating each final value
    fn pad_best_lists(&mut self) {
        let longest = self.best_lists.iter().map(|l| l.len()).max().unwrap_or(0);
        for list in self.best_lists.iter_mut() {
            if let Some(&last) = list.last() {
                while list.len() < longest {
                    list.push(last);
                }
            }
        }
    }
}
