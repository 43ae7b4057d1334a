use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::algorithms::colony::{Colony, ColonyState};
use crate::algorithms::{GaResult, GenerationStatus, Status};
use crate::routines::evaluation::Evaluate;
use crate::routines::settings::Settings;
use crate::structs::bounds::{Bounds, ShrinkMode};
use crate::structs::vertex::Vertex;

/// How a worker's scalar fitness is computed from its snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fitness {
    /// The best vertex of the current generation
    Min,
    /// The worst value ever observed for the worker, across its whole
    /// history
    Max,
    /// Mean over the vertices of the worker's latest snapshot
    Average,
}

/// How workers are paired for reproduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marriage {
    /// The fittest worker fathers every pair
    KingHenry,
    /// Uniform random pairs without self-pairing
    Random,
    /// Tournament of two for each partner, fitter contestant wins
    RandomPreferable,
    /// Adjacent ranks pair up, a trailing singleton wraps to the king
    Hierarchical,
    /// Fittest with least fit, second with second-least, and so on
    BestWorst,
}

/// How children are recombined from their parents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reproduction {
    /// Each coordinate taken whole from one parent or the other
    DiscreteMixing,
    /// Each coordinate blended with a random mixing weight in [-0.5, 1.5)
    LinearCombination,
    /// Uniformly pick one of the two modes per pair
    RandomType,
}

/// The generational controller
///
/// Owns the colony, snapshots it after every run, ranks workers by
/// fitness, pairs them, and overwrites the population with recombined
/// children before restarting. Optionally shrinks the search box around
/// the fittest worker at a fixed generation cadence.
pub struct Genetics {
    settings: Settings,
    colony: Colony,
    rng: Pcg64,
    bounds: Bounds,
    /// Current generation counter, starting at 1
    generation: usize,
    /// Identity pairs used for the most recent reproduction
    marriages: Vec<(usize, usize)>,
    /// Snapshot of every worker at the last colony finish
    current: Vec<Vec<Vertex>>,
    /// All snapshots ever taken, per worker then per generation
    history: Vec<Vec<Vec<Vertex>>>,
    total_evaluations: usize,
    /// Best-so-far triple: value, parameters, worker slot
    best: Option<(f64, Vec<f64>, usize)>,
    status: Status,
    tx: Option<UnboundedSender<GenerationStatus>>,
}

impl Genetics {
    /// Construct the controller and a fresh colony from validated
    /// settings, with every worker seeded from one deterministic stream
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let bounds = settings.bounds()?;
        let population = settings.config.population;
        let mut rng = Pcg64::seed_from_u64(settings.config.seed as u64);
        let seeds: Vec<u64> = (0..population).map(|_| rng.random::<u64>()).collect();
        let mut colony = Colony::create(
            population,
            bounds.clone(),
            settings.simplex,
            settings.colony,
            seeds,
        )?;
        for worker in colony.workers_mut() {
            worker.initial_vectors_random(settings.init.sampler);
        }
        Ok(Genetics {
            colony,
            rng,
            bounds,
            generation: 1,
            marriages: Vec::new(),
            current: vec![Vec::new(); population],
            history: vec![Vec::new(); population],
            total_evaluations: 0,
            best: None,
            status: Status::Starting,
            tx: None,
            settings,
        })
    }

    /// Attach a channel receiving one [GenerationStatus] per generation
    pub fn with_status_sender(mut self, tx: UnboundedSender<GenerationStatus>) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn total_evaluations(&self) -> usize {
        self.total_evaluations
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best.as_ref().map(|(value, _, _)| *value)
    }

    pub fn best_params(&self) -> Option<&[f64]> {
        self.best.as_ref().map(|(_, params, _)| params.as_slice())
    }

    pub fn best_worker(&self) -> Option<usize> {
        self.best.as_ref().map(|(_, _, worker)| *worker)
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn colony(&self) -> &Colony {
        &self.colony
    }

    pub fn colony_mut(&mut self) -> &mut Colony {
        &mut self.colony
    }

    pub fn marriages(&self) -> &[(usize, usize)] {
        &self.marriages
    }

    /// All snapshots ever taken, indexed by worker slot, then generation
    pub fn history(&self) -> &[Vec<Vec<Vertex>>] {
        &self.history
    }

    /// The best value any worker held at the end of generation `index`
    /// (zero-based)
    pub fn generation_best(&self, index: usize) -> Option<f64> {
        self.history
            .iter()
            .filter_map(|snapshots| snapshots.get(index))
            .filter_map(|snapshot| snapshot.first())
            .filter_map(|vertex| vertex.value())
            .filter(|value| !value.is_nan())
            .min_by(|a, b| a.partial_cmp(b).unwrap())
    }

    /// Run the whole optimization to termination
    ///
    /// Alternates between draining the colony and handing chunks to the
    /// evaluator, recombining between colony runs, until a generation or
    /// evaluation cap is reached.
    pub fn fit<E: Evaluate>(&mut self, evaluator: &E) -> Result<GaResult> {
        self.status = Status::InProgress;
        self.colony.restart();
        loop {
            match self.colony.run()? {
                ColonyState::NeedsEvaluation => evaluator.evaluate(self.colony.chunk_mut())?,
                ColonyState::Finished => {
                    if let Some(result) = self.on_colony_finished()? {
                        return Ok(result);
                    }
                }
            }
        }
    }

    /// The single outer transition, invoked when the colony reports
    /// [ColonyState::Finished]
    ///
    /// Snapshots the generation, checks the termination caps, ranks and
    /// recombines (or shrinks and reseeds), and restarts the colony.
    /// Returns the terminal result once a cap is reached.
    pub fn on_colony_finished(&mut self) -> Result<Option<GaResult>> {
        let span = tracing::info_span!("", "{}", format!("Generation {}", self.generation));
        let _enter = span.enter();

        self.snapshot();
        let generation_best = self.generation_best(self.history[0].len().saturating_sub(1));
        if let Some(value) = generation_best {
            tracing::info!(
                "Generation {} finished, best value {:.6e}, {} evaluations total",
                self.generation,
                value,
                self.total_evaluations
            );
        }

        let max_evaluations = self.settings.config.max_evaluations.unwrap_or(usize::MAX);
        if self.generation > self.settings.config.max_generations
            || self.total_evaluations >= max_evaluations
        {
            let result = self.finalize(max_evaluations);
            return Ok(Some(result));
        }

        let ranked = self.rank_by_fitness();
        let king = ranked[0];

        let shrink_cadence = self.settings.genetic.shrink_per_generations;
        let mut reproduced = true;
        if shrink_cadence > 0 && self.generation % shrink_cadence == 0 {
            self.shrink_boundaries(king);
            if self.settings.genetic.reset_on_shrink {
                self.generation += 1;
                self.reseed_population();
                reproduced = false;
            }
        }

        if reproduced {
            self.generation += 1;
            self.marriages = self.marry(&ranked);
            self.reproduce();
        }

        self.send_status(reproduced);
        self.colony.restart();
        Ok(None)
    }

    /// Deep-copy every worker's vertices into the current-generation map
    /// and append the same snapshot to the history
    fn snapshot(&mut self) {
        for (index, worker) in self.colony.workers().iter().enumerate() {
            let mut vertices = worker.vertices().to_vec();
            vertices.sort_by(|a, b| a.cmp_value(b));
            self.current[index] = vertices.clone();
            self.history[index].push(vertices);
            self.total_evaluations += worker.evaluation_count();

            if let Some(best) = self.current[index].first() {
                if let Some(value) = best.value() {
                    let improved = match &self.best {
                        Some((incumbent, _, _)) => value < *incumbent,
                        None => !value.is_nan(),
                    };
                    if improved {
                        self.best = Some((value, best.params().to_vec(), index));
                    }
                }
            }
        }
    }

    fn finalize(&mut self, max_evaluations: usize) -> GaResult {
        self.status = if self.total_evaluations >= max_evaluations {
            Status::MaxEvaluations
        } else {
            Status::MaxGenerations
        };
        let (best_value, best_params, best_worker) = self.find_global_best();
        self.best = Some((best_value, best_params.clone(), best_worker));
        tracing::info!(
            "{} after {} generations, best value {:.6e} from worker {}",
            self.status,
            self.generation,
            best_value,
            best_worker
        );
        self.send_status(false);
        GaResult {
            best_value,
            best_params,
            best_worker,
            generations: self.generation,
            evaluations: self.total_evaluations,
            status: self.status.clone(),
        }
    }

    /// Scan the entire history for the lowest value across all workers,
    /// vertices and generations
    fn find_global_best(&self) -> (f64, Vec<f64>, usize) {
        let mut best = (f64::INFINITY, Vec::new(), 0);
        for (worker, snapshots) in self.history.iter().enumerate() {
            for snapshot in snapshots {
                for vertex in snapshot {
                    if let Some(value) = vertex.value() {
                        if value < best.0 {
                            best = (value, vertex.params().to_vec(), worker);
                        }
                    }
                }
            }
        }
        best
    }

    /// Worker slots sorted by fitness, ascending; the head is the king
    fn rank_by_fitness(&self) -> Vec<usize> {
        let fitness: Vec<f64> = (0..self.colony.population())
            .map(|w| self.fitness_of(w))
            .collect();
        let mut ranked: Vec<usize> = (0..self.colony.population()).collect();
        ranked.sort_by(|&a, &b| nan_last(fitness[a], fitness[b]));
        ranked
    }

    fn fitness_of(&self, worker: usize) -> f64 {
        match self.settings.genetic.fitness {
            Fitness::Min => self.current[worker]
                .first()
                .map(|v| v.value_or_nan())
                .unwrap_or(f64::NAN),
            // The worst value the worker ever produced, over its entire
            // history rather than the current generation
            Fitness::Max => self.history[worker]
                .iter()
                .flatten()
                .map(|v| v.value_or_nan())
                .fold(f64::NEG_INFINITY, f64::max),
            Fitness::Average => {
                let snapshot = match self.history[worker].last() {
                    Some(snapshot) => snapshot,
                    None => return f64::NAN,
                };
                let sum: f64 = snapshot.iter().map(|v| v.value_or_nan()).sum();
                sum / snapshot.len() as f64
            }
        }
    }

    /// Shrink the search box around the king and push the new bounds to
    /// every worker
    fn shrink_boundaries(&mut self, king: usize) {
        let king_params: Vec<f64> = match self.current[king].first() {
            Some(vertex) => vertex.params().to_vec(),
            None => return,
        };
        match self.settings.genetic.shrink_mode {
            ShrinkMode::ShrinkAround => {
                self.bounds
                    .shrink_around(&king_params, self.settings.genetic.shrink_factor);
            }
            ShrinkMode::ChangeLowerIfNeg => {
                self.bounds.raise_negative_lower(&king_params);
            }
        }
        tracing::info!(
            "Generation {} shrunk the bounds around worker {}",
            self.generation,
            king
        );
        let bounds = self.bounds.clone();
        for worker in self.colony.workers_mut() {
            worker.set_bounds(bounds.clone());
        }
    }

    /// Throw away the population and draw fresh random vertices for
    /// every worker, skipping reproduction for this generation
    fn reseed_population(&mut self) {
        let sampler = self.settings.init.sampler;
        let seeds: Vec<u64> = (0..self.colony.population())
            .map(|_| self.rng.random::<u64>())
            .collect();
        for (worker, seed) in self.colony.workers_mut().iter_mut().zip(seeds) {
            worker.reseed(seed);
            worker.initial_vectors_random(sampler);
        }
        tracing::debug!("Population reseeded after shrink");
    }

    /// Build the marriage list from the fitness-ranked worker slots
    fn marry(&mut self, ranked: &[usize]) -> Vec<(usize, usize)> {
        let n = ranked.len();
        let pairs = n.div_ceil(2);
        if n == 1 {
            return vec![(ranked[0], ranked[0])];
        }
        let marriage = self.settings.genetic.marriage;
        match marriage {
            Marriage::KingHenry => (0..pairs).map(|k| (ranked[0], ranked[k + 1])).collect(),
            Marriage::Random => (0..pairs)
                .map(|_| {
                    let a = self.rng.random_range(0..n);
                    let mut b = self.rng.random_range(0..n);
                    while b == a {
                        b = self.rng.random_range(0..n);
                    }
                    (ranked[a], ranked[b])
                })
                .collect(),
            Marriage::RandomPreferable => (0..pairs)
                .map(|_| {
                    let a = self.tournament(n);
                    let mut b = self.tournament(n);
                    while b == a {
                        b = self.tournament(n);
                    }
                    (ranked[a], ranked[b])
                })
                .collect(),
            Marriage::Hierarchical => (0..pairs)
                .map(|k| {
                    if 2 * k + 1 < n {
                        (ranked[2 * k], ranked[2 * k + 1])
                    } else {
                        // Odd population: the trailing singleton marries
                        // the king
                        (ranked[n - 1], ranked[0])
                    }
                })
                .collect(),
            Marriage::BestWorst => (0..pairs)
                .map(|k| {
                    if k == n - 1 - k {
                        (ranked[k], ranked[0])
                    } else {
                        (ranked[k], ranked[n - 1 - k])
                    }
                })
                .collect(),
        }
    }

    /// Sample two ranks, keep the fitter (lower) one
    fn tournament(&mut self, n: usize) -> usize {
        let first = self.rng.random_range(0..n);
        let second = self.rng.random_range(0..n);
        first.min(second)
    }

    /// Overwrite the workers with two children per pair
    ///
    /// Parent genes are read from the history snapshots, so a parent that
    /// was already overwritten by an earlier pair still contributes its
    /// recorded vertices. Children take fresh names and all their vertex
    /// values are reset to unevaluated.
    fn reproduce(&mut self) {
        let n = self.colony.population();
        let d = self.colony.dim();
        let rho = self.settings.genetic.reproduction_percent;
        let marriages = self.marriages.clone();

        for (k, (father, mother)) in marriages.into_iter().enumerate() {
            let slot_one = 2 * k;
            if slot_one >= n {
                break;
            }
            let slot_two = slot_one + 1;

            let genes_father = self.parent_genes(father);
            let genes_mother = self.parent_genes(mother);
            let reproduction = self.settings.genetic.reproduction;
            let mode = match reproduction {
                Reproduction::RandomType => {
                    if self.rng.random::<f64>() < 0.5 {
                        Reproduction::DiscreteMixing
                    } else {
                        Reproduction::LinearCombination
                    }
                }
                mode => mode,
            };

            // Children default to the father's genome; coordinates only
            // recombine when the reproduction-percent draw allows it
            let mut child_one = genes_father.clone();
            let mut child_two = genes_father.clone();
            for v in 0..=d {
                for p in 0..d {
                    if self.rng.random::<f64>() >= rho {
                        continue;
                    }
                    let a = genes_father[v][p];
                    let b = genes_mother[v][p];
                    match mode {
                        Reproduction::DiscreteMixing => {
                            if self.rng.random::<f64>() < 0.5 {
                                child_one[v][p] = a;
                                child_two[v][p] = b;
                            } else {
                                child_one[v][p] = b;
                                child_two[v][p] = a;
                            }
                        }
                        Reproduction::LinearCombination => {
                            let m = 2.0 * self.rng.random::<f64>() - 0.5;
                            let (one, two) = mix_linear(m, a, b);
                            child_one[v][p] = one;
                            child_two[v][p] = two;
                        }
                        Reproduction::RandomType => unreachable!(),
                    }
                }
            }

            let name = format!("worker_{}_G{}", slot_one, self.generation);
            self.colony.worker_mut(slot_one).adopt(child_one, name);
            if slot_two < n {
                let name = format!("worker_{}_G{}", slot_two, self.generation);
                self.colony.worker_mut(slot_two).adopt(child_two, name);
            }
            // With an odd population the last pair produces a single
            // child; the second genome is dropped
        }
    }

    /// A parent's genome: the vertex parameters of its latest snapshot
    fn parent_genes(&self, worker: usize) -> Vec<Vec<f64>> {
        self.history[worker]
            .last()
            .map(|snapshot| snapshot.iter().map(|v| v.params().to_vec()).collect())
            .unwrap_or_default()
    }

    fn send_status(&self, reproduced: bool) {
        if let Some(tx) = &self.tx {
            let latest = self.history[0].len().saturating_sub(1);
            let status = GenerationStatus {
                generation: self.generation,
                best_value: self.generation_best(latest).unwrap_or(f64::NAN),
                best_so_far: self.best_value().unwrap_or(f64::NAN),
                evaluations: self.total_evaluations,
                reproduced,
                lower: self.bounds.lower().to_vec(),
                upper: self.bounds.upper().to_vec(),
            };
            let _ = tx.send(status);
        }
    }
}

/// Blend a coordinate pair with mixing weight `m`
///
/// Swapping the parents and replacing `m` with `1 - m` yields the same
/// children, which keeps the operator symmetric
pub(crate) fn mix_linear(m: f64, a: f64, b: f64) -> (f64, f64) {
    (m * a + (1.0 - m) * b, m * b + (1.0 - m) * a)
}

fn nan_last(a: f64, b: f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        (false, true) => std::cmp::Ordering::Less,
        (true, false) => std::cmp::Ordering::Greater,
        (true, true) => std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::settings::{Parameters, Settings};

    fn settings(population: usize) -> Settings {
        let parameters = Parameters::new()
            .add("x0", -10.0, 10.0)
            .unwrap()
            .add("x1", -10.0, 10.0)
            .unwrap();
        Settings::builder()
            .set_parameters(parameters)
            .set_population(population)
            .set_seed(0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_marriage_king_henry() {
        let mut genetics = Genetics::new(settings(5)).unwrap();
        genetics.settings.genetic.marriage = Marriage::KingHenry;
        let ranked = vec![3, 1, 4, 0, 2];
        let pairs = genetics.marry(&ranked);
        assert_eq!(pairs, vec![(3, 1), (3, 4), (3, 0)]);
    }

    #[test]
    fn test_marriage_hierarchical_wraps_singleton() {
        let mut genetics = Genetics::new(settings(5)).unwrap();
        genetics.settings.genetic.marriage = Marriage::Hierarchical;
        let ranked = vec![0, 1, 2, 3, 4];
        let pairs = genetics.marry(&ranked);
        assert_eq!(pairs, vec![(0, 1), (2, 3), (4, 0)]);
    }

    #[test]
    fn test_marriage_best_worst_self_pair_fallback() {
        let mut genetics = Genetics::new(settings(5)).unwrap();
        genetics.settings.genetic.marriage = Marriage::BestWorst;
        let ranked = vec![0, 1, 2, 3, 4];
        let pairs = genetics.marry(&ranked);
        assert_eq!(pairs, vec![(0, 4), (1, 3), (2, 0)]);
    }

    #[test]
    fn test_marriage_random_never_self_pairs() {
        let mut genetics = Genetics::new(settings(6)).unwrap();
        genetics.settings.genetic.marriage = Marriage::Random;
        let ranked: Vec<usize> = (0..6).collect();
        for _ in 0..50 {
            for (a, b) in genetics.marry(&ranked) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_snapshot_idempotent() {
        let mut genetics = Genetics::new(settings(3)).unwrap();
        // Snapshotting an unchanged colony twice yields identical
        // history entries
        genetics.snapshot();
        genetics.snapshot();
        for snapshots in genetics.history() {
            assert_eq!(snapshots.len(), 2);
            assert_eq!(snapshots[0], snapshots[1]);
        }
    }

    #[test]
    fn test_mix_linear_symmetry() {
        let (one, two) = mix_linear(0.3, 2.0, 5.0);
        let (swapped_one, swapped_two) = mix_linear(0.7, 5.0, 2.0);
        assert!((one - swapped_one).abs() < 1e-12);
        assert!((two - swapped_two).abs() < 1e-12);
    }

    #[test]
    fn test_nan_ranks_last() {
        let fitness = [f64::NAN, 1.0, 0.5];
        let mut ranked: Vec<usize> = (0..3).collect();
        ranked.sort_by(|&a, &b| nan_last(fitness[a], fitness[b]));
        assert_eq!(ranked, vec![2, 1, 0]);
    }
}
