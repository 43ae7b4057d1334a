use serde::{Deserialize, Serialize};

pub mod colony;
pub mod genetics;
pub mod simplex;

/// Represents the status of the optimization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The optimizer has been constructed but not started
    Starting,
    /// The optimizer is currently running
    InProgress,
    /// The run stopped after reaching the maximum number of generations
    MaxGenerations,
    /// The run stopped after exhausting the evaluation budget
    MaxEvaluations,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Starting => write!(f, "Starting"),
            Status::InProgress => write!(f, "In progress"),
            Status::MaxGenerations => write!(f, "Maximum generations reached"),
            Status::MaxEvaluations => write!(f, "Maximum evaluations reached"),
        }
    }
}

/// Terminal summary of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaResult {
    /// Lowest value found across all workers, vertices and generations
    pub best_value: f64,
    /// Parameters of the best point
    pub best_params: Vec<f64>,
    /// Worker slot that produced the best point
    pub best_worker: usize,
    /// Generations executed, including the terminal one
    pub generations: usize,
    /// Total objective evaluations spent
    pub evaluations: usize,
    /// Why the run stopped
    pub status: Status,
}

/// Per-generation progress record, sent over the optional status channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub generation: usize,
    /// Best value in the generation that just finished
    pub best_value: f64,
    /// Best value seen over the whole run so far
    pub best_so_far: f64,
    /// Cumulative evaluations across all generations
    pub evaluations: usize,
    /// False for generations re-seeded by reset-on-shrink
    pub reproduced: bool,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}
