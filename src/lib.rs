//! nmcore is a derivative-free global optimizer for bounded, real-valued
//! parameter spaces.
//!
//! The engine nests two algorithms: a colony of independent Nelder-Mead
//! simplexes performs local search, and a generational genetic algorithm
//! reseeds the colony by recombining the surviving simplexes between
//! runs. To keep expensive objectives efficient, algorithmic progress is
//! decoupled from evaluation: the simplexes emit batches of candidate
//! points that an external evaluator computes, possibly in parallel,
//! before control returns to the core.
//!
//! ```no_run
//! use nmcore::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let parameters = Parameters::new()
//!         .add("x0", -10.0, 10.0)?
//!         .add("x1", -10.0, 10.0)?;
//!
//!     let settings = Settings::builder()
//!         .set_parameters(parameters)
//!         .set_population(8)
//!         .set_seed(42)
//!         .build()?;
//!
//!     setup_log(&settings)?;
//!
//!     let evaluator = ParObjective::new(|p: &[f64]| p.iter().map(|x| x * x).sum());
//!     let mut genetics = Genetics::new(settings)?;
//!     let result = genetics.fit(&evaluator)?;
//!
//!     println!("best {} at {:?}", result.best_value, result.best_params);
//!     Ok(())
//! }
//! ```

pub mod algorithms;
pub mod routines;
pub mod structs;

pub mod prelude {
    pub use crate::algorithms::colony::{Colony, ColonyState};
    pub use crate::algorithms::genetics::{Fitness, Genetics, Marriage, Reproduction};
    pub use crate::algorithms::simplex::Simplex;
    pub use crate::algorithms::{GaResult, GenerationStatus, Status};
    pub use crate::routines::evaluation::{Evaluate, Objective, ParObjective};
    pub use crate::routines::initialization::Sampler;
    pub use crate::routines::logger::setup_log;
    pub use crate::routines::settings::{
        self, ColonyConfig, Parameters, Settings, SimplexSpec,
    };
    pub use crate::structs::bounds::{BoundaryPolicy, Bounds, ShrinkMode};
    pub use crate::structs::chunk::EvalRequest;
    pub use crate::structs::vertex::Vertex;
}
