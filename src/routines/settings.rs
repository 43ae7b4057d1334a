use anyhow::{bail, Result};
use config::Config as eConfig;
use serde::{Deserialize, Serialize};

use crate::algorithms::genetics::{Fitness, Marriage, Reproduction};
use crate::routines::initialization::Sampler;
use crate::structs::bounds::{BoundaryPolicy, Bounds, ShrinkMode};

/// Contains all settings for nmcore
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// General configuration settings
    pub config: Config,
    /// Parameters to be optimized
    pub parameters: Parameters,
    /// Hyperparameters of the per-worker downhill simplex
    pub simplex: SimplexSpec,
    /// Scheduling options for the colony
    pub colony: ColonyConfig,
    /// Policies of the genetic layer
    pub genetic: Genetic,
    /// Configuration for the initial vertex sampler
    pub init: Init,
    /// Configuration for logging
    pub log: Log,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            config: Config::default(),
            parameters: Parameters::new(),
            simplex: SimplexSpec::default(),
            colony: ColonyConfig::default(),
            genetic: Genetic::default(),
            init: Init::default(),
            log: Log::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    pub fn builder() -> SettingsBuilder {
        SettingsBuilder {
            settings: Settings::default(),
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.config.population == 0 {
            bail!("Population must be at least 1");
        }
        if self.parameters.is_empty() {
            bail!("At least one parameter must be defined");
        }
        self.simplex.validate(self.parameters.len())?;
        self.colony.validate()?;
        self.genetic.validate()?;
        Ok(())
    }

    /// The box bounds spanned by the parameter definitions
    pub fn bounds(&self) -> Result<Bounds> {
        Bounds::from_ranges(&self.parameters.ranges())
    }

    /// The dimension of the search space
    pub fn dim(&self) -> usize {
        self.parameters.len()
    }

    pub fn set_population(&mut self, population: usize) -> Result<()> {
        if population == 0 {
            bail!("Population must be at least 1");
        }
        self.config.population = population;
        Ok(())
    }

    pub fn set_max_generations(&mut self, max_generations: usize) {
        self.config.max_generations = max_generations;
    }

    pub fn set_max_evaluations(&mut self, max_evaluations: usize) {
        self.config.max_evaluations = Some(max_evaluations);
    }

    pub fn set_seed(&mut self, seed: usize) {
        self.config.seed = seed;
    }
}

/// Builder for [Settings], mirroring the setter surface
///
/// Only the parameters are mandatory; every other section starts from its
/// default and may be adjusted through the `set_*` methods
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn set_parameters(mut self, parameters: Parameters) -> Self {
        self.settings.parameters = parameters;
        self
    }

    pub fn set_population(mut self, population: usize) -> Self {
        self.settings.config.population = population;
        self
    }

    pub fn set_seed(mut self, seed: usize) -> Self {
        self.settings.config.seed = seed;
        self
    }

    pub fn set_max_generations(mut self, max_generations: usize) -> Self {
        self.settings.config.max_generations = max_generations;
        self
    }

    pub fn set_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.settings.config.max_evaluations = Some(max_evaluations);
        self
    }

    pub fn set_simplex(mut self, simplex: SimplexSpec) -> Self {
        self.settings.simplex = simplex;
        self
    }

    pub fn set_colony(mut self, colony: ColonyConfig) -> Self {
        self.settings.colony = colony;
        self
    }

    pub fn set_genetic(mut self, genetic: Genetic) -> Self {
        self.settings.genetic = genetic;
        self
    }

    pub fn set_init(mut self, init: Init) -> Self {
        self.settings.init = init;
        self
    }

    pub fn set_log(mut self, log: Log) -> Self {
        self.settings.log = log;
        self
    }

    /// Validate and return the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// General configuration settings
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Number of simplexes in the colony, static across generations
    pub population: usize,
    /// Maximum number of generations to run
    pub max_generations: usize,
    /// Cap on the total number of evaluations across the whole run
    ///
    /// `None` (the default) leaves the run bounded by `max_generations` only
    pub max_evaluations: Option<usize>,
    /// Seed for the random number generator
    pub seed: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            population: 1,
            max_generations: 10,
            max_evaluations: None,
            seed: 347,
        }
    }
}

/// Defines a parameter to be optimized
///
/// Parameters must be bounded. The lower and upper bounds are defined by the
/// `lower` and `upper` fields, respectively.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Parameter {
    pub(crate) name: String,
    pub(crate) lower: f64,
    pub(crate) upper: f64,
}

impl Parameter {
    /// Create a new parameter
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Result<Self> {
        let name = name.into();
        if !(lower < upper) {
            bail!(
                "In key '{}', lower bound ({}) is not less than upper bound ({})",
                name,
                lower,
                upper
            );
        }
        Ok(Parameter { name, lower, upper })
    }
}

/// This structure contains information on all [Parameter]s to be optimized
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Parameters {
    parameters: Vec<Parameter>,
}

impl Parameters {
    /// Create a new set of parameters
    pub fn new() -> Self {
        Parameters {
            parameters: Vec::new(),
        }
    }

    /// Add a parameter to the set
    pub fn add(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Result<Self> {
        let parameter = Parameter::new(name, lower, upper)?;
        self.parameters.push(parameter);
        Ok(self)
    }

    /// Get a parameter by name
    pub fn get(&self, name: impl Into<String>) -> Option<&Parameter> {
        let name = name.into();
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Get the names of the parameters
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Get the ranges of the parameters
    pub fn ranges(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| (p.lower, p.upper)).collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// Hyperparameters of the per-worker Nelder-Mead simplex
#[derive(Debug, Deserialize, Clone, Copy, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SimplexSpec {
    /// Expansion factor, must be greater than 1
    pub grow_factor: f64,
    /// Contraction factor, must lie strictly between 0 and 1
    pub shrink_factor: f64,
    /// Evaluation budget per simplex and colony run
    ///
    /// Must exceed `D + 1`, the cost of evaluating the initial vertices
    pub max_evaluations: usize,
    /// Relative-size stopping criterion
    pub min_relative_size: f64,
    /// Whether to apply the boundary policy at all
    pub force_boundary: bool,
    /// What to do with coordinates that leave the box
    pub boundary: BoundaryPolicy,
}

impl Default for SimplexSpec {
    fn default() -> Self {
        SimplexSpec {
            grow_factor: 2.0,
            shrink_factor: 0.5,
            max_evaluations: 1000,
            min_relative_size: 1e-9,
            force_boundary: true,
            boundary: BoundaryPolicy::Sticky,
        }
    }
}

impl SimplexSpec {
    pub fn validate(&self, dim: usize) -> Result<()> {
        if self.grow_factor <= 1.0 {
            bail!(
                "Grow factor must be greater than 1, got {}",
                self.grow_factor
            );
        }
        if self.shrink_factor <= 0.0 || self.shrink_factor >= 1.0 {
            bail!(
                "Shrink factor must lie strictly between 0 and 1, got {}",
                self.shrink_factor
            );
        }
        if self.max_evaluations <= dim + 1 {
            bail!(
                "A simplex in {} dimensions needs more than {} evaluations, got {}",
                dim,
                dim + 1,
                self.max_evaluations
            );
        }
        if !(self.min_relative_size >= 0.0) {
            bail!(
                "Minimum relative size must be non-negative, got {}",
                self.min_relative_size
            );
        }
        Ok(())
    }
}

/// Scheduling options for the colony
#[derive(Debug, Deserialize, Clone, Copy, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ColonyConfig {
    /// Target size of an evaluation batch
    ///
    /// A chunk size of 1 yields to the evaluator after every request
    pub chunk_size: usize,
    /// Stop the whole colony as soon as one worker finishes
    pub lazy_workers: bool,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        ColonyConfig {
            chunk_size: 1,
            lazy_workers: true,
        }
    }
}

impl ColonyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("Evaluation chunk size must be at least 1");
        }
        Ok(())
    }
}

/// Policies of the genetic layer
#[derive(Debug, Deserialize, Clone, Copy, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Genetic {
    /// How a worker's scalar fitness is computed from its snapshot
    pub fitness: Fitness,
    /// How workers are paired for reproduction
    pub marriage: Marriage,
    /// How children are recombined from their parents
    pub reproduction: Reproduction,
    /// Probability that a coordinate undergoes recombination at all
    pub reproduction_percent: f64,
    /// Shrink the search box every this many generations, 0 disables
    pub shrink_per_generations: usize,
    /// Width multiplier used by the boundary shrinking step
    pub shrink_factor: f64,
    /// How the boundary shrinking step recenters the box
    pub shrink_mode: ShrinkMode,
    /// Re-seed all workers with fresh random vertices after a shrink,
    /// skipping reproduction for that generation
    pub reset_on_shrink: bool,
}

impl Default for Genetic {
    fn default() -> Self {
        Genetic {
            fitness: Fitness::Min,
            marriage: Marriage::KingHenry,
            reproduction: Reproduction::DiscreteMixing,
            reproduction_percent: 0.5,
            shrink_per_generations: 0,
            shrink_factor: 0.5,
            shrink_mode: ShrinkMode::ShrinkAround,
            reset_on_shrink: false,
        }
    }
}

impl Genetic {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reproduction_percent) {
            bail!(
                "Reproduction percent must lie in [0, 1], got {}",
                self.reproduction_percent
            );
        }
        if !(self.shrink_factor >= 0.0) {
            bail!(
                "Boundary shrink factor must be non-negative, got {}",
                self.shrink_factor
            );
        }
        Ok(())
    }
}

/// Configuration for the initial vertex sampler
#[derive(Debug, Deserialize, Clone, Copy, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Init {
    /// The sampler used to draw initial simplex vertices
    pub sampler: Sampler,
}

impl Default for Init {
    fn default() -> Self {
        Init {
            sampler: Sampler::Uniform,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// The log level is defined as a string, and can be one of the following:
    /// - `trace`
    /// - `debug`
    /// - `info`
    /// - `warn`
    /// - `error`
    pub level: String,
    /// Whether to install a global subscriber
    ///
    /// If set to `false`, a global subscriber will not be set by nmcore.
    /// This can be useful when the user wants to use a custom subscriber, or
    /// perform benchmarks.
    pub write: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            write: true,
        }
    }
}

/// Parses the settings from a TOML configuration file
///
/// Entries in the TOML file may be overridden by environment variables. The
/// environment variables must be prefixed with `NMCORE_`, and the TOML entry
/// must be in uppercase. A single underscore, `_`, is used as the separator
/// for nested entries.
pub fn read(path: impl Into<String>) -> Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(config::Environment::with_prefix("NMCORE").separator("_"))
        .build()?;

    let settings: Settings = parsed.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
