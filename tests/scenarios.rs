use anyhow::Result;
use nmcore::prelude::*;
use nmcore::routines::settings::Genetic;

fn sphere(p: &[f64]) -> f64 {
    p.iter().map(|x| x * x).sum()
}

fn griewank(p: &[f64]) -> f64 {
    let sum: f64 = p.iter().map(|x| x * x / 4000.0).sum();
    let product: f64 = p
        .iter()
        .enumerate()
        .map(|(i, x)| (x / ((i + 1) as f64).sqrt()).cos())
        .product();
    1.0 + sum - product
}

/// Sphere in two dimensions, a single simplex and a 200-evaluation budget
#[test]
fn test_sphere_single_simplex() -> Result<()> {
    let params = Parameters::new()
        .add("x0", -10.0, 10.0)?
        .add("x1", -10.0, 10.0)?;
    let simplex = SimplexSpec {
        max_evaluations: 200,
        ..SimplexSpec::default()
    };
    let genetic = Genetic {
        reproduction_percent: 1.0,
        ..Genetic::default()
    };
    let colony = ColonyConfig {
        chunk_size: 1,
        lazy_workers: true,
    };
    let settings = Settings::builder()
        .set_parameters(params)
        .set_population(1)
        .set_seed(0)
        .set_max_evaluations(200)
        .set_simplex(simplex)
        .set_genetic(genetic)
        .set_colony(colony)
        .build()?;

    let result = Genetics::new(settings)?.fit(&Objective::new(sphere))?;

    assert!(result.best_value <= 1e-6, "got {}", result.best_value);
    assert!(result.best_params.iter().all(|x| x.abs() < 1e-2));

    Ok(())
}

/// Griewank in 24 dimensions with a 16-worker colony over 10 generations
#[test]
fn test_griewank_population() -> Result<()> {
    let mut params = Parameters::new();
    for i in 0..24 {
        params = params.add(format!("x{}", i), -10_000.0, 10_000.0)?;
    }
    let simplex = SimplexSpec {
        max_evaluations: 20_000,
        ..SimplexSpec::default()
    };
    let genetic = Genetic {
        fitness: Fitness::Min,
        marriage: Marriage::RandomPreferable,
        reproduction: Reproduction::RandomType,
        reproduction_percent: 1.0,
        ..Genetic::default()
    };
    let colony = ColonyConfig {
        chunk_size: 16,
        lazy_workers: true,
    };
    let settings = Settings::builder()
        .set_parameters(params)
        .set_population(16)
        .set_seed(0)
        .set_max_generations(10)
        .set_simplex(simplex)
        .set_genetic(genetic)
        .set_colony(colony)
        .build()?;

    let mut genetics = Genetics::new(settings)?;
    let result = genetics.fit(&ParObjective::new(griewank))?;

    assert!(result.best_value <= 1e-2, "got {}", result.best_value);

    // The global-best scan over the whole history can never be beaten by
    // any single generation's final best
    let generations = genetics.history()[0].len();
    assert!(generations > 1);
    for index in 0..generations {
        let final_best = genetics.generation_best(index).unwrap();
        assert!(result.best_value <= final_best);
    }

    Ok(())
}

/// A constant objective terminates through the relative-size criterion
#[test]
fn test_constant_objective() -> Result<()> {
    let params = Parameters::new()
        .add("x0", -10.0, 10.0)?
        .add("x1", -10.0, 10.0)?;
    let simplex = SimplexSpec {
        max_evaluations: 100_000,
        min_relative_size: 1e-8,
        ..SimplexSpec::default()
    };
    let settings = Settings::builder()
        .set_parameters(params)
        .set_population(1)
        .set_seed(0)
        .set_max_generations(1)
        .set_simplex(simplex)
        .build()?;

    let result = Genetics::new(settings)?.fit(&Objective::new(|_: &[f64]| 7.0))?;

    assert_eq!(result.best_value, 7.0);
    // Far fewer evaluations than the budget: the simplex collapsed and
    // stopped on size, not on the cap
    assert!(result.evaluations < 10_000, "got {}", result.evaluations);
    assert_eq!(result.status, Status::MaxGenerations);

    Ok(())
}

/// Sticky boundary pushes the optimum into a corner of the unit box
#[test]
fn test_sticky_boundary_corner() -> Result<()> {
    let params = Parameters::new()
        .add("x0", 0.0, 1.0)?
        .add("x1", 0.0, 1.0)?;
    let simplex = SimplexSpec {
        max_evaluations: 300,
        boundary: BoundaryPolicy::Sticky,
        force_boundary: true,
        ..SimplexSpec::default()
    };
    let settings = Settings::builder()
        .set_parameters(params)
        .set_population(1)
        .set_seed(0)
        .set_max_generations(1)
        .set_simplex(simplex)
        .build()?;

    let mut genetics = Genetics::new(settings)?;
    genetics
        .colony_mut()
        .worker_mut(0)
        .initial_vectors_scalar(&[0.9, 0.9], 0.05)?;

    // Drive the colony by hand so every emitted chunk can be checked
    // against the box
    let bounds = Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0])?;
    let result = loop {
        genetics.colony_mut().restart();
        loop {
            match genetics.colony_mut().run()? {
                ColonyState::NeedsEvaluation => {
                    for request in genetics.colony_mut().chunk_mut() {
                        assert!(bounds.contains(request.params()));
                        let value = -(request.params()[0] + request.params()[1]);
                        request.write(value);
                    }
                }
                ColonyState::Finished => break,
            }
        }
        if let Some(result) = genetics.on_colony_finished()? {
            break result;
        }
    };

    assert!((result.best_params[0] - 1.0).abs() < 1e-6);
    assert!((result.best_params[1] - 1.0).abs() < 1e-6);

    Ok(())
}

/// Reset-on-shrink reseeds the population and skips reproduction
#[test]
fn test_reset_on_shrink() -> Result<()> {
    let mut params = Parameters::new();
    for i in 0..4 {
        params = params.add(format!("x{}", i), -600.0, 600.0)?;
    }
    let simplex = SimplexSpec {
        max_evaluations: 400,
        ..SimplexSpec::default()
    };
    let genetic = Genetic {
        shrink_per_generations: 2,
        reset_on_shrink: true,
        shrink_factor: 0.25,
        ..Genetic::default()
    };
    let settings = Settings::builder()
        .set_parameters(params)
        .set_population(4)
        .set_seed(0)
        .set_max_generations(5)
        .set_simplex(simplex)
        .set_genetic(genetic)
        .build()?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut genetics = Genetics::new(settings)?.with_status_sender(tx);
    genetics.fit(&Objective::new(griewank))?;

    let mut statuses: Vec<GenerationStatus> = Vec::new();
    while let Ok(status) = rx.try_recv() {
        statuses.push(status);
    }

    // Generation 2 triggers the shrink; the reseeded generation 3 skips
    // reproduction and runs inside a tighter box
    let reset = statuses
        .iter()
        .find(|s| !s.reproduced && s.generation == 3)
        .expect("no reset generation observed");
    assert!(reset.upper[0] - reset.lower[0] < 1200.0);

    // The re-seeded trajectory is discontinuous: the generation after the
    // reset starts from fresh random points rather than refined children
    assert!(statuses.iter().any(|s| s.reproduced));

    Ok(())
}

/// A lazily scheduled colony dies with its first finished worker
#[test]
fn test_lazy_workers() -> Result<()> {
    let params = Parameters::new()
        .add("x0", -10.0, 10.0)?
        .add("x1", -10.0, 10.0)?;
    let simplex = SimplexSpec {
        max_evaluations: 500,
        ..SimplexSpec::default()
    };
    let colony = ColonyConfig {
        chunk_size: 1,
        lazy_workers: true,
    };
    let settings = Settings::builder()
        .set_parameters(params)
        .set_population(4)
        .set_seed(0)
        .set_simplex(simplex)
        .set_colony(colony)
        .build()?;

    let mut genetics = Genetics::new(settings)?;
    // One worker finishes right after its first full iteration
    genetics.colony_mut().worker_mut(0).set_max_evaluations(4)?;

    genetics.colony_mut().restart();
    loop {
        match genetics.colony_mut().run()? {
            ColonyState::NeedsEvaluation => {
                for request in genetics.colony_mut().chunk_mut() {
                    let value = sphere(request.params());
                    request.write(value);
                }
            }
            ColonyState::Finished => break,
        }
    }

    for worker in genetics.colony().workers() {
        assert!(worker.is_finished());
    }
    // The survivors were cut short after at most a couple of operations
    // beyond their initial batch
    for index in 1..4 {
        let worker = genetics.colony().worker(index);
        assert!(
            worker.evaluation_count() <= 8,
            "worker {} spent {} evaluations",
            index,
            worker.evaluation_count()
        );
    }

    Ok(())
}
