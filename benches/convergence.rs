use criterion::{criterion_group, criterion_main, Criterion};
use nmcore::prelude::*;
use nmcore::routines::settings::Log;

fn sphere(p: &[f64]) -> f64 {
    p.iter().map(|x| x * x).sum()
}

fn settings(population: usize) -> Settings {
    let mut params = Parameters::new();
    for i in 0..6 {
        params = params.add(format!("x{}", i), -10.0, 10.0).unwrap();
    }
    let simplex = SimplexSpec {
        max_evaluations: 400,
        ..SimplexSpec::default()
    };
    Settings::builder()
        .set_parameters(params)
        .set_population(population)
        .set_seed(347)
        .set_max_generations(4)
        .set_simplex(simplex)
        .set_log(Log {
            level: String::from("warn"),
            write: false,
        })
        .build()
        .unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("sphere_6d");

    group.bench_function("population_4", |b| {
        b.iter(|| {
            let mut genetics = Genetics::new(settings(4)).unwrap();
            genetics.fit(&Objective::new(sphere)).unwrap()
        })
    });

    group.bench_function("population_16", |b| {
        b.iter(|| {
            let mut genetics = Genetics::new(settings(16)).unwrap();
            genetics.fit(&Objective::new(sphere)).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);
