use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::structs::bounds::Bounds;

/// The sampler used to draw initial simplex vertices inside the box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sampler {
    /// Every coordinate drawn uniformly in its range
    Uniform,
    /// Latin Hypercube stratification across the vertices
    LatinHypercube,
}

/// Draw `points` parameter vectors inside `bounds`
///
/// With [Sampler::Uniform] each coordinate is drawn independently. With
/// [Sampler::LatinHypercube] the range of each dimension is split into
/// `points` intervals and each vertex lands in a distinct interval per
/// dimension, which spreads a small vertex set more evenly than plain
/// uniform sampling.
pub fn sample<R: Rng>(
    sampler: Sampler,
    bounds: &Bounds,
    points: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    match sampler {
        Sampler::Uniform => uniform(bounds, points, rng),
        Sampler::LatinHypercube => latin(bounds, points, rng),
    }
}

fn uniform<R: Rng>(bounds: &Bounds, points: usize, rng: &mut R) -> Vec<Vec<f64>> {
    (0..points)
        .map(|_| {
            (0..bounds.dim())
                .map(|i| rng.random_range(bounds.lower()[i]..=bounds.upper()[i]))
                .collect()
        })
        .collect()
}

fn latin<R: Rng>(bounds: &Bounds, points: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let dim = bounds.dim();

    // Create and shuffle intervals for each dimension
    let mut intervals = Vec::new();
    for _ in 0..dim {
        let mut dim_intervals: Vec<f64> = (0..points).map(|i| i as f64).collect();
        dim_intervals.shuffle(rng);
        intervals.push(dim_intervals);
    }

    (0..points)
        .map(|p| {
            (0..dim)
                .map(|j| {
                    let interval = intervals[j][p];
                    let random_offset = rng.random::<f64>();
                    // Normalized value in [0,1], scaled to the range
                    let unscaled = (interval + random_offset) / points as f64;
                    bounds.lower()[j] + unscaled * bounds.range(j)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_uniform_inside_bounds() {
        let bounds = Bounds::new(vec![-2.0, 5.0], vec![3.0, 6.0]).unwrap();
        let mut rng = Pcg64::seed_from_u64(42);
        for point in sample(Sampler::Uniform, &bounds, 20, &mut rng) {
            assert!(bounds.contains(&point));
        }
    }

    #[test]
    fn test_latin_stratifies() {
        let bounds = Bounds::new(vec![0.0], vec![1.0]).unwrap();
        let mut rng = Pcg64::seed_from_u64(42);
        let points = sample(Sampler::LatinHypercube, &bounds, 10, &mut rng);
        // Each of the ten tenths of the range must hold exactly one point
        let mut cells: Vec<usize> = points
            .iter()
            .map(|p| (p[0] * 10.0).floor() as usize)
            .collect();
        cells.sort_unstable();
        assert_eq!(cells, (0..10).collect::<Vec<usize>>());
    }
}
