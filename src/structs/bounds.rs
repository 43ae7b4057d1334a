use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Iteration cap for the Periodic wrapping loop
const PERIODIC_MAX_FOLDS: usize = 100;
/// Iteration cap for the Reflective folding loop
const REFLECTIVE_MAX_FOLDS: usize = 1000;

/// The box constraint `[lower, upper]^D` the search is confined to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// Create bounds from lower and upper corner vectors
    ///
    /// Each pair must satisfy `upper[i] > lower[i]`, and both vectors must
    /// have the same, non-zero length
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.is_empty() {
            bail!("Bounds must have at least one dimension");
        }
        if lower.len() != upper.len() {
            bail!(
                "Lower bounds have {} dimensions, but upper bounds have {}",
                lower.len(),
                upper.len()
            );
        }
        for (i, (lo, up)) in lower.iter().zip(upper.iter()).enumerate() {
            if !(up > lo) {
                bail!(
                    "In dimension {}, lower bound ({}) is not less than upper bound ({})",
                    i,
                    lo,
                    up
                );
            }
        }
        Ok(Bounds { lower, upper })
    }

    /// Create bounds from a list of `(lower, upper)` ranges
    pub fn from_ranges(ranges: &[(f64, f64)]) -> Result<Self> {
        let (lower, upper) = ranges.iter().copied().unzip();
        Bounds::new(lower, upper)
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// The width of the box in dimension `i`
    pub fn range(&self, i: usize) -> f64 {
        self.upper[i] - self.lower[i]
    }

    /// Whether `params` lies inside the box, boundary included
    pub fn contains(&self, params: &[f64]) -> bool {
        params
            .iter()
            .enumerate()
            .all(|(i, x)| *x >= self.lower[i] && *x <= self.upper[i])
    }

    /// Recenter the box around `center`, scaling each width by `factor`
    ///
    /// The new box in dimension `i` is `center[i] ± range(i) * factor`
    pub fn shrink_around(&mut self, center: &[f64], factor: f64) {
        for i in 0..self.dim() {
            let r = self.range(i);
            self.upper[i] = center[i] + r * factor;
            self.lower[i] = center[i] - r * factor;
        }
    }

    /// Raise every negative lower bound to the corresponding coordinate of
    /// `center`, leaving non-negative lower bounds untouched
    pub fn raise_negative_lower(&mut self, center: &[f64]) {
        for i in 0..self.dim() {
            if self.lower[i] < 0.0 {
                self.lower[i] = center[i];
            }
        }
    }
}

/// How the boundary shrinking step recenters the box, see
/// [`Genetics`](crate::algorithms::genetics::Genetics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShrinkMode {
    /// Recenter the box around the king, scaling widths by the shrink factor
    ShrinkAround,
    /// Raise negative lower bounds to the king's coordinates
    ChangeLowerIfNeg,
}

/// What to do with a coordinate that an extrapolation pushed outside the box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Clamp to the violated bound
    Sticky,
    /// Resample uniformly inside the bounds
    Random,
    /// Wrap around by repeated subtraction of the range
    ///
    /// The wrapping loop is capped at 100 iterations; a coordinate still
    /// outside after that is left as computed
    Periodic,
    /// Fold back across the violated bound
    ///
    /// The folding loop is capped at 1000 iterations, with the same
    /// fall-through as Periodic
    Reflective,
}

impl BoundaryPolicy {
    /// Map a single coordinate back inside `[lower, upper]`
    pub fn apply<R: Rng>(&self, x: f64, lower: f64, upper: f64, rng: &mut R) -> f64 {
        if x >= lower && x <= upper {
            return x;
        }
        match self {
            BoundaryPolicy::Sticky => x.clamp(lower, upper),
            BoundaryPolicy::Random => rng.random_range(lower..=upper),
            BoundaryPolicy::Periodic => {
                let range = upper - lower;
                let mut x = x;
                for _ in 0..PERIODIC_MAX_FOLDS {
                    if x > upper {
                        x -= range;
                    } else if x < lower {
                        x += range;
                    } else {
                        break;
                    }
                }
                x
            }
            BoundaryPolicy::Reflective => {
                let mut x = x;
                for _ in 0..REFLECTIVE_MAX_FOLDS {
                    if x > upper {
                        x = 2.0 * upper - x;
                    } else if x < lower {
                        x = 2.0 * lower - x;
                    } else {
                        break;
                    }
                }
                x
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_bounds_validation() {
        assert!(Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).is_ok());
        assert!(Bounds::new(vec![], vec![]).is_err());
        assert!(Bounds::new(vec![0.0], vec![1.0, 2.0]).is_err());
        assert!(Bounds::new(vec![1.0], vec![1.0]).is_err());
        assert!(Bounds::new(vec![2.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_sticky() {
        let mut rng = Pcg64::seed_from_u64(0);
        let p = BoundaryPolicy::Sticky;
        assert_eq!(p.apply(1.5, 0.0, 1.0, &mut rng), 1.0);
        assert_eq!(p.apply(-0.5, 0.0, 1.0, &mut rng), 0.0);
        assert_eq!(p.apply(0.5, 0.0, 1.0, &mut rng), 0.5);
    }

    #[test]
    fn test_random_stays_inside() {
        let mut rng = Pcg64::seed_from_u64(0);
        let p = BoundaryPolicy::Random;
        for _ in 0..100 {
            let x = p.apply(7.0, -1.0, 2.0, &mut rng);
            assert!((-1.0..=2.0).contains(&x));
        }
    }

    #[test]
    fn test_periodic_wraps() {
        let mut rng = Pcg64::seed_from_u64(0);
        let p = BoundaryPolicy::Periodic;
        let x = p.apply(2.3, 0.0, 1.0, &mut rng);
        assert!((x - 0.3).abs() < 1e-12);
        let x = p.apply(-0.25, 0.0, 1.0, &mut rng);
        assert!((x - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_periodic_gives_up_past_cap() {
        let mut rng = Pcg64::seed_from_u64(0);
        let p = BoundaryPolicy::Periodic;
        // 200 ranges away: more folds than the cap allows, the raw partial
        // result is accepted
        let x = p.apply(200.5, 0.0, 1.0, &mut rng);
        assert!(x > 1.0);
    }

    #[test]
    fn test_reflective_folds() {
        let mut rng = Pcg64::seed_from_u64(0);
        let p = BoundaryPolicy::Reflective;
        let x = p.apply(1.2, 0.0, 1.0, &mut rng);
        assert!((x - 0.8).abs() < 1e-12);
        let x = p.apply(-0.4, 0.0, 1.0, &mut rng);
        assert!((x - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_shrink_around() {
        let mut bounds = Bounds::new(vec![-10.0, -10.0], vec![10.0, 10.0]).unwrap();
        bounds.shrink_around(&[1.0, -2.0], 0.25);
        assert_eq!(bounds.lower(), &[-4.0, -7.0]);
        assert_eq!(bounds.upper(), &[6.0, 3.0]);
    }

    #[test]
    fn test_raise_negative_lower() {
        let mut bounds = Bounds::new(vec![-5.0, 1.0], vec![10.0, 10.0]).unwrap();
        bounds.raise_negative_lower(&[2.0, 2.0]);
        assert_eq!(bounds.lower(), &[2.0, 1.0]);
    }
}
