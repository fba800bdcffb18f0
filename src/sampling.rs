//! Pure sampling helpers (C1): weighted-integer choice, Poisson inter-arrival
//! sampling, and (in `cdf`) CDF inverse sampling. None of these touch I/O or
//! shared state; they take an `rng` and return a value.

use rand::Rng;

/// A weighted discrete distribution over `u32` values, as read from the
/// config file's `fanout`/`service`/`rate` lines.
#[derive(Debug, Clone)]
pub struct WeightedDist {
    values: Vec<u32>,
    weights: Vec<u32>,
    total: u32,
}

impl WeightedDist {
    /// Builds a distribution from parallel value/weight slices. `total` must
    /// equal the sum of `weights`; this is enforced by the config loader at
    /// parse time, not re-derived here, so that a caller who already knows
    /// the total (accumulated incrementally while reading lines) doesn't pay
    /// for a second pass.
    pub fn new(values: Vec<u32>, weights: Vec<u32>, total: u32) -> WeightedDist {
        debug_assert_eq!(weights.iter().sum::<u32>(), total);
        WeightedDist {
            values,
            weights,
            total,
        }
    }

    pub fn single(value: u32) -> WeightedDist {
        WeightedDist::new(vec![value], vec![100], 100)
    }

    pub fn sample(&self, rng: &mut impl Rng) -> u32 {
        weighted_choice(&self.values, &self.weights, self.total, rng)
    }
}

/// Returns one of `values[i]` with probability `weights[i] / total`.
///
/// O(n) inverse transform on a uniform draw in `[0, total)`. Ties break to
/// the lowest index whose prefix sum exceeds the draw, matching the
/// original's linear `gen_value_weight` scan.
pub fn weighted_choice(values: &[u32], weights: &[u32], total: u32, rng: &mut impl Rng) -> u32 {
    assert_eq!(values.len(), weights.len());
    assert!(total > 0, "weighted_choice: total weight must be positive");

    let draw = rng.gen_range(0..total);
    let mut acc: u32 = 0;
    for (value, weight) in values.iter().zip(weights) {
        acc += *weight;
        if draw < acc {
            return *value;
        }
    }
    // Only reachable if `total` overstates the sum of `weights`, which the
    // config loader never permits.
    *values.last().expect("weighted_choice: empty distribution")
}

/// Samples an exponential inter-arrival interval in whole microseconds:
/// `-ln(U) / rate_per_us`, where `U` is drawn uniformly from `(0, 1]`.
/// Rounded to the nearest positive integer microsecond (never zero, so a
/// Poisson-paced run always makes forward progress).
pub fn poisson_interval_us(rate_per_us: f64, rng: &mut impl Rng) -> u32 {
    assert!(rate_per_us > 0.0, "poisson_interval_us: non-positive rate");
    // rng.gen::<f64>() draws from [0, 1); flip to (0, 1] so ln() never sees 0.
    let u = 1.0 - rng.gen::<f64>();
    let interval = -u.ln() / rate_per_us;
    (interval.round() as u32).max(1)
}
