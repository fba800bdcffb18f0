//! The empirical request-size CDF (C1's `cdf_sample`, plus C9's loader).
//!
//! A `CdfTable` is a piecewise-linear cumulative distribution: a sequence of
//! `(value, cumulative_fraction)` points sorted by value, with the final
//! fraction equal to 1.0. Sampling is inverse-transform: draw a uniform
//! fraction, find the bracketing pair of points, and linearly interpolate
//! the value.

use std::fs;
use std::path::Path;

use rand::Rng;

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct CdfTable {
    points: Vec<(f64, f64)>,
}

impl CdfTable {
    /// Builds a table from already-sorted, already-validated points. Used
    /// directly by tests; real configs go through `load`.
    pub fn new(points: Vec<(f64, f64)>) -> CdfTable {
        CdfTable { points }
    }

    pub fn load(path: &Path) -> Result<CdfTable, Error> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read CDF file {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<CdfTable, Error> {
        let mut points = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut cols = line.split_whitespace();
            let value: f64 = cols
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::Config(format!("CDF line {}: missing value", lineno + 1)))?;
            let frac: f64 = cols
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::Config(format!("CDF line {}: missing fraction", lineno + 1)))?;
            points.push((value, frac));
        }

        if points.is_empty() {
            return Err(Error::Config("CDF file has no data points".into()));
        }

        for w in points.windows(2) {
            if w[1].0 < w[0].0 || w[1].1 < w[0].1 {
                return Err(Error::Config(
                    "CDF file is not sorted ascending by value and fraction".into(),
                ));
            }
        }

        let last_frac = points.last().unwrap().1;
        if (last_frac - 1.0).abs() > 1e-6 {
            return Err(Error::Config(format!(
                "CDF file's last cumulative fraction must be 1.0, got {last_frac}"
            )));
        }

        Ok(CdfTable { points })
    }

    /// Inverse-transform sampling: draw a uniform fraction in `[0, 1)` and
    /// interpolate between the bracketing table entries.
    pub fn sample(&self, rng: &mut impl Rng) -> u32 {
        let u: f64 = rng.gen();

        let mut prev = (0.0, 0.0);
        for &(value, frac) in &self.points {
            if u <= frac {
                if frac == prev.1 {
                    return value.round() as u32;
                }
                let t = (u - prev.1) / (frac - prev.1);
                let interpolated = prev.0 + t * (value - prev.0);
                return interpolated.max(0.0).round() as u32;
            }
            prev = (value, frac);
        }
        // Floating-point edge case: u landed past the last recorded fraction
        // (which must be 1.0). Fall back to the largest observed value.
        self.points.last().unwrap().0.round() as u32
    }

    /// Weighted mean across the table's buckets, trapezoidal over
    /// consecutive `(value, fraction)` pairs. Matches the original's
    /// `avg_CDF`.
    pub fn avg(&self) -> f64 {
        let mut total = 0.0;
        let mut prev = (0.0, 0.0);
        for &(value, frac) in &self.points {
            let mass = frac - prev.1;
            let midpoint = (value + prev.0) / 2.0;
            total += mass * midpoint;
            prev = (value, frac);
        }
        total
    }
}
