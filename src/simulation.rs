//! Synthetic NAV generation.
//!
//! A synthetic series is a linear trend plus one sinusoidal cycle plus
//! Gaussian noise, sampled on month-end dates:
//! ```text
//! nav_i = base + drift·i + amplitude·sin(2πi/period + phase) + ε_i,   ε_i ~ N(0, noise_sd²)
//! ```
//! Generation is reproducible for a given seed.

use crate::error::{CycleError, Result};
use crate::iter_maybe_parallel;
use crate::series::{month_end_dates, NavSeries};
use chrono::NaiveDate;
use rand::prelude::*;
use rand_distr::{Normal, Uniform};
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;
use std::f64::consts::PI;

/// Relative spread of cycle periods across a simulated universe.
const PERIOD_JITTER: f64 = 0.2;

/// Parameters of one synthetic NAV series.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticNav {
    /// Level at the first observation
    pub base: f64,
    /// Trend increment per observation
    pub drift: f64,
    pub amplitude: f64,
    /// Cycle length in observations
    pub period: f64,
    /// Phase offset in radians
    pub phase: f64,
    pub noise_sd: f64,
    pub n_points: usize,
    /// Any date in the first month; observations fall on month ends
    pub start: NaiveDate,
}

impl Default for SyntheticNav {
    fn default() -> Self {
        Self {
            base: 100.0,
            drift: 0.2,
            amplitude: 8.0,
            period: 24.0,
            phase: 0.0,
            noise_sd: 0.5,
            n_points: 180,
            start: NaiveDate::from_ymd_opt(2010, 1, 31).unwrap_or(NaiveDate::MIN),
        }
    }
}

impl SyntheticNav {
    fn validate(&self) -> Result<()> {
        if self.n_points == 0 {
            return Err(CycleError::invalid("n_points", "must be positive"));
        }
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(CycleError::invalid("period", "must be positive and finite"));
        }
        if !(self.noise_sd.is_finite() && self.noise_sd >= 0.0) {
            return Err(CycleError::invalid("noise_sd", "must be non-negative and finite"));
        }
        Ok(())
    }

    /// Noise-free value at observation `i`.
    pub fn deterministic(&self, i: usize) -> f64 {
        let t = i as f64;
        self.base + self.drift * t + self.amplitude * (2.0 * PI * t / self.period + self.phase).sin()
    }
}

/// Simulate one NAV series.
///
/// # Arguments
/// * `scheme_code` - Identifier of the generated series
/// * `spec` - Trend, cycle and noise parameters
/// * `seed` - Optional random seed for reproducibility
pub fn simulate_nav(
    scheme_code: impl Into<String>,
    spec: &SyntheticNav,
    seed: Option<u64>,
) -> Result<NavSeries> {
    spec.validate()?;
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let noise = Normal::new(0.0, spec.noise_sd)
        .map_err(|e| CycleError::invalid("noise_sd", e.to_string()))?;

    let values: Vec<f64> = (0..spec.n_points)
        .map(|i| spec.deterministic(i) + rng.sample::<f64, _>(noise))
        .collect();
    NavSeries::new(scheme_code, month_end_dates(spec.start, spec.n_points), values)
}

/// Simulate `n` schemes around `base_spec`.
///
/// Scheme `k` is coded `SCHEME_{k:03}` and gets a uniformly drawn phase and a
/// period within ±20% of the base period. Per-scheme seeds are drawn from the
/// master seed up front, so the output does not depend on the iteration order.
pub fn simulate_universe(
    n: usize,
    base_spec: &SyntheticNav,
    seed: Option<u64>,
) -> Result<Vec<NavSeries>> {
    base_spec.validate()?;
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let phase = Uniform::new(0.0, 2.0 * PI);
    let jitter = Uniform::new_inclusive(1.0 - PERIOD_JITTER, 1.0 + PERIOD_JITTER);

    let schemes: Vec<(usize, SyntheticNav, u64)> = (0..n)
        .map(|k| {
            let spec = SyntheticNav {
                phase: rng.sample(phase),
                period: base_spec.period * rng.sample(jitter),
                ..base_spec.clone()
            };
            (k, spec, rng.gen::<u64>())
        })
        .collect();

    iter_maybe_parallel!(schemes)
        .map(|(k, spec, scheme_seed)| simulate_nav(format!("SCHEME_{k:03}"), &spec, Some(scheme_seed)))
        .collect()
}
