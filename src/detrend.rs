//! Trend removal for NAV series.
//!
//! Two methods are provided:
//! - Hodrick-Prescott smoothing, solved as a banded linear system
//! - Rolling-returns trend (cumulated trailing mean of log differences)
//!
//! Both keep the input length so residuals stay aligned with the dates of
//! the series they came from.

use crate::config::{DetrendConfig, DetrendMethod};
use crate::error::{CycleError, Result};
use crate::helpers::{centered_mean, trailing_mean};
use tracing::{debug, warn};

/// Window of the moving-average fallback used when the HP solve is unusable.
const HP_FALLBACK_WINDOW: usize = 12;

/// Result of a detrending operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DetrendResult {
    /// Input minus trend, in the working space
    pub residual: Vec<f64>,
    /// Estimated trend, in the working space
    pub trend: Vec<f64>,
    /// True when the returns method moved to log space
    pub log_transformed: bool,
}

/// Detrend `values` with the configured method.
///
/// # Arguments
/// * `values` - Observations, usually log-NAV
/// * `config` - Method and its parameters
///
/// # Errors
/// [`CycleError::InsufficientData`] for an empty input and
/// [`CycleError::InvalidParameter`] when `returns_window <= 1`.
pub fn detrend(values: &[f64], config: &DetrendConfig) -> Result<DetrendResult> {
    if values.is_empty() {
        return Err(CycleError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    let result = match config.method {
        DetrendMethod::Hp => hp_detrend(values, config.hp_lambda)?,
        DetrendMethod::Returns => returns_detrend(values, config.returns_window)?,
    };
    debug!(method = %config.method, n = values.len(), "detrended series");
    Ok(result)
}

/// Hodrick-Prescott trend: solves `(I + λ DᵀD) τ = y`.
///
/// Falls back to a centered 12-point moving average when the series is too
/// short for second differences or the factorization hits a non-positive
/// pivot.
pub fn hp_detrend(values: &[f64], lambda: f64) -> Result<DetrendResult> {
    if !(lambda.is_finite() && lambda > 0.0) {
        return Err(CycleError::invalid("hp_lambda", "must be positive"));
    }

    let trend = match hp_trend(values, lambda) {
        Some(trend) => trend,
        None => {
            warn!(
                n = values.len(),
                "HP solve unavailable; falling back to moving average detrending"
            );
            centered_mean(values, HP_FALLBACK_WINDOW)
        }
    };

    let residual = values.iter().zip(&trend).map(|(y, t)| y - t).collect();
    Ok(DetrendResult {
        residual,
        trend,
        log_transformed: false,
    })
}

/// Pentadiagonal band of `I + λ DᵀD`: main diagonal, first and second super-diagonals.
fn hp_band(n: usize, lambda: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    const STENCIL: [f64; 3] = [1.0, -2.0, 1.0];
    let mut d0 = vec![1.0; n];
    let mut d1 = vec![0.0; n.saturating_sub(1)];
    let mut d2 = vec![0.0; n.saturating_sub(2)];

    // Each row of D touches columns k, k+1, k+2.
    for k in 0..n.saturating_sub(2) {
        for a in 0..3 {
            for b in a..3 {
                let v = lambda * STENCIL[a] * STENCIL[b];
                match b - a {
                    0 => d0[k + a] += v,
                    1 => d1[k + a] += v,
                    _ => d2[k + a] += v,
                }
            }
        }
    }
    (d0, d1, d2)
}

/// Banded LDLᵀ solve for the HP trend. `None` when the system is unusable.
fn hp_trend(y: &[f64], lambda: f64) -> Option<Vec<f64>> {
    let n = y.len();
    if n < 3 {
        return None;
    }
    let (a0, a1, a2) = hp_band(n, lambda);

    // L is unit lower triangular with bandwidth 2.
    let mut d = vec![0.0; n];
    let mut l1 = vec![0.0; n - 1];
    let mut l2 = vec![0.0; n - 2];

    for i in 0..n {
        let mut pivot = a0[i];
        if i >= 1 {
            pivot -= l1[i - 1] * l1[i - 1] * d[i - 1];
        }
        if i >= 2 {
            pivot -= l2[i - 2] * l2[i - 2] * d[i - 2];
        }
        if !(pivot.is_finite() && pivot > 0.0) {
            return None;
        }
        d[i] = pivot;

        if i + 1 < n {
            let mut off = a1[i];
            if i >= 1 {
                off -= l2[i - 1] * l1[i - 1] * d[i - 1];
            }
            l1[i] = off / pivot;
        }
        if i + 2 < n {
            l2[i] = a2[i] / pivot;
        }
    }

    // Forward substitution L z = y.
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut v = y[i];
        if i >= 1 {
            v -= l1[i - 1] * z[i - 1];
        }
        if i >= 2 {
            v -= l2[i - 2] * z[i - 2];
        }
        z[i] = v;
    }

    // Diagonal scaling, then back substitution Lᵀ x = z / d.
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut v = z[i] / d[i];
        if i + 1 < n {
            v -= l1[i] * x[i + 1];
        }
        if i + 2 < n {
            v -= l2[i] * x[i + 2];
        }
        x[i] = v;
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Rolling-returns trend.
///
/// Works on logs when every value is positive. The differences are smoothed
/// by a trailing mean over `window` periods, cumulated from zero and offset
/// by the first working value.
pub fn returns_detrend(values: &[f64], window: usize) -> Result<DetrendResult> {
    if window <= 1 {
        return Err(CycleError::invalid(
            "returns_window",
            "must be greater than 1",
        ));
    }
    if values.is_empty() {
        return Err(CycleError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let log_transformed = values.iter().all(|&v| v > 0.0);
    let working: Vec<f64> = if log_transformed {
        values.iter().map(|v| v.ln()).collect()
    } else {
        values.to_vec()
    };

    let mut diffs = Vec::with_capacity(working.len());
    diffs.push(f64::NAN);
    diffs.extend(working.windows(2).map(|w| w[1] - w[0]));
    let smoothed = trailing_mean(&diffs, window);

    let origin = working[0];
    let mut cumulative = 0.0;
    let trend: Vec<f64> = smoothed
        .iter()
        .map(|&r| {
            if r.is_finite() {
                cumulative += r;
            }
            origin + cumulative
        })
        .collect();

    let residual = working.iter().zip(&trend).map(|(w, t)| w - t).collect();
    Ok(DetrendResult {
        residual,
        trend,
        log_transformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_hp_reproduces_linear_trend() {
        let y: Vec<f64> = (0..50).map(|i| 2.0 + 0.3 * i as f64).collect();
        let result = hp_detrend(&y, 129_600.0).unwrap();
        for (t, v) in result.trend.iter().zip(&y) {
            assert!((t - v).abs() < 1e-6, "trend {} vs {}", t, v);
        }
        assert!(result.residual.iter().all(|r| r.abs() < 1e-6));
        assert!(!result.log_transformed);
    }

    #[test]
    fn test_hp_separates_cycle_from_trend() {
        let m = 240;
        let y: Vec<f64> = (0..m)
            .map(|i| {
                let t = i as f64;
                0.01 * t + 0.2 * (2.0 * PI * t / 24.0).sin()
            })
            .collect();
        let result = hp_detrend(&y, 129_600.0).unwrap();
        // The residual carries the 24-sample cycle; compare away from the ends.
        let mut max_diff = 0.0f64;
        for i in 60..(m - 60) {
            let expected = 0.2 * (2.0 * PI * i as f64 / 24.0).sin();
            max_diff = max_diff.max((result.residual[i] - expected).abs());
        }
        assert!(max_diff < 0.05, "Max difference: {}", max_diff);
    }

    #[test]
    fn test_hp_short_series_uses_moving_average() {
        let result = hp_detrend(&[1.0, 3.0], 10.0).unwrap();
        assert_eq!(result.trend, vec![2.0, 2.0]);
        assert_eq!(result.residual, vec![-1.0, 1.0]);
    }

    #[test]
    fn test_hp_band_matches_second_difference_gram() {
        let (d0, d1, d2) = hp_band(5, 1.0);
        assert_eq!(d0, vec![2.0, 6.0, 7.0, 6.0, 2.0]);
        assert_eq!(d1, vec![-2.0, -4.0, -4.0, -2.0]);
        assert_eq!(d2, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_returns_detrend_trend_formula() {
        let values = [1.0f64, 2.0, 4.0, 8.0];
        let result = returns_detrend(&values, 3).unwrap();
        assert!(result.log_transformed);
        let ln2 = 2f64.ln();
        // Trailing mean of [NaN, ln2, ln2, ln2] is ln2 from index 1 on.
        let expected = [1f64.ln(), ln2, 2.0 * ln2, 3.0 * ln2];
        for (t, e) in result.trend.iter().zip(expected) {
            assert!((t - e).abs() < 1e-12);
        }
        assert!(result.residual.iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn test_returns_detrend_linear_space_for_non_positive() {
        let values = [0.0, 1.0, 3.0, 2.0];
        let result = returns_detrend(&values, 2).unwrap();
        assert!(!result.log_transformed);
        // diffs [NaN, 1, 2, -1] -> trailing means [NaN, 1, 1.5, 0.5]
        assert_eq!(result.trend, vec![0.0, 1.0, 2.5, 3.0]);
        assert_eq!(result.residual, vec![0.0, 0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_returns_window_must_exceed_one() {
        let err = returns_detrend(&[1.0, 2.0], 1).unwrap_err();
        assert!(matches!(err, CycleError::InvalidParameter { .. }));
    }

    #[test]
    fn test_detrend_keeps_length_and_rejects_empty() {
        let config = DetrendConfig::default();
        let values: Vec<f64> = (0..30).map(|i| (i as f64).sqrt()).collect();
        let result = detrend(&values, &config).unwrap();
        assert_eq!(result.residual.len(), values.len());
        assert_eq!(result.trend.len(), values.len());
        assert!(matches!(
            detrend(&[], &config),
            Err(CycleError::InsufficientData { .. })
        ));
    }
}
