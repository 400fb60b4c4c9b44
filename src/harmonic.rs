//! Ridge harmonic regression at a given period.

use crate::config::HarmonicConfig;
use crate::error::{CycleError, Result};
use crate::helpers::nan_mean;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use tracing::warn;

/// Goodness of fit of the harmonic model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicFit {
    /// Coefficient of determination (NaN for a constant series)
    pub r2: f64,
    /// Euclidean norm of the sine/cosine coefficients
    pub amplitude: f64,
    /// Root mean squared residual
    pub rmse: f64,
}

impl HarmonicFit {
    /// All metrics undefined.
    pub fn nan() -> Self {
        Self {
            r2: f64::NAN,
            amplitude: f64::NAN,
            rmse: f64::NAN,
        }
    }
}

/// Fit `intercept + Σ_h [sin(hωt), cos(hωt)]` with `ω = 2π / period`.
///
/// A NaN or non-positive period yields all-NaN metrics. Solver failures are
/// logged and also yield all-NaN metrics; this function never errors.
pub fn harmonic_regression(residual: &[f64], period: f64, config: &HarmonicConfig) -> HarmonicFit {
    if period.is_nan() || period <= 0.0 || residual.is_empty() {
        return HarmonicFit::nan();
    }
    match fit_harmonics(residual, period, config) {
        Ok(fit) => fit,
        Err(err) => {
            warn!(period, error = %err, "harmonic regression failed");
            HarmonicFit::nan()
        }
    }
}

/// Design matrix with an intercept column followed by sin/cos pairs.
fn design_matrix(n: usize, period: f64, harmonics: &[u32]) -> DMatrix<f64> {
    let omega = 2.0 * PI / period;
    let n_cols = 1 + 2 * harmonics.len();
    DMatrix::from_fn(n, n_cols, |i, j| {
        if j == 0 {
            return 1.0;
        }
        let h = harmonics[(j - 1) / 2] as f64;
        let arg = h * omega * i as f64;
        if (j - 1) % 2 == 0 {
            arg.sin()
        } else {
            arg.cos()
        }
    })
}

fn fit_harmonics(residual: &[f64], period: f64, config: &HarmonicConfig) -> Result<HarmonicFit> {
    let n = residual.len();
    let mean = nan_mean(residual);
    let y = DVector::from_iterator(n, residual.iter().map(|v| v - mean));

    let x = design_matrix(n, period, &config.harmonics);
    let p = x.ncols();
    let xt = x.transpose();
    let gram = &xt * &x + DMatrix::<f64>::identity(p, p) * config.regularization;
    let gram_pinv = gram
        .pseudo_inverse(1e-15)
        .map_err(|e| CycleError::model_fit("harmonic", e))?;
    let beta = gram_pinv * (&xt * &y);

    let fitted = &x * &beta;
    let ss_res: f64 = (&y - &fitted).iter().map(|r| r * r).sum();
    let y_mean = y.mean();
    let ss_tot: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();

    if !ss_res.is_finite() {
        return Err(CycleError::model_fit("harmonic", "non-finite residual sum of squares"));
    }

    let r2 = if ss_tot == 0.0 {
        f64::NAN
    } else {
        1.0 - ss_res / ss_tot
    };
    let amplitude = beta.rows(1, p - 1).norm();
    let rmse = (ss_res / n as f64).sqrt();

    Ok(HarmonicFit { r2, amplitude, rmse })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_or_non_positive_period_gives_nan() {
        let config = HarmonicConfig::default();
        let y = vec![1.0, 2.0, 3.0];
        for period in [f64::NAN, 0.0, -4.0] {
            let fit = harmonic_regression(&y, period, &config);
            assert!(fit.r2.is_nan() && fit.amplitude.is_nan() && fit.rmse.is_nan());
        }
    }

    #[test]
    fn test_pure_sinusoid_fits_exactly() {
        let period = 12.0;
        let y: Vec<f64> = (0..96)
            .map(|i| 5.0 + 2.0 * (2.0 * PI * i as f64 / period).sin())
            .collect();
        let fit = harmonic_regression(&y, period, &HarmonicConfig::default());
        assert!(fit.r2 > 0.9999, "r2 {}", fit.r2);
        assert!((fit.amplitude - 2.0).abs() < 1e-3, "amplitude {}", fit.amplitude);
        assert!(fit.rmse < 1e-3);
    }

    #[test]
    fn test_wrong_period_fits_poorly() {
        let y: Vec<f64> = (0..96)
            .map(|i| (2.0 * PI * i as f64 / 12.0).sin())
            .collect();
        let fit = harmonic_regression(&y, 31.0, &HarmonicConfig::default());
        assert!(fit.r2 < 0.2, "r2 {}", fit.r2);
    }

    #[test]
    fn test_constant_series_has_nan_r2() {
        let fit = harmonic_regression(&[3.0; 24], 6.0, &HarmonicConfig::default());
        assert!(fit.r2.is_nan());
        assert_eq!(fit.rmse, 0.0);
    }

    #[test]
    fn test_design_matrix_layout() {
        let x = design_matrix(3, 4.0, &[1, 2]);
        assert_eq!(x.shape(), (3, 5));
        assert_eq!(x[(0, 0)], 1.0);
        assert!((x[(1, 1)] - 1.0).abs() < 1e-12); // sin(π/2)
        assert!((x[(1, 4)] + 1.0).abs() < 1e-12); // cos(π)
    }
}
