//! Local level plus damped stochastic cycle, fitted by maximum likelihood.
//!
//! The model is
//!
//! ```text
//! y_t        = μ_t + c_t + ε_t                       ε ~ N(0, σ²_ε)
//! μ_{t+1}    = μ_t + η_t                             η ~ N(0, σ²_η)
//! [c, c*]_{t+1} = ρ R(λ) [c, c*]_t + κ_t             κ ~ N(0, σ²_κ I)
//! ```
//!
//! with `R(λ)` the rotation by the cycle frequency `λ = 2π / p`. The period
//! `p` is confined to a band around the configured target period. The
//! likelihood comes from the prediction-error decomposition of the Kalman
//! filter with a diffuse level, the parameters from a deterministic
//! Nelder-Mead search, and the smoothed cycle from a Rauch-Tung-Striebel pass.

use crate::config::StateSpaceConfig;
use crate::error::{CycleError, Result};
use crate::helpers::{nan_variance, pearson, NUMERICAL_EPS};
use nalgebra::{Matrix3, RowVector3, Vector3};
use std::f64::consts::PI;
use tracing::{debug, error, warn};

/// Shortest series the model is fitted to.
pub const MIN_STATE_SPACE_POINTS: usize = 8;

/// Damping factors are kept strictly below this for a finite stationary variance.
const MAX_DAMPING: f64 = 0.999;

/// Initial level variance relative to the sample variance.
const DIFFUSE_SCALE: f64 = 1e6;

/// Log-variance search range relative to the log sample variance.
const LOG_VAR_BELOW: f64 = 20.0;
const LOG_VAR_ABOVE: f64 = 5.0;

const NM_INITIAL_STEP: f64 = 0.5;
const NM_XATOL: f64 = 1e-4;
const NM_FATOL: f64 = 1e-4;

/// Fitted cycle model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleModelFit {
    /// Damping factor ρ
    pub damping: f64,
    /// Cycle period in samples
    pub period: f64,
    pub irregular_variance: f64,
    pub level_variance: f64,
    pub cycle_variance: f64,
    /// Log-likelihood excluding the diffuse first observation
    pub log_likelihood: f64,
    /// Nelder-Mead iterations used
    pub iterations: usize,
    /// False when the iteration cap was reached first
    pub converged: bool,
}

/// Smoothed cycle and its diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpaceCycle {
    /// Smoothed cycle, aligned to the input (all NaN on failure)
    pub cycle: Vec<f64>,
    /// Lag-one autocorrelation of the smoothed cycle
    pub persistence: f64,
    /// Variance of the cycle over variance of the one-step innovations
    pub signal_to_noise: f64,
    /// Parameters, `None` when the fit failed
    pub fit: Option<CycleModelFit>,
}

impl StateSpaceCycle {
    fn failed(n: usize) -> Self {
        Self {
            cycle: vec![f64::NAN; n],
            persistence: f64::NAN,
            signal_to_noise: f64::NAN,
            fit: None,
        }
    }
}

/// Fit the cycle model to `residual` and return the smoothed cycle.
///
/// Never errors: a failed fit is logged and reported as NaN cycle and
/// metrics.
pub fn estimate_cycle(residual: &[f64], config: &StateSpaceConfig) -> StateSpaceCycle {
    match fit_cycle_model(residual, config) {
        Ok(result) => result,
        Err(err) => {
            error!(n = residual.len(), error = %err, "state-space model failed");
            StateSpaceCycle::failed(residual.len())
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CycleModel {
    damping: f64,
    frequency: f64,
    irregular_variance: f64,
    level_variance: f64,
    cycle_variance: f64,
}

impl CycleModel {
    fn transition(&self) -> Matrix3<f64> {
        let (s, c) = self.frequency.sin_cos();
        let r = self.damping;
        Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, r * c, r * s, //
            0.0, -r * s, r * c,
        )
    }

    fn state_noise(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(
            self.level_variance,
            self.cycle_variance,
            self.cycle_variance,
        ))
    }

    fn initial_covariance(&self, diffuse: f64) -> Matrix3<f64> {
        let stationary = self.cycle_variance / (1.0 - self.damping * self.damping);
        Matrix3::from_diagonal(&Vector3::new(diffuse, stationary, stationary))
    }
}

/// Maps unconstrained search coordinates to model parameters.
#[derive(Debug, Clone, Copy)]
struct ParameterSpace {
    period_low: f64,
    period_high: f64,
    log_var_low: f64,
    log_var_high: f64,
}

impl ParameterSpace {
    fn new(config: &StateSpaceConfig, variance: f64) -> Self {
        let period = config.cycle_period.max(2.0);
        let log_var = variance.ln();
        Self {
            period_low: (period * (1.0 - config.period_tolerance)).max(2.0),
            period_high: period * (1.0 + config.period_tolerance),
            log_var_low: log_var - LOG_VAR_BELOW,
            log_var_high: log_var + LOG_VAR_ABOVE,
        }
    }

    fn decode(&self, theta: &[f64]) -> CycleModel {
        let var = |t: f64| t.clamp(self.log_var_low, self.log_var_high).exp();
        let period = self.period_low + (self.period_high - self.period_low) * sigmoid(theta[1]);
        CycleModel {
            damping: MAX_DAMPING * sigmoid(theta[0]),
            frequency: 2.0 * PI / period,
            irregular_variance: var(theta[2]),
            level_variance: var(theta[3]),
            cycle_variance: var(theta[4]),
        }
    }

    /// Start at the configured damping, the band center, and the sample
    /// variance split between irregular, level and cycle.
    fn initial_point(&self, damping: f64, variance: f64) -> [f64; 5] {
        [
            logit((damping / MAX_DAMPING).clamp(1e-6, 1.0 - 1e-6)),
            0.0,
            (0.5 * variance).ln(),
            (0.01 * variance).ln(),
            (0.1 * variance).ln(),
        ]
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Kalman filter pass, keeping what the smoother needs.
struct FilterPass {
    predicted_states: Vec<Vector3<f64>>,
    predicted_covs: Vec<Matrix3<f64>>,
    filtered_states: Vec<Vector3<f64>>,
    filtered_covs: Vec<Matrix3<f64>>,
    innovations: Vec<f64>,
    log_likelihood: f64,
}

fn kalman_filter(y: &[f64], model: &CycleModel, diffuse: f64, keep: bool) -> Result<FilterPass> {
    let n = y.len();
    let t_mat = model.transition();
    let q = model.state_noise();
    let z = RowVector3::new(1.0, 1.0, 0.0);
    let h = model.irregular_variance;

    let mut a = Vector3::zeros();
    let mut p = model.initial_covariance(diffuse);

    let capacity = if keep { n } else { 0 };
    let mut pass = FilterPass {
        predicted_states: Vec::with_capacity(capacity),
        predicted_covs: Vec::with_capacity(capacity),
        filtered_states: Vec::with_capacity(capacity),
        filtered_covs: Vec::with_capacity(capacity),
        innovations: Vec::with_capacity(n),
        log_likelihood: 0.0,
    };

    for (t, &obs) in y.iter().enumerate() {
        let v = obs - (z * a)[0];
        let pz = p * z.transpose();
        let f = (z * pz)[0] + h;
        if !(f.is_finite() && f > 0.0) {
            return Err(CycleError::model_fit(
                "state_space",
                "innovation variance is not positive",
            ));
        }
        let gain = pz / f;
        let a_filt = a + gain * v;
        let p_filt = p - gain * pz.transpose();

        if t > 0 {
            pass.log_likelihood -= 0.5 * ((2.0 * PI).ln() + f.ln() + v * v / f);
        }
        pass.innovations.push(v);
        if keep {
            pass.predicted_states.push(a);
            pass.predicted_covs.push(p);
            pass.filtered_states.push(a_filt);
            pass.filtered_covs.push(p_filt);
        }

        a = t_mat * a_filt;
        p = t_mat * p_filt * t_mat.transpose() + q;
    }

    if !pass.log_likelihood.is_finite() {
        return Err(CycleError::model_fit(
            "state_space",
            "log-likelihood is not finite",
        ));
    }
    Ok(pass)
}

/// Rauch-Tung-Striebel smoothed state means.
fn rts_smooth(pass: &FilterPass, t_mat: &Matrix3<f64>) -> Result<Vec<Vector3<f64>>> {
    let n = pass.filtered_states.len();
    let mut smoothed = pass.filtered_states.clone();
    for t in (0..n.saturating_sub(1)).rev() {
        let p_pred_inv = pass.predicted_covs[t + 1].try_inverse().ok_or_else(|| {
            CycleError::model_fit("state_space", "singular predicted covariance")
        })?;
        let j = pass.filtered_covs[t] * t_mat.transpose() * p_pred_inv;
        smoothed[t] = pass.filtered_states[t] + j * (smoothed[t + 1] - pass.predicted_states[t + 1]);
    }
    Ok(smoothed)
}

fn fit_cycle_model(residual: &[f64], config: &StateSpaceConfig) -> Result<StateSpaceCycle> {
    let n = residual.len();
    if n < MIN_STATE_SPACE_POINTS {
        return Err(CycleError::InsufficientData {
            required: MIN_STATE_SPACE_POINTS,
            actual: n,
        });
    }
    if residual.iter().any(|v| !v.is_finite()) {
        return Err(CycleError::model_fit(
            "state_space",
            "input contains non-finite values",
        ));
    }
    let variance = nan_variance(residual);
    if !(variance > NUMERICAL_EPS) {
        return Err(CycleError::model_fit("state_space", "series has no variance"));
    }

    let space = ParameterSpace::new(config, variance);
    let diffuse = DIFFUSE_SCALE * variance;
    let objective = |theta: &[f64]| -> f64 {
        let model = space.decode(theta);
        match kalman_filter(residual, &model, diffuse, false) {
            Ok(pass) => -pass.log_likelihood,
            Err(_) => f64::INFINITY,
        }
    };

    let start = space.initial_point(config.damping, variance);
    let outcome = nelder_mead(objective, &start, NM_INITIAL_STEP, config.max_iterations);
    if !outcome.value.is_finite() {
        return Err(CycleError::model_fit(
            "state_space",
            "likelihood is not finite at any simplex vertex",
        ));
    }
    if !outcome.converged {
        warn!(
            max_iterations = config.max_iterations,
            neg_log_likelihood = outcome.value,
            "state-space fit did not converge, keeping best simplex vertex"
        );
    }

    let model = space.decode(&outcome.point);
    let pass = kalman_filter(residual, &model, diffuse, true)?;
    let smoothed = rts_smooth(&pass, &model.transition())?;
    let cycle: Vec<f64> = smoothed.iter().map(|s| s[1]).collect();

    let persistence = if n > 1 {
        pearson(&cycle[..n - 1], &cycle[1..])
    } else {
        f64::NAN
    };
    let noise_var = nan_variance(&pass.innovations[1..]);
    let signal_to_noise = if noise_var > 0.0 {
        nan_variance(&cycle) / noise_var
    } else {
        f64::NAN
    };

    let fit = CycleModelFit {
        damping: model.damping,
        period: 2.0 * PI / model.frequency,
        irregular_variance: model.irregular_variance,
        level_variance: model.level_variance,
        cycle_variance: model.cycle_variance,
        log_likelihood: pass.log_likelihood,
        iterations: outcome.iterations,
        converged: outcome.converged,
    };
    debug!(
        damping = fit.damping,
        period = fit.period,
        log_likelihood = fit.log_likelihood,
        iterations = fit.iterations,
        "fitted state-space cycle"
    );

    Ok(StateSpaceCycle {
        cycle,
        persistence,
        signal_to_noise,
        fit: Some(fit),
    })
}

/// Result of a Nelder-Mead minimization.
#[derive(Debug, Clone)]
struct NelderMeadOutcome {
    point: Vec<f64>,
    value: f64,
    iterations: usize,
    converged: bool,
}

/// Deterministic Nelder-Mead simplex minimization.
///
/// Non-finite objective values are treated as `+inf`. Converged when both the
/// simplex extent and the spread of vertex values are within tolerance.
fn nelder_mead<F>(f: F, start: &[f64], step: f64, max_iterations: usize) -> NelderMeadOutcome
where
    F: Fn(&[f64]) -> f64,
{
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    let dim = start.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    simplex.push(start.to_vec());
    for i in 0..dim {
        let mut vertex = start.to_vec();
        vertex[i] += step;
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        // Order vertices by value, best first.
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        if x_spread <= NM_XATOL && f_spread <= NM_FATOL {
            converged = true;
            break;
        }
        iterations += 1;

        let mut centroid = vec![0.0; dim];
        for vertex in &simplex[..dim] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / dim as f64;
            }
        }
        let along = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[dim])
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let reflected = along(ALPHA);
        let f_reflected = eval(&reflected);
        if f_reflected < values[0] {
            let expanded = along(ALPHA * GAMMA);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[dim] = expanded;
                values[dim] = f_expanded;
            } else {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[dim - 1] {
            simplex[dim] = reflected;
            values[dim] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[dim] {
            let outside = along(ALPHA * RHO);
            let fo = eval(&outside);
            (outside, fo)
        } else {
            let inside = along(-RHO);
            let fi = eval(&inside);
            (inside, fi)
        };
        if f_contracted < values[dim].min(f_reflected) {
            simplex[dim] = contracted;
            values[dim] = f_contracted;
            continue;
        }

        // Shrink toward the best vertex.
        let best = simplex[0].clone();
        for i in 1..=dim {
            for (x, b) in simplex[i].iter_mut().zip(&best) {
                *x = b + SIGMA * (*x - b);
            }
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..=dim)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    NelderMeadOutcome {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}
