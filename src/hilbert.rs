//! Cycle extraction via the analytic signal.
//!
//! Two interchangeable strategies implement [`CycleExtractionStrategy`]:
//! - [`SpectralStrategy`]: zero-phase Butterworth band-pass followed by the
//!   FFT analytic signal; envelope, unwrapped phase and phase statistics come
//!   from the analytic signal
//! - [`FallbackSmoothingStrategy`]: a trailing moving average with a
//!   cumulative pseudo-phase for reduced-dependency deployments
//!
//! The pipeline picks one strategy when it is built, from
//! [`HilbertConfig::strategy`].

use crate::config::{HilbertConfig, HilbertStrategyKind};
use crate::error::{CycleError, Result};
use crate::filter::butterworth_bandpass;
use crate::helpers::{nan_mean, nan_median, trailing_mean};
use num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Trailing window of the fallback smoother.
const FALLBACK_WINDOW: usize = 5;

/// Cycle estimate and the phase statistics derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct HilbertCycle {
    /// Band-limited cycle, aligned to the input
    pub cycle: Vec<f64>,
    /// Instantaneous amplitude (envelope)
    pub amplitude: Vec<f64>,
    /// Unwrapped instantaneous phase in radians
    pub phase: Vec<f64>,
    /// `|mean(exp(iφ))|` in [0, 1]
    pub phase_coherence: f64,
    /// Reciprocal of the median absolute instantaneous frequency
    pub median_period: f64,
}

/// A way of turning a residual series into a [`HilbertCycle`].
pub trait CycleExtractionStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Extract the cycle from a residual series without gaps.
    fn extract(&self, residual: &[f64], config: &HilbertConfig) -> Result<HilbertCycle>;
}

/// Band-pass plus FFT analytic signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectralStrategy;

/// Moving-average smoother with cumulative pseudo-phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSmoothingStrategy;

/// Build the strategy selected by `kind`.
pub fn strategy_for(kind: HilbertStrategyKind) -> Box<dyn CycleExtractionStrategy> {
    match kind {
        HilbertStrategyKind::Spectral => Box::new(SpectralStrategy),
        HilbertStrategyKind::Smoothing => Box::new(FallbackSmoothingStrategy),
    }
}

fn check_band(config: &HilbertConfig) -> Result<()> {
    if !(config.highcut > config.lowcut) {
        return Err(CycleError::invalid(
            "highcut",
            "highcut must be greater than lowcut",
        ));
    }
    Ok(())
}

fn require_points(residual: &[f64]) -> Result<()> {
    if residual.is_empty() {
        return Err(CycleError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    Ok(())
}

impl CycleExtractionStrategy for SpectralStrategy {
    fn name(&self) -> &'static str {
        "spectral"
    }

    fn extract(&self, residual: &[f64], config: &HilbertConfig) -> Result<HilbertCycle> {
        check_band(config)?;
        require_points(residual)?;

        let (low, high) = config.normalized_band();
        if low <= 0.0 || high <= 0.0 {
            return Err(CycleError::invalid(
                "lowcut",
                "band-pass cutoff must be positive",
            ));
        }
        let filter = butterworth_bandpass(config.order, low, high)?;

        let mean = nan_mean(residual);
        let centered: Vec<f64> = residual.iter().map(|v| v - mean).collect();
        let cycle = filter.filtfilt(&centered);

        let analytic = analytic_signal(&cycle);
        let amplitude: Vec<f64> = analytic.iter().map(|c| c.norm()).collect();
        let wrapped: Vec<f64> = analytic.iter().map(|c| c.arg()).collect();
        let phase = unwrap_phase(&wrapped);

        Ok(HilbertCycle {
            phase_coherence: phase_coherence(&phase),
            median_period: median_period(&phase, config.fs),
            cycle,
            amplitude,
            phase,
        })
    }
}

impl CycleExtractionStrategy for FallbackSmoothingStrategy {
    fn name(&self) -> &'static str {
        "smoothing"
    }

    fn extract(&self, residual: &[f64], config: &HilbertConfig) -> Result<HilbertCycle> {
        check_band(config)?;
        require_points(residual)?;

        let fill = match nan_mean(residual) {
            m if m.is_nan() => 0.0,
            m => m,
        };
        let filled: Vec<f64> = residual
            .iter()
            .map(|&v| if v.is_finite() { v } else { fill })
            .collect();
        let mean = filled.iter().sum::<f64>() / filled.len() as f64;
        let centered: Vec<f64> = filled.iter().map(|v| v - mean).collect();

        let window = FALLBACK_WINDOW.min(centered.len()).max(1);
        let cycle = trailing_mean(&centered, window);
        let amplitude = cycle.iter().map(|v| v.abs()).collect();
        let phase = cycle
            .iter()
            .scan(0.0, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect();

        Ok(HilbertCycle {
            cycle,
            amplitude,
            phase,
            phase_coherence: 0.0,
            median_period: f64::NAN,
        })
    }
}

/// Analytic signal via FFT: negative frequencies zeroed, positive doubled.
///
/// The real part reproduces the input and the imaginary part is its Hilbert
/// transform.
pub fn analytic_signal(signal: &[f64]) -> Vec<Complex<f64>> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft_forward = planner.plan_fft_forward(n);
    let fft_inverse = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    fft_forward.process(&mut buffer);

    // H[0] = 1; H[1..] = 2 up to Nyquist, which stays 1 for even n; zero above.
    let positive_end = if n % 2 == 0 { n / 2 } else { (n + 1) / 2 };
    for c in buffer.iter_mut().take(positive_end).skip(1) {
        *c *= 2.0;
    }
    let negative_start = if n % 2 == 0 { n / 2 + 1 } else { (n + 1) / 2 };
    for c in buffer.iter_mut().skip(negative_start) {
        *c = Complex::new(0.0, 0.0);
    }

    fft_inverse.process(&mut buffer);
    let scale = 1.0 / n as f64;
    for c in buffer.iter_mut() {
        *c *= scale;
    }
    buffer
}

/// Unwrap phase to remove 2π discontinuities.
pub fn unwrap_phase(phase: &[f64]) -> Vec<f64> {
    if phase.is_empty() {
        return Vec::new();
    }

    let mut unwrapped = Vec::with_capacity(phase.len());
    unwrapped.push(phase[0]);
    let mut correction = 0.0;
    for w in phase.windows(2) {
        let diff = w[1] - w[0];
        if diff > PI {
            correction -= 2.0 * PI;
        } else if diff < -PI {
            correction += 2.0 * PI;
        }
        unwrapped.push(w[1] + correction);
    }
    unwrapped
}

/// Length of the mean unit phasor, NaN for an empty input.
pub fn phase_coherence(phase: &[f64]) -> f64 {
    if phase.is_empty() {
        return f64::NAN;
    }
    let sum = phase
        .iter()
        .fold(Complex::new(0.0, 0.0), |acc, &p| acc + Complex::from_polar(1.0, p));
    (sum / phase.len() as f64).norm()
}

/// `1 / median(|Δφ| / 2π · fs)` over finite instantaneous frequencies.
///
/// NaN when no finite frequency exists, `+inf` when the median is zero.
pub fn median_period(phase: &[f64], fs: f64) -> f64 {
    let inst_freq: Vec<f64> = phase
        .windows(2)
        .map(|w| ((w[1] - w[0]) / (2.0 * PI) * fs).abs())
        .collect();
    let median = nan_median(&inst_freq);
    if median.is_nan() {
        f64::NAN
    } else if median == 0.0 {
        f64::INFINITY
    } else {
        1.0 / median
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, period: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * i as f64 / period).sin())
            .collect()
    }

    #[test]
    fn test_analytic_signal_of_cosine_is_sine() {
        for (n, cycles) in [(64usize, 4.0), (63, 3.0)] {
            let x: Vec<f64> = (0..n)
                .map(|i| (2.0 * PI * cycles * i as f64 / n as f64).cos())
                .collect();
            let analytic = analytic_signal(&x);
            for (i, c) in analytic.iter().enumerate() {
                let expected = (2.0 * PI * cycles * i as f64 / n as f64).sin();
                assert!((c.re - x[i]).abs() < 1e-10);
                assert!((c.im - expected).abs() < 1e-10, "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_unwrap_phase_removes_jumps() {
        let wrapped = [3.0, -3.0, -2.5];
        let unwrapped = unwrap_phase(&wrapped);
        assert!((unwrapped[1] - (-3.0 + 2.0 * PI)).abs() < 1e-12);
        assert!(unwrapped.windows(2).all(|w| (w[1] - w[0]).abs() < PI));
    }

    #[test]
    fn test_phase_statistics() {
        let constant = [0.7; 10];
        assert!((phase_coherence(&constant) - 1.0).abs() < 1e-12);
        assert_eq!(median_period(&constant, 1.0), f64::INFINITY);

        let rotating: Vec<f64> = (0..40).map(|i| 2.0 * PI * i as f64 / 8.0).collect();
        assert!(phase_coherence(&rotating) < 1e-12);
        assert!((median_period(&rotating, 1.0) - 8.0).abs() < 1e-9);
        assert!(median_period(&[1.0], 1.0).is_nan());
    }

    #[test]
    fn test_spectral_strategy_tracks_period() {
        let config = HilbertConfig::default();
        let cycle = SpectralStrategy.extract(&sine(200, 10.0), &config).unwrap();
        assert_eq!(cycle.cycle.len(), 200);
        assert!((cycle.median_period - 10.0).abs() < 0.2, "period {}", cycle.median_period);
        let mid_amp = cycle.amplitude[100];
        assert!((mid_amp - 1.0).abs() < 0.1, "amplitude {mid_amp}");
        assert!(cycle.phase_coherence < 0.2);
    }

    #[test]
    fn test_inverted_band_rejected() {
        let config = HilbertConfig {
            lowcut: 0.3,
            highcut: 0.1,
            ..HilbertConfig::default()
        };
        for strategy in [strategy_for(HilbertStrategyKind::Spectral), strategy_for(HilbertStrategyKind::Smoothing)] {
            assert!(matches!(
                strategy.extract(&sine(50, 10.0), &config),
                Err(CycleError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_fallback_smoothing() {
        let config = HilbertConfig {
            strategy: HilbertStrategyKind::Smoothing,
            ..HilbertConfig::default()
        };
        let strategy = strategy_for(config.strategy);
        assert_eq!(strategy.name(), "smoothing");
        let result = strategy
            .extract(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &config)
            .unwrap();
        assert_eq!(result.cycle, vec![-2.5, -2.0, -1.5, -1.0, -0.5, 0.5]);
        assert_eq!(result.amplitude, vec![2.5, 2.0, 1.5, 1.0, 0.5, 0.5]);
        assert_eq!(result.phase, vec![-2.5, -4.5, -6.0, -7.0, -7.5, -7.0]);
        assert_eq!(result.phase_coherence, 0.0);
        assert!(result.median_period.is_nan());
    }

    #[test]
    fn test_fallback_fills_nan_with_mean() {
        let config = HilbertConfig::default();
        let result = FallbackSmoothingStrategy
            .extract(&[1.0, f64::NAN, 3.0], &config)
            .unwrap();
        // filled [1, 2, 3] -> centered [-1, 0, 1], window 3
        assert_eq!(result.cycle, vec![-1.0, -0.5, 0.0]);
    }
}
