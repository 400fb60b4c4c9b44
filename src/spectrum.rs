//! Power spectrum estimation and dominant cycle selection.
//!
//! Two estimators are available:
//! - Welch's averaged periodogram (periodic Hann window, density scaling)
//! - Lomb-Scargle periodogram on a linear frequency grid
//!
//! Frequencies are in cycles per sample. The dominant frequency is searched
//! only inside the configured band.

use crate::config::{LombScargleConfig, SpectrumBand, SpectrumConfig, SpectrumMethod, WelchConfig};
use crate::error::{CycleError, Result};
use crate::helpers::{argmax, nan_mean};
use num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Estimated spectrum and dominant cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumResult {
    /// Strictly increasing, non-negative frequencies
    pub frequencies: Vec<f64>,
    /// Power at each frequency
    pub power: Vec<f64>,
    /// Frequency of maximum in-band power (NaN if the band is empty)
    pub dominant_frequency: f64,
    /// `1 / dominant_frequency`, `+inf` at zero frequency
    pub dominant_period: f64,
    /// Relative height of the dominant peak over its neighbours
    pub sharpness: f64,
}

/// Compute the spectrum of `residual` and locate the dominant cycle.
///
/// The input is mean-centered first. An empty band is not an error: the
/// dominant quantities are NaN and a warning is logged.
pub fn compute_spectrum(residual: &[f64], config: &SpectrumConfig) -> Result<SpectrumResult> {
    if residual.len() < 2 {
        return Err(CycleError::InsufficientData {
            required: 2,
            actual: residual.len(),
        });
    }
    let mean = nan_mean(residual);
    let centered: Vec<f64> = residual.iter().map(|v| v - mean).collect();

    let (frequencies, power) = match config.method {
        SpectrumMethod::Welch => welch_spectrum(&centered, &config.welch),
        SpectrumMethod::LombScargle => lomb_scargle_spectrum(&centered, &config.lomb_scargle)?,
    };
    debug!(method = ?config.method, bins = frequencies.len(), "computed spectrum");

    let (dominant_frequency, sharpness) = match dominant_in_band(&frequencies, &power, &config.band)
    {
        Some(found) => found,
        None => {
            warn!(
                low = config.band.low,
                high = config.band.high,
                "no spectral content in configured band"
            );
            (f64::NAN, f64::NAN)
        }
    };

    Ok(SpectrumResult {
        frequencies,
        power,
        dominant_frequency,
        dominant_period: period_from_frequency(dominant_frequency),
        sharpness,
    })
}

/// Reciprocal of `frequency`, `+inf` at zero and NaN for NaN.
#[inline]
pub fn period_from_frequency(frequency: f64) -> f64 {
    if frequency == 0.0 {
        f64::INFINITY
    } else {
        1.0 / frequency
    }
}

/// Dominant (frequency, sharpness) inside the band, `None` if no bin qualifies.
fn dominant_in_band(
    frequencies: &[f64],
    power: &[f64],
    band: &SpectrumBand,
) -> Option<(f64, f64)> {
    let (band_freq, band_power): (Vec<f64>, Vec<f64>) = frequencies
        .iter()
        .zip(power)
        .filter(|(f, _)| band.contains(**f))
        .map(|(&f, &p)| (f, p))
        .unzip();
    let idx = argmax(&band_power)?;
    Some((band_freq[idx], spectral_sharpness(&band_power, idx)))
}

/// Relative prominence of `power[peak]` over the mean of up to two finite
/// neighbours on each side.
///
/// NaN when the peak sits on either edge of the slice, or when the baseline
/// is zero or undefined.
pub fn spectral_sharpness(power: &[f64], peak: usize) -> f64 {
    if power.is_empty() || peak == 0 || peak + 1 >= power.len() {
        return f64::NAN;
    }
    let start = peak.saturating_sub(2);
    let end = (peak + 3).min(power.len());
    let neighbours: Vec<f64> = (start..end)
        .filter(|&i| i != peak)
        .map(|i| power[i])
        .filter(|v| !v.is_nan())
        .collect();
    if neighbours.is_empty() {
        return f64::NAN;
    }
    let baseline = neighbours.iter().sum::<f64>() / neighbours.len() as f64;
    if baseline == 0.0 {
        return f64::NAN;
    }
    (power[peak] - baseline) / baseline
}

/// Periodic Hann window of length `n`.
fn hann_periodic(n: usize) -> Vec<f64> {
    (0..n)
        .map(|k| 0.5 - 0.5 * (2.0 * PI * k as f64 / n as f64).cos())
        .collect()
}

/// Welch periodogram at unit sampling frequency, zero-frequency bin dropped.
///
/// `nperseg` is clipped to the series length and an overlap that does not
/// fit inside a segment is replaced by half a segment.
fn welch_spectrum(data: &[f64], config: &WelchConfig) -> (Vec<f64>, Vec<f64>) {
    let n = data.len();
    let nperseg = config.nperseg.min(n).max(1);
    let noverlap = if config.noverlap >= nperseg {
        nperseg / 2
    } else {
        config.noverlap
    };
    let step = (nperseg - noverlap).max(1);
    let n_segments = (n - nperseg) / step + 1;

    let window = hann_periodic(nperseg);
    let scale = 1.0 / window.iter().map(|w| w * w).sum::<f64>();
    let n_freq = nperseg / 2 + 1;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);

    let mut accum = vec![0.0; n_freq];
    let mut buffer: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); nperseg];
    for s in 0..n_segments {
        let segment = &data[s * step..s * step + nperseg];
        let seg_mean = segment.iter().sum::<f64>() / nperseg as f64;
        for (slot, (&x, &w)) in buffer.iter_mut().zip(segment.iter().zip(&window)) {
            *slot = Complex::new((x - seg_mean) * w, 0.0);
        }
        fft.process(&mut buffer);

        for (k, acc) in accum.iter_mut().enumerate() {
            let mut p = buffer[k].norm_sqr() * scale;
            // One-sided: double all bins except DC and the even-length Nyquist bin.
            let is_nyquist = nperseg % 2 == 0 && k == nperseg / 2;
            if k > 0 && !is_nyquist {
                p *= 2.0;
            }
            *acc += p;
        }
    }

    let frequencies: Vec<f64> = (0..n_freq).map(|k| k as f64 / nperseg as f64).collect();
    let power: Vec<f64> = accum.iter().map(|p| p / n_segments as f64).collect();

    if frequencies.len() > 1 {
        (frequencies[1..].to_vec(), power[1..].to_vec())
    } else {
        (frequencies, power)
    }
}

/// Lomb-Scargle periodogram on `floor((max - min) * samples_per_peak * n)`
/// linearly spaced frequencies.
///
/// Grid values are cycles per sample and are evaluated at angular frequency
/// `2πf`, not used as angular frequencies directly.
fn lomb_scargle_spectrum(
    data: &[f64],
    config: &LombScargleConfig,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let (min_f, max_f) = (config.minimum_frequency, config.maximum_frequency);
    if max_f <= min_f {
        return Err(CycleError::Configuration(
            "maximum_frequency must be greater than minimum_frequency".to_string(),
        ));
    }
    let n = data.len();
    let n_freq = ((max_f - min_f) * config.samples_per_peak as f64 * n as f64).floor() as usize;
    if n_freq == 0 {
        return Err(CycleError::Configuration(
            "frequency grid for Lomb-Scargle is empty".to_string(),
        ));
    }
    let frequencies = linspace(min_f, max_f, n_freq);

    let times: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let mean_y = data.iter().sum::<f64>() / n as f64;
    let var_y = data.iter().map(|&y| (y - mean_y).powi(2)).sum::<f64>() / (n - 1) as f64;

    let power = frequencies
        .iter()
        .map(|&f| lomb_scargle_power(&times, data, mean_y, var_y, 2.0 * PI * f))
        .collect();
    Ok((frequencies, power))
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i + 1 == count { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Lomb-Scargle power at angular frequency `omega`, normalized by the sample variance.
fn lomb_scargle_power(times: &[f64], values: &[f64], mean_y: f64, var_y: f64, omega: f64) -> f64 {
    if var_y <= 0.0 || omega <= 0.0 {
        return 0.0;
    }

    // Phase offset making the sine and cosine terms orthogonal.
    let (sum_sin2, sum_cos2) = times.iter().fold((0.0, 0.0), |(s, c), &t| {
        let arg = 2.0 * omega * t;
        (s + arg.sin(), c + arg.cos())
    });
    let tau = sum_sin2.atan2(sum_cos2) / (2.0 * omega);

    let mut sc = 0.0;
    let mut ss = 0.0;
    let mut css = 0.0;
    let mut sss = 0.0;
    for (&t, &y) in times.iter().zip(values) {
        let yc = y - mean_y;
        let arg = omega * (t - tau);
        let (s, c) = arg.sin_cos();
        sc += yc * c;
        ss += yc * s;
        css += c * c;
        sss += s * s;
    }

    let css = css.max(1e-15);
    let sss = sss.max(1e-15);
    0.5 * (sc * sc / css + ss * ss / sss) / var_y
}
