//! Butterworth band-pass design and zero-phase filtering.
//!
//! The filter is designed from the analog Butterworth prototype, moved to a
//! band-pass with the standard low-pass to band-pass substitution and brought
//! to the digital domain with the bilinear transform. It is realized as a
//! cascade of second-order sections, which avoids the coefficient blow-up of
//! the expanded transfer function at higher orders.
//!
//! [`SosFilter::filtfilt`] runs the cascade forward and backward over an
//! odd extension of the input with steady-state initial conditions, giving a
//! zero-phase output with squared magnitude response.

use crate::error::{CycleError, Result};
use num_complex::Complex;
use std::f64::consts::PI;

/// Imaginary parts below this are treated as real poles when pairing.
const REAL_POLE_TOL: f64 = 1e-10;

/// One second-order section `b(z) / a(z)` with `a[0] = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// Response at normalized angular frequency `omega` (radians per sample).
    fn response(&self, omega: f64) -> Complex<f64> {
        let z1 = Complex::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        let num = self.b[0] + z1 * self.b[1] + z2 * self.b[2];
        let den = self.a[0] + z1 * self.a[1] + z2 * self.a[2];
        num / den
    }

    /// Steady-state state vector for a unit step input (transposed direct form II).
    fn step_state(&self) -> [f64; 2] {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let rhs0 = b1 - a1 * b0;
        let rhs1 = b2 - a2 * b0;
        // (I - Aᵀ) zi = rhs with Aᵀ = [[-a1, 1], [-a2, 0]]
        let det = 1.0 + a1 + a2;
        if det.abs() < f64::EPSILON {
            return [0.0, 0.0];
        }
        [(rhs0 + rhs1) / det, ((1.0 + a1) * rhs1 - a2 * rhs0) / det]
    }

    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }
}

/// Cascade of second-order sections.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    /// The sections in application order.
    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Complex response at `omega` radians per sample.
    pub fn frequency_response(&self, omega: f64) -> Complex<f64> {
        self.sections
            .iter()
            .fold(Complex::new(1.0, 0.0), |acc, s| acc * s.response(omega))
    }

    /// Steady-state initial conditions of the cascade for a unit step input.
    ///
    /// Each section's state is scaled by the DC gain of the sections in front
    /// of it.
    pub fn steady_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let zi = s.step_state();
                let scaled = [zi[0] * scale, zi[1] * scale];
                scale *= s.dc_gain();
                scaled
            })
            .collect()
    }

    /// Causal filtering from the given per-section state.
    pub fn filter(&self, x: &[f64], state: &[[f64; 2]]) -> Vec<f64> {
        let mut y = x.to_vec();
        for (section, zi) in self.sections.iter().zip(state) {
            let [b0, b1, b2] = section.b;
            let [_, a1, a2] = section.a;
            let (mut z0, mut z1) = (zi[0], zi[1]);
            for v in y.iter_mut() {
                let input = *v;
                let out = b0 * input + z0;
                z0 = b1 * input - a1 * out + z1;
                z1 = b2 * input - a2 * out;
                *v = out;
            }
        }
        y
    }

    /// Number of samples of odd extension on each side.
    fn pad_length(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The padding is clipped to `len - 1` for short inputs.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = self.pad_length().min(n - 1);
        let ext = odd_extension(x, pad);
        let zi = self.steady_state();

        let scaled = |x0: f64| -> Vec<[f64; 2]> {
            zi.iter().map(|z| [z[0] * x0, z[1] * x0]).collect()
        };

        let forward = self.filter(&ext, &scaled(ext[0]));
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let start = reversed[0];
        reversed = self.filter(&reversed, &scaled(start));
        reversed.reverse();
        reversed[pad..pad + n].to_vec()
    }
}

/// Odd extension by `pad` samples on each side (`pad < x.len()`).
fn odd_extension(x: &[f64], pad: usize) -> Vec<f64> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));
    ext
}

/// Digital Butterworth band-pass of prototype order `order`.
///
/// `low` and `high` are edge frequencies normalized to Nyquist, with
/// `0 < low < high < 1`. The result has `order` sections and unit gain at the
/// geometric center of the pre-warped band.
pub fn butterworth_bandpass(order: usize, low: f64, high: f64) -> Result<SosFilter> {
    if order == 0 {
        return Err(CycleError::invalid("order", "filter order must be at least 1"));
    }
    if !(low > 0.0 && high > low && high < 1.0) {
        return Err(CycleError::invalid(
            "band",
            format!("normalized band edges must satisfy 0 < low < high < 1, got [{low}, {high}]"),
        ));
    }

    // Pre-warp for the bilinear transform at fs = 2.
    let w_low = 4.0 * (PI * low / 2.0).tan();
    let w_high = 4.0 * (PI * high / 2.0).tan();
    let bandwidth = w_high - w_low;
    let center = (w_low * w_high).sqrt();

    let n = order as f64;
    let mut poles: Vec<Complex<f64>> = Vec::with_capacity(2 * order);
    for k in 0..order {
        let m = 2.0 * k as f64 - n + 1.0;
        let proto = -Complex::from_polar(1.0, PI * m / (2.0 * n));
        let shifted = proto * (bandwidth / 2.0);
        let root = (shifted * shifted - center * center).sqrt();
        for analog in [shifted + root, shifted - root] {
            poles.push((4.0 + analog) / (4.0 - analog));
        }
    }

    // Every section gets one zero at z = 1 and one at z = -1.
    let mut filter = SosFilter {
        sections: pair_poles(&poles)
            .into_iter()
            .map(|a| Biquad {
                b: [1.0, 0.0, -1.0],
                a,
            })
            .collect(),
    };

    let omega_center = 2.0 * (center / 4.0).atan();
    let gain = filter.frequency_response(omega_center).norm();
    if !(gain.is_finite() && gain > 0.0) {
        return Err(CycleError::model_fit(
            "filter",
            "band-pass design produced a degenerate response",
        ));
    }
    if let Some(first) = filter.sections.first_mut() {
        for coeff in first.b.iter_mut() {
            *coeff /= gain;
        }
    }
    Ok(filter)
}

/// Denominators `[1, a1, a2]` from conjugate pole pairs, then leftover real
/// poles paired in sorted order.
fn pair_poles(poles: &[Complex<f64>]) -> Vec<[f64; 3]> {
    let mut denominators = Vec::with_capacity(poles.len() / 2 + 1);
    let mut real: Vec<f64> = Vec::new();

    for p in poles {
        if p.im.abs() <= REAL_POLE_TOL {
            real.push(p.re);
        } else if p.im > 0.0 {
            denominators.push([1.0, -2.0 * p.re, p.norm_sqr()]);
        }
    }

    real.sort_by(|a, b| a.total_cmp(b));
    for pair in real.chunks(2) {
        match pair {
            [r1, r2] => denominators.push([1.0, -(r1 + r2), r1 * r2]),
            [r] => denominators.push([1.0, -r, 0.0]),
            _ => {}
        }
    }
    denominators
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_design() -> SosFilter {
        // 0.02 .. 0.35 cycles/sample at fs = 1
        butterworth_bandpass(3, 0.04, 0.7).unwrap()
    }

    #[test]
    fn test_design_has_order_sections_and_stable_poles() {
        let filter = default_design();
        assert_eq!(filter.sections().len(), 3);
        for s in filter.sections() {
            // |a2| < 1 and |a1| < 1 + a2 is the stability triangle.
            assert!(s.a[2].abs() < 1.0);
            assert!(s.a[1].abs() < 1.0 + s.a[2]);
        }
    }

    #[test]
    fn test_band_edges_are_half_power() {
        let filter = default_design();
        for edge in [0.04, 0.7] {
            let gain = filter.frequency_response(PI * edge).norm();
            assert!((gain - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6, "gain {gain}");
        }
    }

    #[test]
    fn test_rejects_dc_and_nyquist() {
        let filter = default_design();
        assert!(filter.frequency_response(0.0).norm() < 1e-12);
        assert!(filter.frequency_response(PI).norm() < 1e-12);
    }

    #[test]
    fn test_filtfilt_removes_constant() {
        let filter = default_design();
        let out = filter.filtfilt(&[2.5; 80]);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_filtfilt_passes_band_center_without_delay() {
        let filter = default_design();
        let x: Vec<f64> = (0..200)
            .map(|i| (2.0 * PI * i as f64 / 10.0).sin())
            .collect();
        let y = filter.filtfilt(&x);
        assert_eq!(y.len(), x.len());
        for i in 50..150 {
            assert!((y[i] - x[i]).abs() < 0.05, "i={i}: {} vs {}", y[i], x[i]);
        }
    }

    #[test]
    fn test_filtfilt_short_input_clips_padding() {
        let filter = default_design();
        let y = filter.filtfilt(&[1.0, -1.0, 1.0, -1.0, 1.0]);
        assert_eq!(y.len(), 5);
        assert!(y.iter().all(|v| v.is_finite()));
        assert_eq!(filter.filtfilt(&[]).len(), 0);
    }

    #[test]
    fn test_invalid_band_rejected() {
        assert!(butterworth_bandpass(3, 0.5, 0.2).is_err());
        assert!(butterworth_bandpass(3, 0.0, 0.2).is_err());
        assert!(butterworth_bandpass(0, 0.1, 0.2).is_err());
    }

    #[test]
    fn test_odd_extension() {
        let ext = odd_extension(&[1.0, 2.0, 4.0], 2);
        assert_eq!(ext, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]);
    }
}
