//! Helper functions for NaN-aware statistics and common series operations.

/// Small epsilon for numerical comparisons (e.g., avoiding division by zero).
pub const NUMERICAL_EPS: f64 = 1e-10;

/// Mean of the finite values, NaN if there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in values {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population variance (ddof = 0) of the finite values, NaN if there are none.
pub fn nan_variance(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let mut ss = 0.0;
    let mut count = 0usize;
    for &v in values {
        if v.is_finite() {
            ss += (v - mean).powi(2);
            count += 1;
        }
    }
    ss / count as f64
}

/// Median of the finite values, NaN if there are none.
///
/// Even-length inputs return the mean of the two middle values.
pub fn nan_median(values: &[f64]) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_by(|a, b| a.total_cmp(b));
    let mid = finite.len() / 2;
    if finite.len() % 2 == 1 {
        finite[mid]
    } else {
        (finite[mid - 1] + finite[mid]) / 2.0
    }
}

/// Median absolute deviation around `center`, ignoring non-finite values.
pub fn median_abs_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| (v - center).abs())
        .collect();
    nan_median(&deviations)
}

/// Pearson correlation of paired samples, skipping pairs with a non-finite member.
///
/// Returns NaN with fewer than 2 valid pairs or when either side is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for &(a, b) in &pairs {
        sxy += (a - mean_x) * (b - mean_y);
        sxx += (a - mean_x).powi(2);
        syy += (b - mean_y).powi(2);
    }
    let denom = (sxx * syy).sqrt();
    if denom <= 0.0 {
        f64::NAN
    } else {
        sxy / denom
    }
}

/// Replace non-finite values by the last finite one, then fill any leading
/// gap with the first finite value. A series with no finite value is returned
/// unchanged.
pub fn fill_forward_backward(values: &[f64]) -> Vec<f64> {
    let mut filled = values.to_vec();
    let mut last = f64::NAN;
    for v in filled.iter_mut() {
        if v.is_finite() {
            last = *v;
        } else if last.is_finite() {
            *v = last;
        }
    }
    if let Some(first) = filled.iter().copied().find(|v| v.is_finite()) {
        for v in filled.iter_mut() {
            if v.is_finite() {
                break;
            }
            *v = first;
        }
    }
    filled
}

/// Trailing rolling mean with `min_periods = 1`; non-finite values are skipped.
pub fn trailing_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            nan_mean(&values[start..=i])
        })
        .collect()
}

/// Centered rolling mean with `min_periods = 1`.
///
/// For an even window `w` the window at `i` spans `i - w/2 ..= i + w/2 - 1`.
pub fn centered_mean(values: &[f64], window: usize) -> Vec<f64> {
    let m = values.len();
    let window = window.max(1);
    let before = window / 2;
    let after = window - before - 1;
    (0..m)
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(m);
            nan_mean(&values[start..end])
        })
        .collect()
}

/// Index of the first maximum, ignoring NaN. `None` for an empty or all-NaN slice.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
