//! Peak and trough detection on a cycle estimate.
//!
//! Candidate extrema are strict local maxima, with flat tops resolved to
//! their midpoint. Candidates closer than `distance` samples to a higher
//! candidate are discarded, then candidates whose prominence falls below the
//! threshold. Troughs are peaks of the negated series.

use crate::config::TurningPointConfig;
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;

/// Kind of turning point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurningPointKind {
    Peak,
    Trough,
}

/// A detected local extremum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurningPoint {
    pub date: NaiveDate,
    /// Position in the analysed series
    pub index: usize,
    /// Series value at the extremum (not negated for troughs)
    pub value: f64,
    pub kind: TurningPointKind,
    /// Height above the higher of the two surrounding minima
    pub prominence: f64,
}

impl TurningPoint {
    #[inline]
    pub fn is_trough(&self) -> bool {
        self.kind == TurningPointKind::Trough
    }
}

/// Detect peaks and troughs of `cycle`, sorted by date.
///
/// `dates` and `cycle` are aligned; only the common prefix is examined.
/// Inputs shorter than 3 samples have no interior points and give an empty
/// result.
pub fn detect_turning_points(
    dates: &[NaiveDate],
    cycle: &[f64],
    config: &TurningPointConfig,
) -> Vec<TurningPoint> {
    let n = dates.len().min(cycle.len());
    if n < 3 {
        return Vec::new();
    }
    let values = &cycle[..n];
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();

    let mut points: Vec<TurningPoint> = Vec::new();
    for (signal, kind) in [
        (values, TurningPointKind::Peak),
        (negated.as_slice(), TurningPointKind::Trough),
    ] {
        for (index, prominence) in find_peaks(signal, config.distance, config.prominence) {
            points.push(TurningPoint {
                date: dates[index],
                index,
                value: values[index],
                kind,
                prominence,
            });
        }
    }
    points.sort_by(|a, b| a.date.cmp(&b.date));
    points
}

/// Number of completed cycles: the trough count, at least 1 when any turning
/// point exists, 0 when none does.
pub fn count_cycles(points: &[TurningPoint]) -> usize {
    if points.is_empty() {
        0
    } else {
        points.iter().filter(|p| p.is_trough()).count().max(1)
    }
}

/// Peaks of `signal` as `(index, prominence)`, filtered by distance then prominence.
fn find_peaks(signal: &[f64], distance: usize, min_prominence: f64) -> Vec<(usize, f64)> {
    let mut peaks = local_maxima(signal);
    if distance > 1 {
        peaks = select_by_distance(signal, &peaks, distance);
    }
    peaks
        .into_iter()
        .map(|p| (p, compute_prominence(signal, p)))
        .filter(|&(_, prom)| prom >= min_prominence)
        .collect()
}

/// Strict local maxima; flat tops yield their (lower) midpoint.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let last = n - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Keep peaks at least `distance` samples apart, higher peaks first.
///
/// Equal heights are visited left to right.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        x[peaks[b]]
            .partial_cmp(&x[peaks[a]])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut keep = vec![true; peaks.len()];
    for &j in &order {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in (j + 1)..peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }
    peaks
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(&p, _)| p)
        .collect()
}

/// Prominence of the peak at `peak_idx`.
///
/// Scans each side until a strictly higher sample or the boundary and takes
/// the height above the higher of the two minima found.
fn compute_prominence(signal: &[f64], peak_idx: usize) -> f64 {
    let peak_val = signal[peak_idx];

    let mut left_min = peak_val;
    for &v in signal[..peak_idx].iter().rev() {
        if v > peak_val {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = peak_val;
    for &v in &signal[peak_idx + 1..] {
        if v > peak_val {
            break;
        }
        right_min = right_min.min(v);
    }

    peak_val - left_min.max(right_min)
}
