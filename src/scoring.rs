//! Cross-sectional score aggregation.
//!
//! Each weighted metric is put on a common scale with a robust z-score
//! across schemes, the scaled metrics are combined into a weighted mean and
//! guardrails are applied last. The summary is ranked by final score.

use crate::config::ScoringConfig;
use crate::helpers::{median_abs_deviation, nan_median};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Consistency constant of the MAD for a normal distribution.
const MAD_SCALE: f64 = 0.6745;

/// Metric name carrying the detected cycle count.
pub const NUM_CYCLES: &str = "num_cycles";

/// Named metrics for one scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub scheme_code: String,
    pub metrics: BTreeMap<String, f64>,
}

impl MetricRecord {
    pub fn new(scheme_code: impl Into<String>) -> Self {
        Self {
            scheme_code: scheme_code.into(),
            metrics: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Metric value, NaN when absent.
    pub fn get(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(f64::NAN)
    }
}

/// One ranked row of the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub scheme_code: String,
    /// Final score after guardrails (NaN when a guardrail rejects the scheme)
    pub score: f64,
    /// Weighted mean of the scaled metrics before guardrails
    pub raw_score: f64,
    pub metrics: BTreeMap<String, f64>,
}

/// Rows sorted by descending score, NaN scores last.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SummaryTable {
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for `scheme_code`, if present.
    pub fn row(&self, scheme_code: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.scheme_code == scheme_code)
    }

    /// Scheme codes in rank order.
    pub fn ranking(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.scheme_code.as_str()).collect()
    }
}

/// Robust z-score `0.6745 (x - median) / MAD` over the finite values.
///
/// Non-finite inputs stay NaN. A zero or undefined MAD scores every finite
/// value as 0.
pub fn robust_zscore(values: &[f64]) -> Vec<f64> {
    let median = nan_median(values);
    let mad = median_abs_deviation(values, median);
    let degenerate = !(mad.is_finite() && mad > 0.0);
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                f64::NAN
            } else if degenerate {
                0.0
            } else {
                MAD_SCALE * (v - median) / mad
            }
        })
        .collect()
}

/// Weighted mean of `(value, weight)` pairs, skipping NaN values.
///
/// NaN when no value is defined or the included weights sum to zero.
pub fn weighted_average(pairs: &[(f64, f64)]) -> f64 {
    let (num, den) = pairs
        .iter()
        .filter(|(v, _)| !v.is_nan())
        .fold((0.0, 0.0), |(num, den), &(v, w)| (num + v * w, den + w));
    if den == 0.0 {
        f64::NAN
    } else {
        num / den
    }
}

/// Scale, weight and rank per-scheme metric records.
///
/// A weighted metric missing from every record is skipped with a warning.
/// Schemes whose `num_cycles` is defined and below `min_cycles` get a NaN
/// score; all others are floored at `min_score` (a NaN raw score floors too).
pub fn combine_scores(records: &[MetricRecord], config: &ScoringConfig) -> SummaryTable {
    if records.is_empty() {
        return SummaryTable::default();
    }

    let mut scaled: Vec<(f64, Vec<f64>)> = Vec::with_capacity(config.weights.len());
    for (name, &weight) in &config.weights {
        if !records.iter().any(|r| r.metrics.contains_key(name)) {
            warn!(metric = %name, "weighted metric missing from all records; skipping");
            continue;
        }
        let column: Vec<f64> = records.iter().map(|r| r.get(name)).collect();
        scaled.push((weight, robust_zscore(&column)));
    }

    let guard = &config.guardrails;
    let mut rows: Vec<SummaryRow> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let pairs: Vec<(f64, f64)> = scaled.iter().map(|(w, col)| (col[i], *w)).collect();
            let raw_score = weighted_average(&pairs);
            let cycles = record.get(NUM_CYCLES);
            let score = if !cycles.is_nan() && cycles < guard.min_cycles {
                f64::NAN
            } else {
                guard.min_score.max(raw_score)
            };
            SummaryRow {
                scheme_code: record.scheme_code.clone(),
                score,
                raw_score,
                metrics: record.metrics.clone(),
            }
        })
        .collect();

    rows.sort_by(|a, b| descending_nan_last(a.score, b.score));
    debug!(schemes = rows.len(), metrics = scaled.len(), "combined scores");
    SummaryTable { rows }
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardrailConfig;

    fn weights(pairs: &[(&str, f64)]) -> ScoringConfig {
        ScoringConfig {
            weights: pairs.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            guardrails: GuardrailConfig::default(),
        }
    }

    #[test]
    fn test_robust_zscore_constant_is_zero() {
        assert_eq!(robust_zscore(&[2.0, 2.0, 2.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_robust_zscore_values() {
        // median 2, MAD 1
        let z = robust_zscore(&[1.0, 2.0, 3.0, f64::NAN]);
        assert!((z[0] + MAD_SCALE).abs() < 1e-12);
        assert_eq!(z[1], 0.0);
        assert!((z[2] - MAD_SCALE).abs() < 1e-12);
        assert!(z[3].is_nan());
    }

    #[test]
    fn test_weighted_average_skips_nan() {
        assert!((weighted_average(&[(1.0, 1.0), (f64::NAN, 5.0), (3.0, 1.0)]) - 2.0).abs() < 1e-12);
        assert!(weighted_average(&[(f64::NAN, 1.0)]).is_nan());
        assert!(weighted_average(&[(1.0, 0.0)]).is_nan());
        assert!(weighted_average(&[]).is_nan());
    }

    #[test]
    fn test_guardrail_nan_overrides_best_raw_score() {
        let records = vec![
            MetricRecord::new("A").with("spectrum", 10.0).with(NUM_CYCLES, 1.0),
            MetricRecord::new("B").with("spectrum", 1.0).with(NUM_CYCLES, 5.0),
            MetricRecord::new("C").with("spectrum", 2.0).with(NUM_CYCLES, 5.0),
        ];
        let table = combine_scores(&records, &weights(&[("spectrum", 1.0)]));
        let a = table.row("A").unwrap();
        assert!(a.raw_score > 0.0);
        assert!(a.score.is_nan());
        assert_eq!(table.ranking(), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_min_score_floor_and_nan_raw() {
        let records = vec![
            MetricRecord::new("A").with("spectrum", 1.0),
            MetricRecord::new("B").with("spectrum", 3.0),
            MetricRecord::new("C").with("spectrum", f64::NAN),
        ];
        let table = combine_scores(&records, &weights(&[("spectrum", 1.0)]));
        // A scores below zero and is floored; C has no defined metric.
        assert_eq!(table.row("A").unwrap().score, 0.0);
        assert!(table.row("C").unwrap().raw_score.is_nan());
        assert_eq!(table.row("C").unwrap().score, 0.0);
        assert_eq!(table.rows[0].scheme_code, "B");
    }

    #[test]
    fn test_missing_weighted_metric_is_skipped() {
        let records = vec![
            MetricRecord::new("A").with("spectrum", 1.0),
            MetricRecord::new("B").with("spectrum", 2.0),
        ];
        let with_missing = combine_scores(&records, &weights(&[("spectrum", 1.0), ("absent", 3.0)]));
        let without = combine_scores(&records, &weights(&[("spectrum", 1.0)]));
        assert_eq!(with_missing, without);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let records = vec![
            MetricRecord::new("X").with("spectrum", 1.0),
            MetricRecord::new("Y").with("spectrum", 1.0),
            MetricRecord::new("Z").with("spectrum", 1.0),
        ];
        let table = combine_scores(&records, &weights(&[("spectrum", 1.0)]));
        assert_eq!(table.ranking(), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_empty_records() {
        assert!(combine_scores(&[], &ScoringConfig::default()).is_empty());
    }

    #[test]
    fn test_summary_serializes_metrics() {
        let records = vec![MetricRecord::new("A").with("spectrum", 1.5).with(NUM_CYCLES, 4.0)];
        let table = combine_scores(&records, &weights(&[("spectrum", 1.0)]));
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["rows"][0]["scheme_code"], "A");
        assert_eq!(json["rows"][0]["metrics"]["num_cycles"], 4.0);
        assert_eq!(json["rows"][0]["score"], 0.0);
    }
}
