//! Forward-return evaluation of bottom signals.

use crate::config::BacktestConfig;
use crate::helpers::{nan_mean, nan_median};
use crate::series::NavSeries;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

/// One evaluated signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestTrade {
    pub scheme_code: String,
    pub signal_date: NaiveDate,
    pub exit_date: NaiveDate,
    /// `nav[exit] / nav[signal] - 1`
    pub forward_return: f64,
    pub hit: bool,
}

/// Aggregate statistics over the trades of one scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub signals: usize,
    pub hit_rate: f64,
    pub mean_return: f64,
    pub median_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestOutcome {
    pub trades: Vec<BacktestTrade>,
    pub summary: BacktestSummary,
}

impl BacktestOutcome {
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

/// Evaluate each signal by the NAV change over the holding period.
///
/// Signal dates absent from the NAV index, and signals whose exit would fall
/// past the last observation, are skipped. The holding period is counted in
/// observations, which equals months for month-end series.
pub fn backtest_bottom_signals(
    scheme_code: &str,
    nav: &NavSeries,
    signal_dates: &[NaiveDate],
    config: &BacktestConfig,
) -> BacktestOutcome {
    let values = nav.values();
    let dates = nav.dates();

    let trades: Vec<BacktestTrade> = signal_dates
        .iter()
        .filter_map(|&date| {
            let start = nav.position_of(date)?;
            let end = start + config.holding_period_months;
            if end >= nav.len() {
                return None;
            }
            let forward_return = values[end] / values[start] - 1.0;
            Some(BacktestTrade {
                scheme_code: scheme_code.to_string(),
                signal_date: date,
                exit_date: dates[end],
                forward_return,
                hit: forward_return > 0.0,
            })
        })
        .collect();

    let returns: Vec<f64> = trades.iter().map(|t| t.forward_return).collect();
    let summary = BacktestSummary {
        signals: trades.len(),
        hit_rate: if trades.is_empty() {
            f64::NAN
        } else {
            trades.iter().filter(|t| t.hit).count() as f64 / trades.len() as f64
        },
        mean_return: nan_mean(&returns),
        median_return: nan_median(&returns),
    };

    if !trades.is_empty() {
        info!(
            scheme = scheme_code,
            signals = summary.signals,
            hit_rate = summary.hit_rate,
            mean_return = summary.mean_return,
            median_return = summary.median_return,
            "backtest summary"
        );
    }

    BacktestOutcome { trades, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::month_end_dates;

    fn month_end_series(values: &[f64]) -> NavSeries {
        let start = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        NavSeries::new("TEST", month_end_dates(start, values.len()), values.to_vec()).unwrap()
    }

    #[test]
    fn test_forward_returns_over_one_month() {
        let nav = month_end_series(&[100.0, 110.0, 121.0, 133.1, 146.41]);
        let dates = nav.dates().to_vec();
        let outcome = backtest_bottom_signals(
            "TEST",
            &nav,
            &[dates[1], dates[3]],
            &BacktestConfig {
                holding_period_months: 1,
            },
        );
        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].exit_date, dates[2]);
        assert_eq!(outcome.trades[1].exit_date, dates[4]);
        for trade in &outcome.trades {
            assert!((trade.forward_return - 0.1).abs() < 1e-12);
            assert!(trade.hit);
        }
        assert_eq!(outcome.summary.hit_rate, 1.0);
        assert!((outcome.summary.median_return - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_exit_past_end_and_unknown_dates_skipped() {
        let nav = month_end_series(&[100.0, 90.0, 80.0]);
        let dates = nav.dates().to_vec();
        let stray = NaiveDate::from_ymd_opt(2020, 2, 15).unwrap();
        let outcome = backtest_bottom_signals(
            "TEST",
            &nav,
            &[dates[0], dates[2], stray],
            &BacktestConfig {
                holding_period_months: 2,
            },
        );
        assert_eq!(outcome.trades.len(), 1);
        assert!((outcome.trades[0].forward_return + 0.2).abs() < 1e-12);
        assert!(!outcome.trades[0].hit);
        assert_eq!(outcome.summary.hit_rate, 0.0);
    }

    #[test]
    fn test_no_signals_gives_nan_summary() {
        let nav = month_end_series(&[1.0, 2.0]);
        let outcome = backtest_bottom_signals("TEST", &nav, &[], &BacktestConfig::default());
        assert!(outcome.is_empty());
        assert_eq!(outcome.summary.signals, 0);
        assert!(outcome.summary.hit_rate.is_nan());
        assert!(outcome.summary.mean_return.is_nan());
    }
}
