//! Per-scheme analysis chain and cross-sectional aggregation.
//!
//! [`CyclePipeline::analyze_scheme`] runs every stage on one NAV series:
//! detrend, spectrum, harmonic fit, Hilbert cycle, state-space cycle,
//! turning points, bottom-signal vote and a trough backtest.
//! [`CyclePipeline::run`] applies it to a universe, isolates per-scheme
//! failures and ranks the survivors with [`combine_scores`].

use crate::backtest::{backtest_bottom_signals, BacktestOutcome, BacktestTrade};
use crate::bottom_signal::{vote_bottom_signal, BottomSignalVote};
use crate::config::CycleAnalysisConfig;
use crate::detrend::{detrend, DetrendResult};
use crate::error::{CycleError, Result};
use crate::harmonic::{harmonic_regression, HarmonicFit};
use crate::helpers::fill_forward_backward;
use crate::hilbert::{strategy_for, CycleExtractionStrategy, HilbertCycle};
use crate::iter_maybe_parallel;
use crate::scoring::{combine_scores, MetricRecord, SummaryTable, NUM_CYCLES};
use crate::series::NavSeries;
use crate::spectrum::{compute_spectrum, SpectrumResult};
use crate::state_space::{estimate_cycle, StateSpaceCycle};
use crate::turning_points::{count_cycles, detect_turning_points, TurningPoint};
use chrono::NaiveDate;
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;
use serde::Serialize;
use tracing::{debug, error, info};

/// Every stage output for one scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeAnalysis {
    pub scheme_code: String,
    pub detrend: DetrendResult,
    /// Dates of the finite residuals fed to the downstream stages
    pub residual_dates: Vec<NaiveDate>,
    pub spectrum: SpectrumResult,
    pub harmonic: HarmonicFit,
    pub hilbert: HilbertCycle,
    pub state_space: StateSpaceCycle,
    pub turning_points: Vec<TurningPoint>,
    pub num_cycles: usize,
    pub bottom_signal: BottomSignalVote,
    pub backtest: BacktestOutcome,
    pub metrics: MetricRecord,
}

/// Turning point tagged with its scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemeTurningPoint {
    pub scheme_code: String,
    #[serde(flatten)]
    pub point: TurningPoint,
}

/// Bottom-signal vote tagged with its scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemeBottomSignal {
    pub scheme_code: String,
    #[serde(flatten)]
    pub vote: BottomSignalVote,
}

/// Outputs of a universe run.
#[derive(Debug, Default)]
pub struct UniverseReport {
    pub summary: SummaryTable,
    pub turning_points: Vec<SchemeTurningPoint>,
    pub bottom_signals: Vec<SchemeBottomSignal>,
    pub backtests: Vec<BacktestTrade>,
    /// [`CycleError::SchemeProcessing`] for each skipped scheme
    pub failures: Vec<CycleError>,
}

impl UniverseReport {
    /// Codes of the schemes that failed, in input order.
    pub fn failed_schemes(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|e| match e {
                CycleError::SchemeProcessing { scheme_code, .. } => Some(scheme_code.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Configured analysis chain.
pub struct CyclePipeline {
    config: CycleAnalysisConfig,
    strategy: Box<dyn CycleExtractionStrategy>,
}

impl std::fmt::Debug for CyclePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CyclePipeline")
            .field("config", &self.config)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl CyclePipeline {
    /// Validate `config` and select the Hilbert strategy.
    pub fn new(config: CycleAnalysisConfig) -> Result<Self> {
        config.validate()?;
        let strategy = strategy_for(config.hilbert.strategy);
        Ok(Self { config, strategy })
    }

    pub fn config(&self) -> &CycleAnalysisConfig {
        &self.config
    }

    /// Name of the selected Hilbert strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Run every stage on one scheme.
    ///
    /// Works on log-NAV when every value is positive and on the raw values
    /// otherwise. Stage failures that the stages recover from locally show up
    /// as NaN metrics; anything else is returned as an error.
    pub fn analyze_scheme(&self, nav: &NavSeries) -> Result<SchemeAnalysis> {
        let cfg = &self.config;
        let scheme_code = nav.scheme_code();
        let working = nav.log_values().unwrap_or_else(|| nav.values().to_vec());

        let detrended = detrend(&working, &cfg.detrend)?;
        let (residual_dates, residual): (Vec<NaiveDate>, Vec<f64>) = nav
            .dates()
            .iter()
            .zip(&detrended.residual)
            .filter(|(_, r)| r.is_finite())
            .map(|(&d, &r)| (d, r))
            .unzip();

        let spectrum = compute_spectrum(&residual, &cfg.spectrum)?;
        let harmonic = harmonic_regression(&residual, spectrum.dominant_period, &cfg.harmonic);

        let filled = fill_forward_backward(&residual);
        let hilbert = self.strategy.extract(&filled, &cfg.hilbert)?;
        let state_space = estimate_cycle(&filled, &cfg.state_space);

        let turning_points =
            detect_turning_points(&residual_dates, &hilbert.cycle, &cfg.turning_points);
        let num_cycles = count_cycles(&turning_points);

        let bottom_signal = vote_bottom_signal(
            nav.dates(),
            &turning_points,
            Some(&hilbert),
            Some(&state_space),
            &cfg.bottom_signal,
        );

        let trough_dates: Vec<NaiveDate> = turning_points
            .iter()
            .filter(|p| p.is_trough())
            .map(|p| p.date)
            .collect();
        let backtest = backtest_bottom_signals(scheme_code, nav, &trough_dates, &cfg.backtest);

        let metrics = MetricRecord::new(scheme_code)
            .with("spectrum", spectrum.sharpness)
            .with("harmonic", harmonic.r2)
            .with("hilbert", hilbert.phase_coherence)
            .with("state_space", state_space.persistence)
            .with("turning_points", num_cycles as f64)
            .with(NUM_CYCLES, num_cycles as f64)
            .with("dominant_period", spectrum.dominant_period)
            .with("vote_count", bottom_signal.vote_count as f64)
            .with("bottom_signal", if bottom_signal.signal { 1.0 } else { 0.0 })
            .with("median_period_hilbert", hilbert.median_period)
            .with("signal_to_noise", state_space.signal_to_noise)
            .with("harmonic_amplitude", harmonic.amplitude)
            .with("harmonic_rmse", harmonic.rmse);

        debug!(
            scheme = scheme_code,
            strategy = self.strategy.name(),
            dominant_period = spectrum.dominant_period,
            num_cycles,
            signal = bottom_signal.signal,
            "analyzed scheme"
        );

        Ok(SchemeAnalysis {
            scheme_code: scheme_code.to_string(),
            detrend: detrended,
            residual_dates,
            spectrum,
            harmonic,
            hilbert,
            state_space,
            turning_points,
            num_cycles,
            bottom_signal,
            backtest,
            metrics,
        })
    }

    /// Analyze every scheme and rank the results.
    ///
    /// A scheme that fails is logged, recorded in
    /// [`UniverseReport::failures`] and left out of every other output.
    /// Configuration and parameter errors ([`CycleError::is_fatal`]) are not
    /// per-scheme failures: the first one, in input order, aborts the run.
    /// The per-scheme loop runs in parallel with the `parallel` feature;
    /// outputs keep the input order either way.
    pub fn run(&self, universe: &[NavSeries]) -> Result<UniverseReport> {
        info!(schemes = universe.len(), "starting per-scheme analysis");

        let results: Vec<Result<SchemeAnalysis>> = iter_maybe_parallel!(universe)
            .map(|nav| self.analyze_scheme(nav))
            .collect();

        let mut report = UniverseReport::default();
        let mut records = Vec::with_capacity(results.len());
        for (nav, result) in universe.iter().zip(results) {
            let analysis = match result {
                Ok(analysis) => analysis,
                Err(err) if err.is_fatal() => {
                    error!(scheme = nav.scheme_code(), error = %err, "aborting run");
                    return Err(err);
                }
                Err(err) => {
                    let err = err.for_scheme(nav.scheme_code());
                    error!(scheme = nav.scheme_code(), error = %err, "scheme skipped");
                    report.failures.push(err);
                    continue;
                }
            };
            report
                .turning_points
                .extend(analysis.turning_points.iter().map(|point| SchemeTurningPoint {
                    scheme_code: analysis.scheme_code.clone(),
                    point: point.clone(),
                }));
            report.bottom_signals.push(SchemeBottomSignal {
                scheme_code: analysis.scheme_code.clone(),
                vote: analysis.bottom_signal.clone(),
            });
            report.backtests.extend(analysis.backtest.trades);
            records.push(analysis.metrics);
        }

        report.summary = combine_scores(&records, &self.config.scoring);
        info!(
            analyzed = records.len(),
            failed = report.failures.len(),
            "universe analysis complete"
        );
        Ok(report)
    }
}
