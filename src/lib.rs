//! # navcycle-core
//!
//! Cyclicality scoring for mutual-fund NAV time series.
//!
//! Every scheme runs through the same chain of stages:
//! - Detrending (Hodrick-Prescott or rolling-returns trend)
//! - Power spectrum (Welch or Lomb-Scargle) with band-limited dominant period
//! - Harmonic regression at the dominant period
//! - Hilbert cycle extraction (Butterworth band-pass plus analytic signal)
//! - State-space cycle (local level plus damped stochastic cycle, Kalman/RTS)
//! - Turning-point detection and a three-indicator bottom-signal vote
//! - Forward-return backtest of trough signals
//!
//! Per-scheme metrics are then combined cross-sectionally with robust
//! z-scores, configurable weights and guardrails into a ranked summary.
//!
//! ## Sampling
//!
//! Series are assumed to be regularly sampled (typically month-end NAV).
//! Frequencies are in cycles per sample and periods in samples.
//!
//! ## Example
//!
//! ```no_run
//! use navcycle_core::{simulate_universe, CycleAnalysisConfig, CyclePipeline, SyntheticNav};
//!
//! let universe = simulate_universe(10, &SyntheticNav::default(), Some(42))?;
//! let pipeline = CyclePipeline::new(CycleAnalysisConfig::default())?;
//! let report = pipeline.run(&universe)?;
//! for row in &report.summary.rows {
//!     println!("{} {:.3}", row.scheme_code, row.score);
//! }
//! # Ok::<(), navcycle_core::CycleError>(())
//! ```

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod parallel;

pub mod backtest;
pub mod bottom_signal;
pub mod config;
pub mod detrend;
pub mod error;
pub mod filter;
pub mod harmonic;
pub mod helpers;
pub mod hilbert;
pub mod logging;
pub mod pipeline;
pub mod scoring;
pub mod series;
pub mod simulation;
pub mod spectrum;
pub mod state_space;
pub mod turning_points;

// Re-export commonly used items
pub use error::{CycleError, Result};
pub use helpers::NUMERICAL_EPS;
pub use series::{month_end_dates, months_between, NavSeries};

// Re-export configuration types
pub use config::{
    BacktestConfig, BottomSignalConfig, CycleAnalysisConfig, DetrendConfig, DetrendMethod,
    GuardrailConfig, HarmonicConfig, HilbertConfig, HilbertStrategyKind, LombScargleConfig,
    ScoringConfig, SpectrumBand, SpectrumConfig, SpectrumMethod, StateSpaceConfig,
    TurningPointConfig, WelchConfig,
};
pub use logging::{init_logging, LogConfig, LogFormat};

// Re-export stage results
pub use backtest::{BacktestOutcome, BacktestSummary, BacktestTrade};
pub use bottom_signal::{BottomSignalVote, IndicatorVotes};
pub use detrend::DetrendResult;
pub use harmonic::HarmonicFit;
pub use hilbert::{
    CycleExtractionStrategy, FallbackSmoothingStrategy, HilbertCycle, SpectralStrategy,
};
pub use scoring::{MetricRecord, SummaryRow, SummaryTable};
pub use spectrum::SpectrumResult;
pub use state_space::{CycleModelFit, StateSpaceCycle};
pub use turning_points::{TurningPoint, TurningPointKind};

// Re-export orchestration
pub use pipeline::{
    CyclePipeline, SchemeAnalysis, SchemeBottomSignal, SchemeTurningPoint, UniverseReport,
};
pub use simulation::{simulate_nav, simulate_universe, SyntheticNav};
