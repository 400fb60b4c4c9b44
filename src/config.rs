//! Configuration for every stage of the cyclicality engine.
//!
//! Each stage has its own immutable struct with documented defaults. All
//! structs deserialize from TOML with missing fields taking their defaults;
//! [`CycleAnalysisConfig::validate`] rejects invalid values before any series
//! is processed.
//!
//! ```
//! use navcycle_core::config::{CycleAnalysisConfig, DetrendMethod};
//!
//! let config = CycleAnalysisConfig::from_toml_str(
//!     r#"
//!     [detrend]
//!     method = "returns"
//!     returns_window = 4
//!
//!     [scoring.weights]
//!     spectrum = 1.0
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.detrend.method, DetrendMethod::Returns);
//! assert_eq!(config.spectrum.welch.nperseg, 64);
//! ```

use crate::error::{CycleError, Result};
use crate::logging::LogConfig;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

fn invalid(name: &str, reason: impl Into<String>) -> CycleError {
    CycleError::invalid(name, reason)
}

/// Deserialize a method name through its `FromStr` impl.
fn parse_name<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = CycleError>,
{
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(de::Error::custom)
}

// ============================================================================
// Detrending
// ============================================================================

/// Trend removal method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetrendMethod {
    /// Hodrick-Prescott smoothing
    #[default]
    Hp,
    /// Cumulated rolling mean of (log-)returns
    Returns,
}

impl FromStr for DetrendMethod {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hp" => Ok(DetrendMethod::Hp),
            "returns" => Ok(DetrendMethod::Returns),
            other => Err(CycleError::Configuration(format!(
                "unknown detrending method: {other}"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for DetrendMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        parse_name(deserializer)
    }
}

impl fmt::Display for DetrendMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetrendMethod::Hp => write!(f, "hp"),
            DetrendMethod::Returns => write!(f, "returns"),
        }
    }
}

/// Detrending configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetrendConfig {
    /// Trend removal method (default: `hp`)
    pub method: DetrendMethod,
    /// HP smoothing penalty (default: 129600, the usual monthly value)
    pub hp_lambda: f64,
    /// Rolling window of the returns method, must exceed 1 (default: 3)
    pub returns_window: usize,
}

impl Default for DetrendConfig {
    fn default() -> Self {
        Self {
            method: DetrendMethod::Hp,
            hp_lambda: 129_600.0,
            returns_window: 3,
        }
    }
}

impl DetrendConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.hp_lambda.is_finite() && self.hp_lambda > 0.0) {
            return Err(invalid("hp_lambda", "must be positive"));
        }
        if self.returns_window <= 1 {
            return Err(invalid("returns_window", "must be greater than 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Spectrum
// ============================================================================

/// Power spectrum estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumMethod {
    /// Averaged modified periodogram
    #[default]
    Welch,
    /// Lomb-Scargle periodogram on a fixed frequency grid
    LombScargle,
}

impl FromStr for SpectrumMethod {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "welch" => Ok(SpectrumMethod::Welch),
            "lomb" | "lomb_scargle" => Ok(SpectrumMethod::LombScargle),
            other => Err(CycleError::Configuration(format!(
                "unknown spectrum method: {other}"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for SpectrumMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        parse_name(deserializer)
    }
}

/// Welch segmenting parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelchConfig {
    /// Segment length, clipped to the series length (default: 64)
    pub nperseg: usize,
    /// Overlap between segments (default: 32)
    pub noverlap: usize,
}

impl Default for WelchConfig {
    fn default() -> Self {
        Self {
            nperseg: 64,
            noverlap: 32,
        }
    }
}

/// Lomb-Scargle frequency grid, in cycles per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LombScargleConfig {
    pub minimum_frequency: f64,
    pub maximum_frequency: f64,
    /// Grid points per unit frequency per observation (default: 5)
    pub samples_per_peak: usize,
}

impl Default for LombScargleConfig {
    fn default() -> Self {
        Self {
            minimum_frequency: 0.02,
            maximum_frequency: 0.5,
            samples_per_peak: 5,
        }
    }
}

/// Frequency band searched for the dominant cycle, in cycles per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumBand {
    pub low: f64,
    pub high: f64,
}

impl Default for SpectrumBand {
    fn default() -> Self {
        Self {
            low: 0.02,
            high: 0.35,
        }
    }
}

impl SpectrumBand {
    #[inline]
    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.low && frequency <= self.high
    }
}

/// Spectrum estimation configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub method: SpectrumMethod,
    pub welch: WelchConfig,
    pub lomb_scargle: LombScargleConfig,
    pub band: SpectrumBand,
}

impl SpectrumConfig {
    pub fn validate(&self) -> Result<()> {
        if self.welch.nperseg < 2 {
            return Err(invalid("welch.nperseg", "must be at least 2"));
        }
        let ls = &self.lomb_scargle;
        if !(ls.minimum_frequency.is_finite() && ls.maximum_frequency.is_finite()) {
            return Err(CycleError::Configuration(
                "Lomb-Scargle frequency bounds must be finite".to_string(),
            ));
        }
        if ls.maximum_frequency <= ls.minimum_frequency {
            return Err(CycleError::Configuration(
                "maximum_frequency must be greater than minimum_frequency".to_string(),
            ));
        }
        if ls.minimum_frequency < 0.0 {
            return Err(CycleError::Configuration(
                "minimum_frequency must be non-negative".to_string(),
            ));
        }
        if ls.samples_per_peak == 0 {
            return Err(CycleError::Configuration(
                "samples_per_peak must be positive".to_string(),
            ));
        }
        if !(self.band.low.is_finite() && self.band.high.is_finite())
            || self.band.high <= self.band.low
        {
            return Err(CycleError::Configuration(format!(
                "spectrum band [{}, {}] is inverted or empty",
                self.band.low, self.band.high
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Harmonic regression
// ============================================================================

/// Harmonic regression configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicConfig {
    /// Harmonic multiples of the base frequency (default: `[1, 2]`)
    pub harmonics: Vec<u32>,
    /// Ridge penalty (default: 1e-3)
    pub regularization: f64,
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            harmonics: vec![1, 2],
            regularization: 1e-3,
        }
    }
}

impl HarmonicConfig {
    pub fn validate(&self) -> Result<()> {
        if self.harmonics.is_empty() {
            return Err(invalid("harmonics", "at least one harmonic is required"));
        }
        if self.harmonics.contains(&0) {
            return Err(invalid("harmonics", "harmonic multiples must be positive"));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(invalid("regularization", "must be non-negative"));
        }
        Ok(())
    }
}

// ============================================================================
// Hilbert cycle
// ============================================================================

/// Upper band-pass edge, as a fraction of Nyquist, after clipping.
pub const MAX_NORMALIZED_EDGE: f64 = 0.999;

/// Which cycle extraction strategy the pipeline builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HilbertStrategyKind {
    /// Butterworth band-pass and FFT analytic signal
    #[default]
    Spectral,
    /// Moving-average smoother with cumulative phase (reduced-dependency mode)
    Smoothing,
}

/// Hilbert cycle extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HilbertConfig {
    /// Lower band-pass cutoff (default: 0.02)
    pub lowcut: f64,
    /// Upper band-pass cutoff (default: 0.35)
    pub highcut: f64,
    /// Sampling frequency (default: 1.0)
    pub fs: f64,
    /// Butterworth prototype order (default: 3)
    pub order: usize,
    pub strategy: HilbertStrategyKind,
}

impl Default for HilbertConfig {
    fn default() -> Self {
        Self {
            lowcut: 0.02,
            highcut: 0.35,
            fs: 1.0,
            order: 3,
            strategy: HilbertStrategyKind::Spectral,
        }
    }
}

impl HilbertConfig {
    /// Band edges normalized to Nyquist, with the upper edge clipped to
    /// [`MAX_NORMALIZED_EDGE`].
    pub fn normalized_band(&self) -> (f64, f64) {
        let nyquist = 0.5 * self.fs;
        (
            self.lowcut / nyquist,
            (self.highcut / nyquist).min(MAX_NORMALIZED_EDGE),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.highcut > self.lowcut) {
            return Err(invalid("highcut", "highcut must be greater than lowcut"));
        }
        if !(self.fs.is_finite() && self.fs > 0.0) {
            return Err(invalid("fs", "sampling frequency must be positive"));
        }
        if !(self.lowcut > 0.0) {
            return Err(invalid("lowcut", "band-pass cutoff must be positive"));
        }
        if self.order == 0 {
            return Err(invalid("order", "filter order must be at least 1"));
        }
        let (low, high) = self.normalized_band();
        if !(low > 0.0 && low < high) {
            return Err(invalid(
                "highcut",
                format!(
                    "normalized band [{low}, {high}] must satisfy 0 < low < high <= {MAX_NORMALIZED_EDGE}"
                ),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// State-space cycle
// ============================================================================

/// Stochastic cycle model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSpaceConfig {
    /// Target cycle period in samples, floored at 2 (default: 60)
    pub cycle_period: f64,
    /// Starting damping factor of the cycle, in (0, 1) (default: 0.9)
    pub damping: f64,
    /// Relative half-width of the admissible period band (default: 0.2)
    pub period_tolerance: f64,
    /// Nelder-Mead iteration cap; the best vertex is kept when it is reached (default: 1000)
    pub max_iterations: usize,
}

impl Default for StateSpaceConfig {
    fn default() -> Self {
        Self {
            cycle_period: 60.0,
            damping: 0.9,
            period_tolerance: 0.2,
            max_iterations: 1000,
        }
    }
}

impl StateSpaceConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.cycle_period.is_finite() && self.cycle_period > 0.0) {
            return Err(invalid("cycle_period", "must be positive"));
        }
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(invalid("damping", "must lie strictly between 0 and 1"));
        }
        if !(self.period_tolerance >= 0.0 && self.period_tolerance < 1.0) {
            return Err(invalid("period_tolerance", "must lie in [0, 1)"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// Turning points
// ============================================================================

/// Turning point detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurningPointConfig {
    /// Minimum prominence (default: 0.5)
    pub prominence: f64,
    /// Minimum separation in samples, at least 1 (default: 3)
    pub distance: usize,
}

impl Default for TurningPointConfig {
    fn default() -> Self {
        Self {
            prominence: 0.5,
            distance: 3,
        }
    }
}

impl TurningPointConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.prominence.is_finite() && self.prominence >= 0.0) {
            return Err(invalid("prominence", "must be non-negative"));
        }
        if self.distance == 0 {
            return Err(invalid("distance", "must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Bottom signal
// ============================================================================

/// Bottom-signal voting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottomSignalConfig {
    /// Votes required for a bottom signal (default: 2 of 3)
    pub min_votes: usize,
    /// Whole calendar months a trough stays "recent" (default: 6)
    pub lookback_months: u32,
}

impl Default for BottomSignalConfig {
    fn default() -> Self {
        Self {
            min_votes: 2,
            lookback_months: 6,
        }
    }
}

impl BottomSignalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_votes > 3 {
            return Err(invalid("min_votes", "at most 3 indicators vote"));
        }
        Ok(())
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Hard overrides applied after weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Schemes with fewer detected cycles get a NaN score (default: 3)
    pub min_cycles: f64,
    /// Floor of the final score (default: 0.0)
    pub min_score: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            min_cycles: 3.0,
            min_score: 0.0,
        }
    }
}

/// Cross-sectional scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight per metric name; ordered map so aggregation is deterministic
    pub weights: BTreeMap<String, f64>,
    pub guardrails: GuardrailConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let weights = ["spectrum", "harmonic", "hilbert", "state_space"]
            .into_iter()
            .map(|name| (name.to_string(), 0.25))
            .collect();
        Self {
            weights,
            guardrails: GuardrailConfig::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some((name, _)) = self.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(invalid("weights", format!("weight for '{name}' is not finite")));
        }
        if !self.guardrails.min_cycles.is_finite() {
            return Err(invalid("guardrails.min_cycles", "must be finite"));
        }
        if self.guardrails.min_score.is_nan() {
            return Err(invalid("guardrails.min_score", "must not be NaN"));
        }
        Ok(())
    }
}

// ============================================================================
// Backtest
// ============================================================================

/// Forward-return evaluation of trough signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Observations held after each signal (default: 6)
    pub holding_period_months: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            holding_period_months: 6,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.holding_period_months == 0 {
            return Err(invalid("holding_period_months", "must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleAnalysisConfig {
    pub detrend: DetrendConfig,
    pub spectrum: SpectrumConfig,
    pub harmonic: HarmonicConfig,
    pub hilbert: HilbertConfig,
    pub state_space: StateSpaceConfig,
    pub turning_points: TurningPointConfig,
    pub bottom_signal: BottomSignalConfig,
    pub scoring: ScoringConfig,
    pub backtest: BacktestConfig,
    pub logging: LogConfig,
}

impl CycleAnalysisConfig {
    /// Validate every stage.
    pub fn validate(&self) -> Result<()> {
        self.detrend.validate()?;
        self.spectrum.validate()?;
        self.harmonic.validate()?;
        self.hilbert.validate()?;
        self.state_space.validate()?;
        self.turning_points.validate()?;
        self.bottom_signal.validate()?;
        self.scoring.validate()?;
        self.backtest.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown method names and malformed documents are configuration errors.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CycleAnalysisConfig = toml::from_str(content)
            .map_err(|e| CycleError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CycleError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CycleAnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detrend.hp_lambda, 129_600.0);
        assert_eq!(config.harmonic.harmonics, vec![1, 2]);
        assert_eq!(config.bottom_signal.min_votes, 2);
        assert_eq!(config.scoring.weights.len(), 4);
    }

    #[test]
    fn test_unknown_method_is_configuration_error() {
        let err = CycleAnalysisConfig::from_toml_str("[detrend]\nmethod = \"loess\"").unwrap_err();
        assert!(matches!(err, CycleError::Configuration(_)));

        let err = "wavelet".parse::<SpectrumMethod>().unwrap_err();
        assert!(matches!(err, CycleError::Configuration(_)));
    }

    #[test]
    fn test_lomb_alias_accepted() {
        let config =
            CycleAnalysisConfig::from_toml_str("[spectrum]\nmethod = \"lomb\"").unwrap();
        assert_eq!(config.spectrum.method, SpectrumMethod::LombScargle);
        assert_eq!("LOMB_SCARGLE".parse::<SpectrumMethod>().unwrap(), SpectrumMethod::LombScargle);
    }

    #[test]
    fn test_inverted_lomb_range_rejected() {
        let err = CycleAnalysisConfig::from_toml_str(
            "[spectrum.lomb_scargle]\nminimum_frequency = 0.4\nmaximum_frequency = 0.1",
        )
        .unwrap_err();
        assert!(matches!(err, CycleError::Configuration(_)));
    }

    #[test]
    fn test_inverted_hilbert_band_rejected() {
        let config = CycleAnalysisConfig {
            hilbert: HilbertConfig {
                lowcut: 0.3,
                highcut: 0.1,
                ..HilbertConfig::default()
            },
            ..CycleAnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CycleError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_normalized_band_clips_and_validates() {
        let default_band = HilbertConfig::default().normalized_band();
        assert!((default_band.0 - 0.04).abs() < 1e-12);
        assert!((default_band.1 - 0.7).abs() < 1e-12);

        let above_nyquist = HilbertConfig {
            lowcut: 0.5,
            highcut: 0.6,
            fs: 1.0,
            ..HilbertConfig::default()
        };
        assert_eq!(above_nyquist.normalized_band(), (1.0, MAX_NORMALIZED_EDGE));
        assert!(matches!(
            above_nyquist.validate(),
            Err(CycleError::InvalidParameter { .. })
        ));

        let wide = HilbertConfig {
            lowcut: 0.1,
            highcut: 0.8,
            ..HilbertConfig::default()
        };
        assert_eq!(wide.normalized_band().1, MAX_NORMALIZED_EDGE);
        assert!(wide.validate().is_ok());
    }

    #[test]
    fn test_method_names_parse_through_from_str() {
        let config = CycleAnalysisConfig::from_toml_str(
            "[detrend]\nmethod = \"Returns\"\n[spectrum]\nmethod = \"Lomb_Scargle\"",
        )
        .unwrap();
        assert_eq!(config.detrend.method, DetrendMethod::Returns);
        assert_eq!(config.spectrum.method, SpectrumMethod::LombScargle);
        assert_eq!("HP".parse::<DetrendMethod>().unwrap(), DetrendMethod::Hp);
    }

    #[test]
    fn test_returns_window_must_exceed_one() {
        let err = CycleAnalysisConfig::from_toml_str("[detrend]\nreturns_window = 1").unwrap_err();
        match err {
            CycleError::InvalidParameter { name, .. } => assert_eq!(name, "returns_window"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = CycleAnalysisConfig::default();
        config.spectrum.method = SpectrumMethod::LombScargle;
        config.scoring.weights.insert("num_cycles".to_string(), 0.1);
        let text = config.to_toml_string().unwrap();
        let restored = CycleAnalysisConfig::from_toml_str(&text).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_weights_replace_defaults() {
        let config =
            CycleAnalysisConfig::from_toml_str("[scoring.weights]\nharmonic = 2.0").unwrap();
        assert_eq!(config.scoring.weights.len(), 1);
        assert_eq!(config.scoring.weights["harmonic"], 2.0);
    }
}
