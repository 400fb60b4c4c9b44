//! Error types for the cyclicality engine.
//!
//! Configuration and parameter errors abort a run. Model fit failures are
//! recovered by the stage that raised them (the stage reports NaN metrics),
//! and scheme processing failures are recorded by the orchestrator while the
//! remaining schemes keep running.

use thiserror::Error;

/// Result type alias for cyclicality operations.
pub type Result<T> = std::result::Result<T, CycleError>;

/// Errors raised by the cyclicality engine.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Invalid or contradictory configuration (unknown method, inverted bounds, empty grid).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied numeric parameter violates a precondition.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A statistical fit could not converge or failed internally.
    #[error("Model fit failed in {stage}: {reason}")]
    ModelFit { stage: &'static str, reason: String },

    /// Not enough observations for the requested computation.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Any failure while processing one scheme end-to-end.
    #[error("Failed to process scheme {scheme_code}: {source}")]
    SchemeProcessing {
        scheme_code: String,
        #[source]
        source: Box<CycleError>,
    },

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CycleError {
    /// Shorthand for [`CycleError::InvalidParameter`].
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CycleError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`CycleError::ModelFit`].
    pub fn model_fit(stage: &'static str, reason: impl Into<String>) -> Self {
        CycleError::ModelFit {
            stage,
            reason: reason.into(),
        }
    }

    /// Wrap an error raised while processing `scheme_code`.
    pub fn for_scheme(self, scheme_code: impl Into<String>) -> Self {
        CycleError::SchemeProcessing {
            scheme_code: scheme_code.into(),
            source: Box::new(self),
        }
    }

    /// True for errors that must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CycleError::Configuration(_)
                | CycleError::InvalidParameter { .. }
                | CycleError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_display() {
        let err = CycleError::invalid("returns_window", "must be greater than 1");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'returns_window': must be greater than 1"
        );
    }

    #[test]
    fn test_scheme_processing_wraps_source() {
        let err = CycleError::InsufficientData {
            required: 3,
            actual: 1,
        }
        .for_scheme("119551");
        let display = err.to_string();
        assert!(display.contains("119551"));
        assert!(display.contains("need at least 3 points"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CycleError::Configuration("unknown method".into()).is_fatal());
        assert!(CycleError::invalid("highcut", "must exceed lowcut").is_fatal());
        assert!(!CycleError::model_fit("state_space", "singular").is_fatal());
    }
}
