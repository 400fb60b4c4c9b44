//! Date-indexed NAV series.
//!
//! [`NavSeries`] carries one fund's observations together with its scheme
//! code. Dates are strictly increasing and values finite; the type is
//! immutable once constructed.

use crate::error::{CycleError, Result};
use chrono::NaiveDate;

/// Ordered (date, value) observations for one scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct NavSeries {
    scheme_code: String,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl NavSeries {
    /// Create a validated series.
    ///
    /// Fails with [`CycleError::InvalidParameter`] when the inputs are empty,
    /// differ in length, contain non-finite values, or the dates are not
    /// strictly increasing.
    pub fn new(
        scheme_code: impl Into<String>,
        dates: Vec<NaiveDate>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let scheme_code = scheme_code.into();
        if dates.len() != values.len() {
            return Err(CycleError::invalid(
                "values",
                format!(
                    "length {} does not match {} dates",
                    values.len(),
                    dates.len()
                ),
            ));
        }
        if dates.is_empty() {
            return Err(CycleError::invalid(
                "dates",
                "series requires at least one observation",
            ));
        }
        if let Some(pos) = dates.windows(2).position(|w| w[1] <= w[0]) {
            return Err(CycleError::invalid(
                "dates",
                format!("dates must be strictly increasing (at {})", dates[pos + 1]),
            ));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(CycleError::invalid(
                "values",
                format!("non-finite value at {}", dates[pos]),
            ));
        }
        Ok(Self {
            scheme_code,
            dates,
            values,
        })
    }

    /// Build a series from (date, value) pairs.
    pub fn from_pairs(
        scheme_code: impl Into<String>,
        pairs: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Result<Self> {
        let (dates, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::new(scheme_code, dates, values)
    }

    /// Scheme identifier.
    pub fn scheme_code(&self) -> &str {
        &self.scheme_code
    }

    /// Observation dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Observation values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of observations.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a constructed series; provided for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Last observation date.
    pub fn last_date(&self) -> NaiveDate {
        // Non-empty by construction.
        self.dates[self.dates.len() - 1]
    }

    /// True when every value is strictly positive.
    pub fn all_positive(&self) -> bool {
        self.values.iter().all(|&v| v > 0.0)
    }

    /// Natural logarithm of the values, or `None` if any value is not positive.
    pub fn log_values(&self) -> Option<Vec<f64>> {
        if self.all_positive() {
            Some(self.values.iter().map(|v| v.ln()).collect())
        } else {
            None
        }
    }

    /// Position of `date` in the index.
    pub fn position_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }
}

/// Whole calendar months from `earlier` to `later` (negative if `later` precedes `earlier`).
pub fn months_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    use chrono::Datelike;
    let a = earlier.year() as i64 * 12 + earlier.month0() as i64;
    let b = later.year() as i64 * 12 + later.month0() as i64;
    b - a
}

/// `n` consecutive month-end dates starting with the month containing `first`.
pub fn month_end_dates(first: NaiveDate, n: usize) -> Vec<NaiveDate> {
    use chrono::{Datelike, Months};
    let Some(month_start) = first.with_day(1) else {
        return Vec::new();
    };
    (1..=n as u32)
        .map_while(|i| {
            month_start
                .checked_add_months(Months::new(i))
                .and_then(|next| next.pred_opt())
        })
        .collect()
}
