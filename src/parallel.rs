//! Conditional parallel iteration.
//!
//! With the `parallel` feature, [`iter_maybe_parallel!`] turns its argument
//! into a rayon parallel iterator; without it, into a plain sequential
//! iterator. Callers write one iterator chain for both builds.
//!
//! ```ignore
//! use crate::iter_maybe_parallel;
//!
//! let results: Vec<_> = iter_maybe_parallel!(universe)
//!     .map(|nav| pipeline.analyze_scheme(nav))
//!     .collect();
//! ```
//!
//! Parallel `collect` keeps the input order, so downstream merges see the
//! same sequence in both builds.

/// Conditionally parallel `into_iter`.
///
/// Uses `into_par_iter()` with the `parallel` feature and `into_iter()`
/// otherwise. Works for ranges, owned vectors and slices.
#[macro_export]
macro_rules! iter_maybe_parallel {
    ($expr:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::iter::IntoParallelIterator;

            IntoParallelIterator::into_par_iter($expr)
        }
        #[cfg(not(feature = "parallel"))]
        {
            IntoIterator::into_iter($expr)
        }
    }};
}

pub use iter_maybe_parallel;
