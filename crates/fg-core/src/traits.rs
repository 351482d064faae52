//! Core traits for fgrid
//!
//! The probability mass transform consumes a density estimate through the
//! [`Density`] / [`DensityEstimator`] pair, so the transform logic never
//! depends on a concrete estimator implementation.

use crate::Result;

/// A fitted one-dimensional probability density.
pub trait Density: Send + Sync {
    /// Density at `t`.
    fn pdf(&self, t: f64) -> f64;

    /// Log-density at `t`. Returns `-inf` where the density vanishes.
    fn log_pdf(&self, t: f64) -> f64;

    /// Draw `n` fresh values from the fitted density.
    ///
    /// Sampling is seeded so repeated calls are reproducible.
    fn resample(&self, n: usize, seed: u64) -> Vec<f64>;
}

/// Fits a [`Density`] to a set of observed values.
pub trait DensityEstimator: Send + Sync {
    /// Fit a density to `samples`.
    ///
    /// Fails with [`crate::Error::DegenerateColumn`] when the sample set
    /// cannot support a fit (empty, or zero variance).
    fn fit(&self, samples: &[f64]) -> Result<Box<dyn Density>>;
}
