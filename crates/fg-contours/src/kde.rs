//! Gaussian kernel density estimation.
//!
//! One-dimensional KDE with a Gaussian kernel and Scott's-rule bandwidth,
//! the default estimator behind the [`DensityEstimator`] seam. The mass
//! transform only ever sees the trait, so swapping in a different
//! estimator is a one-line change for callers.

use fg_core::{Density, DensityEstimator, Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Gaussian kernel density estimate over a set of observed values.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Fit with Scott's-rule bandwidth: `sigma * n^(-1/5)`.
    ///
    /// Fails with [`Error::DegenerateColumn`] when fewer than two values
    /// are supplied or the values have zero variance.
    pub fn fit(samples: &[f64]) -> Result<Self> {
        let n = samples.len();
        if n < 2 {
            return Err(Error::DegenerateColumn(format!(
                "need at least two values to fit a density, got {n}"
            )));
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
        if var <= 0.0 {
            return Err(Error::DegenerateColumn(format!(
                "all {n} values equal {mean}; the density estimate is degenerate"
            )));
        }
        let bandwidth = var.sqrt() * (n as f64).powf(-0.2);
        Self::with_bandwidth(samples, bandwidth)
    }

    /// Fit with an explicit bandwidth.
    pub fn with_bandwidth(samples: &[f64], bandwidth: f64) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::DegenerateColumn(
                "cannot fit a density to an empty sample set".into(),
            ));
        }
        if !bandwidth.is_finite() || bandwidth <= 0.0 {
            return Err(Error::Validation(format!(
                "bandwidth must be finite and positive, got {bandwidth}"
            )));
        }
        Ok(Self { samples: samples.to_vec(), bandwidth })
    }

    /// The kernel bandwidth.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Number of values the estimate was fitted to.
    pub fn n(&self) -> usize {
        self.samples.len()
    }
}

impl Density for GaussianKde {
    fn pdf(&self, t: f64) -> f64 {
        self.log_pdf(t).exp()
    }

    fn log_pdf(&self, t: f64) -> f64 {
        if !t.is_finite() {
            return f64::NEG_INFINITY;
        }
        let h = self.bandwidth;
        let n = self.samples.len() as f64;
        let log_norm = -n.ln() - h.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln();

        // log-sum-exp over the kernel contributions.
        let terms: Vec<f64> = self
            .samples
            .iter()
            .map(|s| {
                let z = (t - s) / h;
                -0.5 * z * z
            })
            .collect();
        let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let sum: f64 = terms.iter().map(|term| (term - max).exp()).sum();
        max + sum.ln() + log_norm
    }

    fn resample(&self, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, self.bandwidth).expect("bandwidth is positive");
        (0..n)
            .map(|_| {
                let idx = rng.gen_range(0..self.samples.len());
                self.samples[idx] + noise.sample(&mut rng)
            })
            .collect()
    }
}

/// Scott's-rule Gaussian KDE as a pluggable estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScottKde;

impl DensityEstimator for ScottKde {
    fn fit(&self, samples: &[f64]) -> Result<Box<dyn Density>> {
        Ok(Box::new(GaussianKde::fit(samples)?))
    }
}
