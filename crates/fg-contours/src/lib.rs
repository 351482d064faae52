//! # fg-contours
//!
//! Grids for function reconstruction plots.
//!
//! Given a posterior distribution over parameters theta described by
//! samples, an independent variable x and a function family
//! `y = f(x; theta)`, the quantity of interest at each grid point is not
//! the predictive density
//!
//! ```text
//! P(y|x) = integral dirac(y - f(x; theta)) P(theta) dtheta
//! ```
//!
//! but the iso-probability posterior mass
//!
//! ```text
//!              /
//! m(y|x)  =    |  P(y'|x) dy'
//!              /
//!         P(y'|x) < P(y|x)
//! ```
//!
//! the fraction of mass outside the iso-probability contour through
//! `(x, y)`. Unlike the raw density, this is calibrated identically at
//! every x, which is what makes reconstructed-function uncertainty bands
//! comparable across the plot.
//!
//! ## Example
//!
//! ```
//! use fg_contours::{compute_contours, ContourConfig, Model};
//!
//! // A straight line y = m*x + c with theta = (m, c).
//! let f = |x: &[f64], theta: &[f64]| -> Vec<f64> {
//!     x.iter().map(|&xi| theta[0] * xi + theta[1]).collect()
//! };
//!
//! // Posterior samples of (m, c); any sampler output works here.
//! let samples: Vec<Vec<f64>> = (0..300)
//!     .map(|i| {
//!         let t = i as f64 / 299.0;
//!         let s = (i as f64 * 0.754877).fract();
//!         vec![0.9 + 0.2 * t, -0.1 + 0.2 * s]
//!     })
//!     .collect();
//!
//! let x: Vec<f64> = (0..20).map(|i| -2.0 + i as f64 * 0.2).collect();
//! let grid = compute_contours(&[Model::new(f, samples)], &x, &ContourConfig::default())
//!     .unwrap();
//!
//! assert_eq!(grid.z.len(), grid.y.len());
//! assert!(grid.z.iter().flatten().all(|m| (0.0..=1.0).contains(m)));
//! ```
//!
//! The mass grid feeds straight into any contour or image renderer.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Chain-file sample source.
pub mod chains;
/// Orchestration entry points and configuration.
pub mod contours;
/// Kullback-Leibler divergence between reconstructions.
pub mod dkl;
/// Gaussian kernel density estimation.
pub mod kde;
/// The probability mass transform.
pub mod mass;
/// Sample reduction and function evaluation.
pub mod samples;

pub use chains::{samples_from_chain_root, samples_from_chains};
pub use contours::{
    compute_contours, compute_kullback_leibler, compute_samples, ContourConfig, DklConfig,
    KlInput, Model, SamplesConfig,
};
pub use dkl::compute_dkl;
pub use kde::{GaussianKde, ScottKde};
pub use mass::{compute_masses, Pmf, MIN_PMF_SAMPLES};
pub use samples::{trim_samples, FunctionOfTheta, TRIM_SEED};
