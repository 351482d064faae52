//! # fg-core
//!
//! Core definitions shared by the fgrid crates: the error type, the
//! serializable result artifacts, and the density-estimation seam.
//!
//! Higher-level crates (`fg-compute`, `fg-contours`) depend on the traits
//! defined here rather than on each other's concrete types.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error and result types.
pub mod error;
/// Density estimation traits.
pub mod traits;
/// Serializable artifact types.
pub mod types;

pub use error::{Error, Result};
pub use traits::{Density, DensityEstimator};
pub use types::{DklCurve, MassGrid};
