//! Probability mass transform.
//!
//! A cloud of function values at fixed x defines a density P(t). For a
//! reconstruction plot we want, for each candidate y, the posterior mass
//! lying outside the iso-probability contour through y:
//!
//! ```text
//!             /
//! m(y)  =    |  P(t) dt
//!             /
//!        P(t) < P(y)
//! ```
//!
//! which is 1 at the most probable value and falls to 0 in the tails. The
//! transform estimates m by ranking density values over a (possibly
//! augmented) sorted sample of the column: the average rank of P(t),
//! divided by the sample count, estimates the mass of the region with
//! lower density. This rank calibration is deliberately approximate — it
//! is monotone in rank-of-density rather than an exact CDF inversion, and
//! is comparable across columns as long as the estimator settings are held
//! fixed.

use fg_core::{Density, DensityEstimator, Error, Result};
use fg_compute::{Cache, Executor};

use crate::kde::ScottKde;
use crate::samples::transpose;

/// Minimum column size for a stable tail-rank estimate.
///
/// Columns shorter than this are replaced by this many fresh draws from
/// the fitted density before ranking.
pub const MIN_PMF_SAMPLES: usize = 1000;

/// Seed for the density-augmentation draw of short columns.
const RESAMPLE_SEED: u64 = 42;

/// The mass transform for one function-value column.
///
/// Built once per column, then evaluated at arbitrary y. Evaluation is a
/// bounds-safe interpolation: outside the observed range the mass is 0.
pub struct Pmf {
    ts: Vec<f64>,
    log_mass: Vec<f64>,
}

impl Pmf {
    /// Build the transform with the default Scott's-rule KDE.
    pub fn new(column: &[f64]) -> Result<Self> {
        Self::with_estimator(column, &ScottKde)
    }

    /// Build the transform with a caller-supplied density estimator.
    ///
    /// Non-finite values are dropped before fitting. A column that is
    /// empty after dropping, or constant, fails with
    /// [`Error::DegenerateColumn`] rather than producing silent zeros.
    pub fn with_estimator(column: &[f64], estimator: &dyn DensityEstimator) -> Result<Self> {
        let finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(Error::DegenerateColumn(format!(
                "column has no finite values ({} entries)",
                column.len(),
            )));
        }
        let density = estimator.fit(&finite)?;

        let mut ts = if finite.len() < MIN_PMF_SAMPLES {
            density.resample(MIN_PMF_SAMPLES, RESAMPLE_SEED)
        } else {
            finite
        };
        ts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let ps: Vec<f64> = ts.iter().map(|&t| density.pdf(t)).collect();
        let ranks = average_ranks(&ps);
        let n = ts.len() as f64;
        let log_mass: Vec<f64> = ranks.iter().map(|r| (r / n).ln()).collect();

        Ok(Self { ts, log_mass })
    }

    /// Mass at `y`, in `[0, 1]`.
    pub fn evaluate(&self, y: f64) -> f64 {
        self.log_mass_at(y).exp()
    }

    /// Mass at each value of `ys`.
    pub fn evaluate_many(&self, ys: &[f64]) -> Vec<f64> {
        ys.iter().map(|&y| self.evaluate(y)).collect()
    }

    fn log_mass_at(&self, y: f64) -> f64 {
        let ts = &self.ts;
        let last = ts[ts.len() - 1];
        if !y.is_finite() || y < ts[0] || y > last {
            return f64::NEG_INFINITY;
        }
        let idx = ts.partition_point(|&t| t < y);
        if ts[idx] == y {
            return self.log_mass[idx];
        }
        let (t0, t1) = (ts[idx - 1], ts[idx]);
        let (m0, m1) = (self.log_mass[idx - 1], self.log_mass[idx]);
        let f = (y - t0) / (t1 - t0);
        m0 + f * (m1 - m0)
    }
}

/// 1-based ranks with ties assigned their average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0usize;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let rank = 0.5 * ((i + 1) as f64 + j as f64);
        for &k in &order[i..j] {
            ranks[k] = rank;
        }
        i = j;
    }
    ranks
}

/// Build the mass grid from a function-evaluation matrix.
///
/// `fsamps` has one row per x value; each row becomes its own [`Pmf`],
/// evaluated over the y-grid through the executor. The result has shape
/// `(len(y), len(x))`. Cached under the supplied cache keyed on
/// `(y, fsamps)`; cache failures are logged and recomputed.
pub fn compute_masses(
    fsamps: &[Vec<f64>],
    y: &[f64],
    executor: &Executor,
    cache: Option<&Cache>,
) -> Result<Vec<Vec<f64>>> {
    if y.is_empty() {
        return Err(Error::Validation("y grid must not be empty".into()));
    }
    if let Some(cache) = cache {
        match cache.check(y, fsamps) {
            Ok(z) => return Ok(z),
            Err(e) => log::warn!("mass cache not used: {e}"),
        }
    }

    let columns = executor.apply_rows(
        |column| {
            let pmf = Pmf::new(column)?;
            Ok(pmf.evaluate_many(y))
        },
        fsamps,
        "masses",
    )?;
    let z = transpose(&columns, y.len());

    if let Some(cache) = cache {
        if let Err(e) = cache.save(y, fsamps, &z) {
            log::warn!("mass cache not written: {e}");
        }
    }
    Ok(z)
}
