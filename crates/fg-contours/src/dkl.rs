//! Kullback-Leibler divergence between posterior and prior reconstructions.
//!
//! For each x, the posterior and prior function-value columns each define
//! a density; the divergence is estimated as the mean log-density ratio
//! over the posterior column's values, with each density fitted by the
//! Gaussian KDE.

use fg_core::{Density, Error, Result};
use fg_compute::{Cache, Executor};

use crate::kde::GaussianKde;

/// Per-x divergence between posterior and prior function-value matrices.
///
/// `fsamps` and `prior_fsamps` must both have one row per x value; row
/// widths may differ between the two (different retained sample counts).
/// NaN entries are dropped per column; a column left empty is
/// [`Error::DegenerateColumn`]. Cached under `(x, zipped columns)`.
pub fn compute_dkl(
    x: &[f64],
    fsamps: &[Vec<f64>],
    prior_fsamps: &[Vec<f64>],
    executor: &Executor,
    cache: Option<&Cache>,
) -> Result<Vec<f64>> {
    if fsamps.len() != x.len() || prior_fsamps.len() != x.len() {
        return Err(Error::Validation(format!(
            "x has {} points but fsamps has {} rows and prior fsamps {}",
            x.len(),
            fsamps.len(),
            prior_fsamps.len(),
        )));
    }
    let nsamp = fsamps.first().map_or(0, Vec::len);
    for (i, row) in fsamps.iter().enumerate() {
        if row.len() != nsamp {
            return Err(Error::Validation(format!(
                "fsamps row {} has {} entries but row 0 has {}",
                i,
                row.len(),
                nsamp,
            )));
        }
    }
    let nprior = prior_fsamps.first().map_or(0, Vec::len);
    for (i, row) in prior_fsamps.iter().enumerate() {
        if row.len() != nprior {
            return Err(Error::Validation(format!(
                "prior fsamps row {} has {} entries but row 0 has {}",
                i,
                row.len(),
                nprior,
            )));
        }
    }

    // Zip the posterior and prior columns into one fixed-width row per x so
    // a single pass through the executor covers both.
    let rows: Vec<Vec<f64>> = fsamps
        .iter()
        .zip(prior_fsamps.iter())
        .map(|(post, prior)| {
            let mut row = Vec::with_capacity(nsamp + nprior);
            row.extend_from_slice(post);
            row.extend_from_slice(prior);
            row
        })
        .collect();

    if let Some(cache) = cache {
        match cache.check(x, &rows) {
            Ok(stored) => {
                if let Some(dkls) = stored.into_iter().next() {
                    return Ok(dkls);
                }
            }
            Err(e) => log::warn!("divergence cache not used: {e}"),
        }
    }

    let out = executor.apply_rows(
        |row| {
            let (post, prior) = row.split_at(nsamp);
            Ok(vec![column_dkl(post, prior)?])
        },
        &rows,
        "dkl",
    )?;
    let dkls: Vec<f64> = out.into_iter().map(|row| row[0]).collect();

    if let Some(cache) = cache {
        if let Err(e) = cache.save(x, &rows, &[dkls.clone()]) {
            log::warn!("divergence cache not written: {e}");
        }
    }
    Ok(dkls)
}

/// Divergence of one posterior column from its prior column.
fn column_dkl(post: &[f64], prior: &[f64]) -> Result<f64> {
    let post: Vec<f64> = post.iter().copied().filter(|v| v.is_finite()).collect();
    let prior: Vec<f64> = prior.iter().copied().filter(|v| v.is_finite()).collect();
    if post.is_empty() {
        return Err(Error::DegenerateColumn(
            "posterior column has no finite values".into(),
        ));
    }
    if prior.is_empty() {
        return Err(Error::DegenerateColumn("prior column has no finite values".into()));
    }
    let post_kde = GaussianKde::fit(&post)?;
    let prior_kde = GaussianKde::fit(&prior)?;

    let total: f64 =
        post.iter().map(|&s| post_kde.log_pdf(s) - prior_kde.log_pdf(s)).sum();
    Ok(total / post.len() as f64)
}
