//! Sample reduction and function evaluation.
//!
//! Converts possibly-weighted, possibly-multi-model posterior samples into
//! a single equally-weighted set per model, then evaluates the user
//! function over the x-grid for every retained sample. The evaluation
//! stage is the expensive part of a reconstruction run, so it goes through
//! the [`Executor`] and is fronted by the exact-equality [`Cache`].

use std::sync::Arc;

use fg_core::{Error, Result};
use fg_compute::{Cache, Executor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The function family `y = f(x; theta)`.
///
/// Applied to the whole x-grid at once: `f(x, theta)` returns one y value
/// per x. Must be deterministic and side-effect-free; may return NaN for
/// out-of-domain input, which propagates as data rather than as an error.
pub type FunctionOfTheta = Arc<dyn Fn(&[f64], &[f64]) -> Vec<f64> + Send + Sync>;

/// Seed for the trimming draw.
///
/// Trimming owns a private generator seeded with this constant, so the
/// operation is bit-reproducible and cannot perturb any randomness the
/// caller holds, on any path.
pub const TRIM_SEED: u64 = 1;

/// Reduce weighted samples to an equally-weighted subset.
///
/// Each row is kept independently with acceptance probability equal to its
/// weight, so the expected number of retained rows is `sum(weights)`.
/// Weights at or above 1 always keep their row; weights at 0 never do.
pub fn trim_samples(samples: &[Vec<f64>], weights: &[f64]) -> Result<Vec<Vec<f64>>> {
    if samples.len() != weights.len() {
        return Err(Error::Validation(format!(
            "length of samples ({}) != length of weights ({})",
            samples.len(),
            weights.len(),
        )));
    }
    let mut rng = StdRng::seed_from_u64(TRIM_SEED);
    let mut kept = Vec::new();
    for (row, &w) in samples.iter().zip(weights.iter()) {
        // One draw per row regardless of outcome keeps row selection
        // independent of the weights of preceding rows.
        let u: f64 = rng.gen();
        if u < w {
            kept.push(row.clone());
        }
    }
    Ok(kept)
}

/// Rescale per-model weight sets for evidence-weighted trimming, in place.
///
/// The sequence is semantic and must stay exactly as ordered:
/// 1. each model's weights are normalized by their sum and scaled by
///    `exp(logZ_m - max(logZ))`;
/// 2. all models are rescaled by the single largest weight anywhere, so
///    every acceptance probability is at most 1;
/// 3. if `ntrim` is given and the total expected retained count exceeds
///    it, every weight is scaled by `ntrim / ntot`.
///
/// Empty weight sets pass through untouched.
pub(crate) fn scale_weights(
    weight_sets: &mut [Vec<f64>],
    logzs: &[f64],
    ntrim: Option<usize>,
) -> Result<()> {
    let max_logz = logzs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for (m, (weights, &logz)) in weight_sets.iter_mut().zip(logzs.iter()).enumerate() {
        if weights.is_empty() {
            continue;
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Err(Error::Validation(format!(
                "weights of model {m} sum to {sum}; expected a positive finite total"
            )));
        }
        let z = (logz - max_logz).exp();
        for w in weights.iter_mut() {
            *w = *w / sum * z;
        }
    }

    let wmax = weight_sets
        .iter()
        .flat_map(|ws| ws.iter().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    if wmax == f64::NEG_INFINITY {
        // Every model is empty; nothing to scale.
        return Ok(());
    }
    for weights in weight_sets.iter_mut() {
        for w in weights.iter_mut() {
            *w /= wmax;
        }
    }

    if let Some(ntrim) = ntrim {
        let ntot: f64 = weight_sets.iter().map(|ws| ws.iter().sum::<f64>()).sum();
        if (ntrim as f64) < ntot {
            let scale = ntrim as f64 / ntot;
            for weights in weight_sets.iter_mut() {
                for w in weights.iter_mut() {
                    *w *= scale;
                }
            }
        }
    }
    Ok(())
}

/// Evaluate each model's function over the x-grid for every sample.
///
/// Returns the function-evaluation matrix of shape
/// `(len(x), total samples)`: entry `[i][j]` is `f(x[i], theta_j)` for the
/// model sample `j` was drawn from, models concatenated along the sample
/// axis in input order. Models with no samples are skipped.
///
/// With a cache, the stored matrix is returned without touching `f` when
/// the stored `(x, samples)` match exactly; cache misses are logged and
/// recomputed, and the fresh result is written back.
pub(crate) fn evaluate_models(
    functions: &[FunctionOfTheta],
    x: &[f64],
    sample_sets: &[Vec<Vec<f64>>],
    executor: &Executor,
    cache: Option<&Cache>,
) -> Result<Vec<Vec<f64>>> {
    let all_samples: Vec<Vec<f64>> = sample_sets.concat();
    if let Some(cache) = cache {
        match cache.check(x, &all_samples) {
            Ok(fsamps) => return Ok(fsamps),
            Err(e) => log::warn!("function-sample cache not used: {e}"),
        }
    }

    let mut fsamps: Vec<Vec<f64>> = vec![Vec::new(); x.len()];
    for (f, samples) in functions.iter().zip(sample_sets.iter()) {
        if samples.is_empty() {
            continue;
        }
        let f = f.clone();
        let rows = executor.apply_rows(
            |theta| {
                let y = f(x, theta);
                if y.len() != x.len() {
                    return Err(Error::Computation(format!(
                        "function returned {} values for {} x points",
                        y.len(),
                        x.len(),
                    )));
                }
                Ok(y)
            },
            samples,
            "f(x|theta)",
        )?;
        for (column, row) in fsamps.iter_mut().zip(transpose(&rows, x.len())) {
            column.extend(row);
        }
    }

    if let Some(cache) = cache {
        if let Err(e) = cache.save(x, &all_samples, &fsamps) {
            log::warn!("function-sample cache not written: {e}");
        }
    }
    Ok(fsamps)
}

/// Transpose a rectangular row matrix of the given width.
pub(crate) fn transpose(rows: &[Vec<f64>], width: usize) -> Vec<Vec<f64>> {
    let mut out: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); width];
    for row in rows {
        for (column, &v) in out.iter_mut().zip(row.iter()) {
            column.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_samples(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64, -(i as f64)]).collect()
    }

    #[test]
    fn test_trim_rejects_length_mismatch() {
        let err = trim_samples(&grid_samples(3), &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_trim_unit_weights_keep_everything() {
        let samples = grid_samples(50);
        let kept = trim_samples(&samples, &vec![1.0; 50]).unwrap();
        assert_eq!(kept, samples);
    }

    #[test]
    fn test_trim_zero_weights_drop_everything() {
        let kept = trim_samples(&grid_samples(50), &vec![0.0; 50]).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_trim_returns_subset_in_order() {
        let samples = grid_samples(500);
        let kept = trim_samples(&samples, &vec![0.4; 500]).unwrap();
        // Every kept row is an input row, and input order is preserved.
        let mut cursor = 0;
        for row in &kept {
            let pos = samples[cursor..].iter().position(|s| s == row);
            let pos = pos.expect("kept row must come from the input");
            cursor += pos + 1;
        }
    }

    #[test]
    fn test_trim_expected_count() {
        // sum(weights) = 1000 out of 2000 rows; the kept count is a
        // Binomial(2000, 0.5) draw, so 4 sigma is ~90 rows.
        let n = 2000;
        let kept = trim_samples(&grid_samples(n), &vec![0.5; n]).unwrap();
        let expected = 1000.0;
        let sigma = (n as f64 * 0.5 * 0.5).sqrt();
        assert!(
            (kept.len() as f64 - expected).abs() < 4.0 * sigma,
            "kept {} rows, expected about {}",
            kept.len(),
            expected,
        );
    }

    #[test]
    fn test_trim_is_reproducible_and_isolated() {
        let samples = grid_samples(300);
        let weights = vec![0.3; 300];
        let first = trim_samples(&samples, &weights).unwrap();

        // Unrelated randomness between calls must not change the draw.
        let mut other = StdRng::seed_from_u64(999);
        let _noise: f64 = other.gen();
        let second = trim_samples(&samples, &weights).unwrap();
        assert_eq!(first, second);

        // And trimming must not advance the caller's generator.
        let mut a = StdRng::seed_from_u64(7);
        let before: f64 = a.gen();
        let mut b = StdRng::seed_from_u64(7);
        let _ = trim_samples(&samples, &weights).unwrap();
        let after: f64 = b.gen();
        assert_eq!(before.to_bits(), after.to_bits());
    }

    #[test]
    fn test_scale_weights_sequencing() {
        let mut sets = vec![vec![2.0, 2.0], vec![1.0, 3.0]];
        let logzs = [0.0, 0.5f64.ln()];
        scale_weights(&mut sets, &logzs, None).unwrap();
        // Normalize + evidence: [0.5, 0.5] and [0.125, 0.375]; then the
        // global maximum 0.5 rescales everything.
        assert_relative_eq!(sets[0][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(sets[0][1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(sets[1][0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(sets[1][1], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_weights_ntrim() {
        let mut sets = vec![vec![2.0, 2.0], vec![1.0, 3.0]];
        let logzs = [0.0, 0.5f64.ln()];
        // ntot after rescaling is 3; ntrim=2 scales everything by 2/3.
        scale_weights(&mut sets, &logzs, Some(2)).unwrap();
        assert_relative_eq!(sets[0][0], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(sets[1][1], 0.5, epsilon = 1e-12);

        // An ntrim above ntot changes nothing.
        let mut unscaled = vec![vec![2.0, 2.0], vec![1.0, 3.0]];
        scale_weights(&mut unscaled, &logzs, Some(100)).unwrap();
        assert_relative_eq!(unscaled[0][0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scale_weights_skips_empty_models() {
        let mut sets = vec![vec![1.0, 1.0], vec![]];
        scale_weights(&mut sets, &[0.0, 0.0], None).unwrap();
        assert_eq!(sets[1].len(), 0);
        assert_relative_eq!(sets[0][0], 1.0, epsilon = 1e-12);

        let mut all_empty: Vec<Vec<f64>> = vec![vec![], vec![]];
        scale_weights(&mut all_empty, &[0.0, 0.0], None).unwrap();
    }

    #[test]
    fn test_scale_weights_rejects_zero_sum() {
        let mut sets = vec![vec![0.0, 0.0]];
        let err = scale_weights(&mut sets, &[0.0], None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    fn linear() -> FunctionOfTheta {
        Arc::new(|x: &[f64], theta: &[f64]| {
            x.iter().map(|&xi| theta[0] * xi + theta[1]).collect()
        })
    }

    #[test]
    fn test_evaluate_models_matrix_layout() {
        let x = vec![-1.0, 0.0, 1.0];
        let samples = vec![vec![1.0, 0.0], vec![2.0, 1.0]];
        let fsamps =
            evaluate_models(&[linear()], &x, &[samples.clone()], &Executor::Serial, None)
                .unwrap();
        assert_eq!(fsamps.len(), 3);
        for (i, &xi) in x.iter().enumerate() {
            for (j, theta) in samples.iter().enumerate() {
                assert_relative_eq!(fsamps[i][j], theta[0] * xi + theta[1], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_evaluate_models_concatenates_and_skips_empty() {
        let x = vec![0.0, 2.0];
        let set_a = vec![vec![1.0, 0.0]];
        let set_b: Vec<Vec<f64>> = Vec::new();
        let set_c = vec![vec![0.0, 5.0], vec![0.0, 6.0]];
        let fsamps = evaluate_models(
            &[linear(), linear(), linear()],
            &x,
            &[set_a, set_b, set_c],
            &Executor::Serial,
            None,
        )
        .unwrap();
        assert_eq!(fsamps[0], vec![0.0, 5.0, 6.0]);
        assert_eq!(fsamps[1], vec![2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_evaluate_models_rejects_wrong_output_length() {
        let bad: FunctionOfTheta = Arc::new(|_x: &[f64], _theta: &[f64]| vec![0.0]);
        let err = evaluate_models(
            &[bad],
            &[0.0, 1.0],
            &[vec![vec![1.0]]],
            &Executor::Serial,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Computation(_)));
    }

    #[test]
    fn test_evaluate_models_cache_hit_skips_function() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("fsamps").to_str().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let counting: FunctionOfTheta = {
            let calls = calls.clone();
            Arc::new(move |x: &[f64], theta: &[f64]| {
                calls.fetch_add(1, Ordering::Relaxed);
                x.iter().map(|&xi| theta[0] * xi).collect()
            })
        };
        let x = vec![1.0, 2.0];
        let sets = vec![vec![vec![3.0], vec![4.0]]];

        let first =
            evaluate_models(&[counting.clone()], &x, &sets, &Executor::Serial, Some(&cache))
                .unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        let second =
            evaluate_models(&[counting], &x, &sets, &Executor::Serial, Some(&cache)).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2, "cache hit must not call f");
        assert_eq!(first, second);
    }

    #[test]
    fn test_transpose() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let t = transpose(&rows, 3);
        assert_eq!(t, vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
        assert_eq!(transpose(&[], 2), vec![Vec::<f64>::new(), Vec::new()]);
    }
}
