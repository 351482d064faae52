//! Orchestration: from models and samples to mass grids and divergences.
//!
//! Entry points validate every shape up front and fail with descriptive
//! errors before any expensive work begins. Options live in closed config
//! structs with defaults; there is no open-ended option bag.

use fg_core::{DklCurve, Error, MassGrid, Result};
use fg_compute::{Cache, Executor};

use crate::dkl;
use crate::mass;
use crate::samples::{self, FunctionOfTheta};

/// One member of a model mixture: a function family, its posterior
/// samples, optional weights and a log-evidence.
#[derive(Clone)]
pub struct Model {
    f: FunctionOfTheta,
    samples: Vec<Vec<f64>>,
    weights: Option<Vec<f64>>,
    logz: f64,
}

impl Model {
    /// Create a model from a function family and its theta samples.
    ///
    /// `samples` is one row per posterior draw; rows share the parameter
    /// vector length. Weights default to 1 and the log-evidence to 0.
    pub fn new<F>(f: F, samples: Vec<Vec<f64>>) -> Self
    where
        F: Fn(&[f64], &[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        Self { f: std::sync::Arc::new(f), samples, weights: None, logz: 0.0 }
    }

    /// Attach per-sample weights (same length as the sample rows).
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Attach a log-evidence for multi-model mixing.
    pub fn with_logz(mut self, logz: f64) -> Self {
        self.logz = logz;
        self
    }

    /// Number of posterior draws.
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Log-evidence of this model.
    pub fn logz(&self) -> f64 {
        self.logz
    }

    fn validate(&self, index: usize) -> Result<()> {
        let width = self.samples.first().map_or(0, Vec::len);
        for (i, row) in self.samples.iter().enumerate() {
            if row.len() != width {
                return Err(Error::Validation(format!(
                    "model {index}: sample row {i} has {} parameters but row 0 has {width}",
                    row.len(),
                )));
            }
        }
        if let Some(weights) = &self.weights {
            if weights.len() != self.samples.len() {
                return Err(Error::Validation(format!(
                    "model {index}: length of samples ({}) != length of weights ({})",
                    self.samples.len(),
                    weights.len(),
                )));
            }
            if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(Error::Validation(format!(
                    "model {index}: weights must be finite and non-negative, found {w}"
                )));
            }
        }
        Ok(())
    }

    fn weight_vector(&self) -> Vec<f64> {
        match &self.weights {
            Some(w) => w.clone(),
            None => vec![1.0; self.samples.len()],
        }
    }
}

/// Options for [`compute_samples`].
#[derive(Debug, Clone)]
pub struct SamplesConfig {
    /// Target expected sample count after trimming, if any.
    pub ntrim: Option<usize>,
    /// Execution backend.
    pub executor: Executor,
    /// Cache identifier root, if caching is wanted.
    pub cache: Option<String>,
}

impl Default for SamplesConfig {
    fn default() -> Self {
        Self { ntrim: None, executor: Executor::Serial, cache: None }
    }
}

/// Options for [`compute_contours`].
#[derive(Debug, Clone)]
pub struct ContourConfig {
    /// Target expected sample count after trimming.
    pub ntrim: Option<usize>,
    /// y-grid resolution when the grid is derived from the evaluations.
    pub ny: usize,
    /// Explicit y-grid; overrides `ny` when supplied.
    pub y: Option<Vec<f64>>,
    /// Execution backend.
    pub executor: Executor,
    /// Cache identifier root, if caching is wanted.
    pub cache: Option<String>,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            ntrim: Some(100_000),
            ny: 100,
            y: None,
            executor: Executor::Serial,
            cache: None,
        }
    }
}

/// Options for [`compute_kullback_leibler`].
#[derive(Debug, Clone)]
pub struct DklConfig {
    /// Target expected sample count after trimming, if any.
    pub ntrim: Option<usize>,
    /// Execution backend.
    pub executor: Executor,
    /// Cache identifier root, if caching is wanted.
    pub cache: Option<String>,
}

impl Default for DklConfig {
    fn default() -> Self {
        Self { ntrim: None, executor: Executor::Serial, cache: None }
    }
}

/// A model paired with prior samples for divergence computation.
#[derive(Clone)]
pub struct KlInput {
    model: Model,
    prior_samples: Vec<Vec<f64>>,
    prior_weights: Option<Vec<f64>>,
}

impl KlInput {
    /// Pair a model with samples drawn from its prior.
    pub fn new(model: Model, prior_samples: Vec<Vec<f64>>) -> Self {
        Self { model, prior_samples, prior_weights: None }
    }

    /// Attach weights for the prior samples.
    pub fn with_prior_weights(mut self, weights: Vec<f64>) -> Self {
        self.prior_weights = Some(weights);
        self
    }
}

/// Reduce samples and evaluate every model over the x-grid.
///
/// Returns the function-evaluation matrix of shape
/// `(len(x), total retained samples)`. This is the expensive stage; with
/// `config.cache` set it is fronted by the exact-equality cache under the
/// `_fsamps` suffix.
pub fn compute_samples(
    models: &[Model],
    x: &[f64],
    config: &SamplesConfig,
) -> Result<Vec<Vec<f64>>> {
    validate_inputs(models, x)?;

    let mut weight_sets: Vec<Vec<f64>> = models.iter().map(Model::weight_vector).collect();
    let logzs: Vec<f64> = models.iter().map(Model::logz).collect();
    samples::scale_weights(&mut weight_sets, &logzs, config.ntrim)?;

    let mut trimmed = Vec::with_capacity(models.len());
    for (model, weights) in models.iter().zip(weight_sets.iter()) {
        trimmed.push(samples::trim_samples(&model.samples, weights)?);
    }

    let functions: Vec<FunctionOfTheta> = models.iter().map(|m| m.f.clone()).collect();
    let cache = stage_cache(&config.cache, "_fsamps");
    samples::evaluate_models(&functions, x, &trimmed, &config.executor, cache.as_ref())
}

/// Compute the full reconstruction grid: x, y and the mass matrix.
pub fn compute_contours(
    models: &[Model],
    x: &[f64],
    config: &ContourConfig,
) -> Result<MassGrid> {
    validate_inputs(models, x)?;
    match &config.y {
        Some(y) if y.is_empty() => {
            return Err(Error::Validation("explicit y grid must not be empty".into()));
        }
        None if config.ny < 2 => {
            return Err(Error::Validation(format!(
                "ny must be at least 2 to span a y grid, got {}",
                config.ny,
            )));
        }
        _ => {}
    }

    let samples_config = SamplesConfig {
        ntrim: config.ntrim,
        executor: config.executor.clone(),
        cache: config.cache.clone(),
    };
    let fsamps = compute_samples(models, x, &samples_config)?;

    let y = match &config.y {
        Some(y) => y.clone(),
        None => derive_y_grid(&fsamps, config.ny)?,
    };

    let cache = stage_cache(&config.cache, "_masses");
    let z = mass::compute_masses(&fsamps, &y, &config.executor, cache.as_ref())?;
    MassGrid::new(x.to_vec(), y, z)
}

/// Compute the per-x divergence of each posterior from its prior, mixed
/// across models by normalized evidence weight.
pub fn compute_kullback_leibler(
    inputs: &[KlInput],
    x: &[f64],
    config: &DklConfig,
) -> Result<DklCurve> {
    if inputs.is_empty() {
        return Err(Error::Validation("at least one model is required".into()));
    }
    for (m, input) in inputs.iter().enumerate() {
        input.model.validate(m)?;
        prior_as_model(input).validate(m)?;
    }
    validate_x(x)?;

    // Each model's samples are reduced independently; evidence enters only
    // in the final mixing.
    let mut curves: Vec<Vec<f64>> = Vec::with_capacity(inputs.len());
    for (m, input) in inputs.iter().enumerate() {
        let root = config.cache.as_ref().map(|c| format!("{c}_{m}"));
        let posterior = Model { logz: 0.0, ..input.model.clone() };

        let fsamps = compute_samples(
            &[posterior],
            x,
            &SamplesConfig {
                ntrim: config.ntrim,
                executor: config.executor.clone(),
                cache: root.clone(),
            },
        )?;
        let prior_fsamps = compute_samples(
            &[prior_as_model(input)],
            x,
            &SamplesConfig {
                ntrim: config.ntrim,
                executor: config.executor.clone(),
                cache: root.as_ref().map(|r| format!("{r}_prior")),
            },
        )?;

        let cache = stage_cache(&root, "_dkl");
        curves.push(dkl::compute_dkl(
            x,
            &fsamps,
            &prior_fsamps,
            &config.executor,
            cache.as_ref(),
        )?);
    }

    // Mix by normalized evidence weight.
    let logzs: Vec<f64> = inputs.iter().map(|i| i.model.logz).collect();
    let max_logz = logzs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut zs: Vec<f64> = logzs.iter().map(|&l| (l - max_logz).exp()).collect();
    let total: f64 = zs.iter().sum();
    for z in zs.iter_mut() {
        *z /= total;
    }

    let mixed: Vec<f64> = (0..x.len())
        .map(|i| curves.iter().zip(zs.iter()).map(|(c, &z)| z * c[i]).sum())
        .collect();
    DklCurve::new(x.to_vec(), mixed)
}

/// A prior sample set viewed as a model sharing the posterior's function.
fn prior_as_model(input: &KlInput) -> Model {
    Model {
        f: input.model.f.clone(),
        samples: input.prior_samples.clone(),
        weights: input.prior_weights.clone(),
        logz: 0.0,
    }
}

fn validate_inputs(models: &[Model], x: &[f64]) -> Result<()> {
    if models.is_empty() {
        return Err(Error::Validation("at least one model is required".into()));
    }
    for (m, model) in models.iter().enumerate() {
        model.validate(m)?;
    }
    validate_x(x)
}

fn validate_x(x: &[f64]) -> Result<()> {
    if x.is_empty() {
        return Err(Error::Validation("x grid must not be empty".into()));
    }
    if let Some(bad) = x.iter().find(|v| !v.is_finite()) {
        return Err(Error::Validation(format!("x grid must be finite, found {bad}")));
    }
    Ok(())
}

fn stage_cache(root: &Option<String>, suffix: &str) -> Option<Cache> {
    root.as_ref().map(|r| Cache::new(&format!("{r}{suffix}")))
}

/// y-grid spanning the finite range of the evaluations, `ny` points.
fn derive_y_grid(fsamps: &[Vec<f64>], ny: usize) -> Result<Vec<f64>> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for column in fsamps {
        for &v in column {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
    }
    if !lo.is_finite() || !hi.is_finite() {
        return Err(Error::Computation(
            "function evaluations contain no finite values to span a y grid".into(),
        ));
    }
    let step = (hi - lo) / (ny - 1) as f64;
    Ok((0..ny).map(|i| lo + step * i as f64).collect())
}
