//! Execution mode selection and the order-preserving apply contract.
//!
//! The three backends are interchangeable behind [`Executor::apply_rows`]:
//! for any pure `f`, the result equals `rows.map(f)` in input order. Which
//! backend runs it is a caller-supplied mode, never auto-detected, and the
//! two parallelism axes (thread pool, process group) are never nested.

use std::sync::Arc;

use fg_core::{Error, Result};
use rayon::prelude::*;

use crate::distributed::{distributed_apply, Communicator};
use crate::progress::Progress;

/// Environment variable consulted for the thread-pool worker count when no
/// explicit count is supplied.
pub const ENV_WORKERS: &str = "FGRID_NUM_THREADS";

/// Execution backend for row-wise function application.
#[derive(Clone, Default)]
pub enum Executor {
    /// Apply in a plain loop on the calling thread.
    #[default]
    Serial,
    /// Apply over a shared-memory worker pool.
    ///
    /// `workers: Some(n)` forces a pool of `n` threads; `None` reads the
    /// count from [`ENV_WORKERS`] and fails with a configuration error if
    /// the variable is unset or meaningless.
    Threads {
        /// Explicit worker count, or `None` to use the environment hint.
        workers: Option<usize>,
    },
    /// Scatter rows across a fixed group of cooperating processes.
    Mpi(Arc<dyn Communicator>),
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Executor::Serial => write!(f, "Serial"),
            Executor::Threads { workers } => write!(f, "Threads {{ workers: {:?} }}", workers),
            Executor::Mpi(comm) => {
                write!(f, "Mpi {{ rank: {}, size: {} }}", comm.rank(), comm.size())
            }
        }
    }
}

impl Executor {
    /// Apply `f` to every row, preserving input order.
    ///
    /// `f` must be pure: deterministic and free of side effects. Errors
    /// from `f` abort the call and propagate unmodified. `label` names the
    /// computation in the progress line rendered by the driving process.
    pub fn apply_rows<F>(&self, f: F, rows: &[Vec<f64>], label: &str) -> Result<Vec<Vec<f64>>>
    where
        F: Fn(&[f64]) -> Result<Vec<f64>> + Sync,
    {
        match self {
            Executor::Serial => {
                let progress = Progress::new(label, rows.len());
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    out.push(f(row)?);
                    progress.tick();
                }
                progress.finish();
                Ok(out)
            }
            Executor::Threads { workers } => {
                let nworkers = resolve_workers(*workers)?;
                if nworkers == 1 {
                    log::warn!(
                        "thread-pool execution requested but effective worker count is 1"
                    );
                }
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(nworkers)
                    .build()
                    .map_err(|e| Error::Config(format!("failed to build worker pool: {e}")))?;

                let progress = Progress::new(label, rows.len());
                let results: Vec<Result<Vec<f64>>> = pool.install(|| {
                    rows.par_iter()
                        .map(|row| {
                            let out = f(row);
                            progress.tick();
                            out
                        })
                        .collect()
                });
                progress.finish();
                results.into_iter().collect()
            }
            Executor::Mpi(comm) => distributed_apply(comm.as_ref(), &f, rows, label),
        }
    }
}

/// Resolve the worker count from an explicit request or the environment.
fn resolve_workers(explicit: Option<usize>) -> Result<usize> {
    if let Some(n) = explicit {
        if n == 0 {
            return Err(Error::Config("explicit worker count must be at least 1".into()));
        }
        return Ok(n);
    }
    let raw = std::env::var(ENV_WORKERS).map_err(|_| {
        Error::Config(format!(
            "thread-pool execution requested but {ENV_WORKERS} is not set"
        ))
    })?;
    let n: usize = raw.trim().parse().map_err(|_| {
        Error::Config(format!("{ENV_WORKERS}={raw:?} is not a valid worker count"))
    })?;
    if n == 0 {
        return Err(Error::Config(format!("{ENV_WORKERS}={raw:?} must be at least 1")));
    }
    Ok(n)
}
