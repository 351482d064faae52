//! Exact-equality result cache.
//!
//! Persists `(x, samples, result)` triples for expensive matrix
//! computations. A hit requires the stored inputs to be element-wise
//! bit-identical to the requested ones; there is no hashing shortcut and
//! no tolerance, so a stale entry can never be mistaken for a valid one.
//! Correctness first: the comparison cost is trivial next to the
//! computation being cached.
//!
//! There is no locking discipline. Concurrent writers to the same
//! identifier race and the last writer wins; callers are expected to use
//! distinct identifiers per logical computation.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fg_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    x: Vec<f64>,
    samples: Vec<Vec<f64>>,
    result: Vec<Vec<f64>>,
}

/// On-disk cache for one `(inputs -> result)` computation.
///
/// The file path is derived from a caller-chosen identifier; callers
/// append a suffix per pipeline stage (`_fsamps`, `_masses`, ...) so each
/// stage owns a distinct entry.
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    /// Create a cache rooted at `identifier` (the file is `identifier.bin`).
    pub fn new(identifier: &str) -> Self {
        Self { path: PathBuf::from(format!("{identifier}.bin")) }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored result if the stored inputs exactly match.
    ///
    /// Fails with [`Error::CacheMiss`] when no readable entry exists and
    /// [`Error::CacheStale`] when an entry exists but its stored inputs
    /// differ from `x`/`samples` in any element. Both conditions are
    /// recoverable: log, recompute, [`Cache::save`].
    pub fn check(&self, x: &[f64], samples: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let file = File::open(&self.path).map_err(|e| {
            Error::CacheMiss(format!("no cache entry at {}: {}", self.path.display(), e))
        })?;
        let record: CacheRecord =
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
                Error::CacheMiss(format!(
                    "unreadable cache entry at {}: {}",
                    self.path.display(),
                    e,
                ))
            })?;

        if let Some(why) = vec_mismatch(&record.x, x) {
            return Err(Error::CacheStale(format!(
                "stored x-grid differs from the requested one ({}) at {}",
                why,
                self.path.display(),
            )));
        }
        if let Some(why) = matrix_mismatch(&record.samples, samples) {
            return Err(Error::CacheStale(format!(
                "stored samples differ from the requested ones ({}) at {}",
                why,
                self.path.display(),
            )));
        }
        Ok(record.result)
    }

    /// Persist the triple, overwriting any previous entry.
    pub fn save(&self, x: &[f64], samples: &[Vec<f64>], result: &[Vec<f64>]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let record = CacheRecord {
            x: x.to_vec(),
            samples: samples.to_vec(),
            result: result.to_vec(),
        };
        let mut writer = BufWriter::new(File::create(&self.path)?);
        bincode::serialize_into(&mut writer, &record).map_err(|e| {
            Error::Computation(format!(
                "failed to serialize cache entry at {}: {}",
                self.path.display(),
                e,
            ))
        })?;
        writer.flush()?;
        Ok(())
    }
}

/// Describe the first difference between two vectors, bitwise. NaNs with
/// equal bit patterns compare equal; nothing compares equal across payloads.
fn vec_mismatch(stored: &[f64], requested: &[f64]) -> Option<String> {
    if stored.len() != requested.len() {
        return Some(format!("stored length {} != requested {}", stored.len(), requested.len()));
    }
    for (i, (a, b)) in stored.iter().zip(requested.iter()).enumerate() {
        if a.to_bits() != b.to_bits() {
            return Some(format!("element {} is {} stored vs {} requested", i, a, b));
        }
    }
    None
}

fn matrix_mismatch(stored: &[Vec<f64>], requested: &[Vec<f64>]) -> Option<String> {
    if stored.len() != requested.len() {
        return Some(format!(
            "stored row count {} != requested {}",
            stored.len(),
            requested.len(),
        ));
    }
    for (i, (a, b)) in stored.iter().zip(requested.iter()).enumerate() {
        if let Some(why) = vec_mismatch(a, b) {
            return Some(format!("row {}: {}", i, why));
        }
    }
    None
}
