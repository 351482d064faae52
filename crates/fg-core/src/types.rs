//! Serializable artifact types for fgrid

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Rectangular posterior-mass grid, the final contour deliverable.
///
/// `z[k][i]` is the probability mass lying outside the iso-probability
/// contour through `(x[i], y[k])`, in `[0, 1]`. Rows follow the y grid so
/// the matrix feeds straight into image/contour renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassGrid {
    /// Grid x-values.
    pub x: Vec<f64>,
    /// Grid y-values.
    pub y: Vec<f64>,
    /// Mass values, row-major `[y_idx][x_idx]`.
    pub z: Vec<Vec<f64>>,
}

impl MassGrid {
    /// Build a grid, validating that `z` has shape `(len(y), len(x))`.
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<Vec<f64>>) -> Result<Self> {
        if z.len() != y.len() {
            return Err(Error::Validation(format!(
                "mass grid has {} rows but {} y values",
                z.len(),
                y.len(),
            )));
        }
        for (k, row) in z.iter().enumerate() {
            if row.len() != x.len() {
                return Err(Error::Validation(format!(
                    "mass grid row {} has length {} but {} x values",
                    k,
                    row.len(),
                    x.len(),
                )));
            }
        }
        Ok(Self { x, y, z })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string, revalidating shapes.
    pub fn from_json(json: &str) -> Result<Self> {
        let grid: MassGrid = serde_json::from_str(json)?;
        MassGrid::new(grid.x, grid.y, grid.z)
    }
}

/// Per-x Kullback-Leibler divergence curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DklCurve {
    /// Grid x-values.
    pub x: Vec<f64>,
    /// Divergence at each x, in nats.
    pub dkl: Vec<f64>,
}

impl DklCurve {
    /// Build a curve, validating that both sequences have equal length.
    pub fn new(x: Vec<f64>, dkl: Vec<f64>) -> Result<Self> {
        if x.len() != dkl.len() {
            return Err(Error::Validation(format!(
                "length of x ({}) != length of dkl ({})",
                x.len(),
                dkl.len(),
            )));
        }
        Ok(Self { x, dkl })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let curve: DklCurve = serde_json::from_str(json)?;
        DklCurve::new(curve.x, curve.dkl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_grid_shape_validation() {
        let ok = MassGrid::new(vec![0.0, 1.0], vec![0.0], vec![vec![0.1, 0.2]]);
        assert!(ok.is_ok());

        let bad_rows = MassGrid::new(vec![0.0, 1.0], vec![0.0], vec![]);
        assert!(bad_rows.is_err());

        let bad_cols = MassGrid::new(vec![0.0, 1.0], vec![0.0], vec![vec![0.1]]);
        assert!(bad_cols.is_err());
    }

    #[test]
    fn test_mass_grid_json_roundtrip() {
        let grid =
            MassGrid::new(vec![-1.0, 0.0, 1.0], vec![0.0, 0.5], vec![vec![0.1, 0.2, 0.3]; 2])
                .unwrap();
        let json = grid.to_json().unwrap();
        let back = MassGrid::from_json(&json).unwrap();
        assert_eq!(back.x, grid.x);
        assert_eq!(back.y, grid.y);
        assert_eq!(back.z, grid.z);
    }

    #[test]
    fn test_dkl_curve_length_validation() {
        assert!(DklCurve::new(vec![0.0, 1.0], vec![0.1]).is_err());
        let curve = DklCurve::new(vec![0.0, 1.0], vec![0.1, 0.2]).unwrap();
        let back = DklCurve::from_json(&curve.to_json().unwrap()).unwrap();
        assert_eq!(back.dkl, curve.dkl);
    }
}
