//! Column scalers fitted on training rows only.

use serde::{Deserialize, Serialize};

use crate::RecoveryError;

fn columns(rows: &[Vec<f64>]) -> Result<usize, RecoveryError> {
    let width = rows
        .first()
        .map(Vec::len)
        .ok_or_else(|| RecoveryError::EmptyDataset("cannot fit a scaler on zero rows".into()))?;
    if rows.iter().any(|r| r.len() != width) {
        return Err(RecoveryError::Validation("ragged feature matrix".into()));
    }
    Ok(width)
}

/// Linear-interpolated quantile of an already sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Median / interquartile-range scaler.
///
/// A column with zero IQR keeps scale 1 so it is only centred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    center: Vec<f64>,
    scale: Vec<f64>,
}

impl RobustScaler {
    /// # Errors
    /// Returns `EmptyDataset` for zero rows or `Validation` for ragged input.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, RecoveryError> {
        let width = columns(rows)?;
        let mut center = Vec::with_capacity(width);
        let mut scale = Vec::with_capacity(width);
        let mut column = Vec::with_capacity(rows.len());
        for j in 0..width {
            column.clear();
            column.extend(rows.iter().map(|r| r[j]));
            column.sort_by(f64::total_cmp);
            let iqr = quantile(&column, 0.75) - quantile(&column, 0.25);
            center.push(quantile(&column, 0.5));
            scale.push(if iqr.abs() < f64::EPSILON { 1.0 } else { iqr });
        }
        Ok(Self { center, scale })
    }

    #[must_use]
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.center.iter().zip(&self.scale))
            .map(|(x, (c, s))| (x - c) / s)
            .collect()
    }

    #[must_use]
    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.center.len()
    }
}

/// Mean / standard-deviation scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// # Errors
    /// Returns `EmptyDataset` for zero rows or `Validation` for ragged input.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, RecoveryError> {
        let width = columns(rows)?;
        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for r in rows {
            for (m, x) in mean.iter_mut().zip(r) {
                *m += x / n;
            }
        }
        let mut std = vec![0.0; width];
        for r in rows {
            for ((s, x), m) in std.iter_mut().zip(r).zip(&mean) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in &mut std {
            *s = s.sqrt();
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }
        Ok(Self { mean, std })
    }

    #[must_use]
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    #[must_use]
    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}
