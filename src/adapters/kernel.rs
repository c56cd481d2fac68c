//! Random Fourier features for the RBF kernel.
//!
//! `z(x) = sqrt(2/D) * cos(W x + b)` with `W ~ N(0, 2*gamma)` and
//! `b ~ U(0, 2*pi)` gives `z(x)·z(y) ≈ exp(-gamma * |x - y|^2)`, so a linear
//! model on `z(x)` behaves like a kernel machine with an RBF kernel.

use std::f64::consts::TAU;

use rand::distributions::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::RecoveryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbfFeatures {
    /// One frequency vector per component
    weights: Vec<Vec<f64>>,
    offsets: Vec<f64>,
}

/// `1 / (n_features * var(X))` over every entry of `rows`.
///
/// # Errors
/// Returns `EmptyDataset` for no rows and `Validation` for constant input.
pub fn scale_gamma(rows: &[Vec<f64>]) -> Result<f64, RecoveryError> {
    let n_features = rows.first().map_or(0, Vec::len);
    if n_features == 0 {
        return Err(RecoveryError::EmptyDataset("gamma needs at least one feature".into()));
    }
    let n = (rows.len() * n_features) as f64;
    let mean = rows.iter().flatten().sum::<f64>() / n;
    let var = rows.iter().flatten().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if !(var.is_finite() && var > 0.0) {
        return Err(RecoveryError::Validation(format!("cannot derive gamma from variance {var}")));
    }
    Ok(1.0 / (n_features as f64 * var))
}

impl RbfFeatures {
    /// Draw `n_components` random features for inputs of width `n_features`.
    ///
    /// # Errors
    /// Returns `Validation` for zero sizes or a non-positive `gamma`.
    pub fn sample(n_features: usize, n_components: usize, gamma: f64, seed: u64) -> Result<Self, RecoveryError> {
        if n_features == 0 || n_components == 0 {
            return Err(RecoveryError::Validation(format!(
                "rbf features need non-zero sizes, got {n_features}x{n_components}"
            )));
        }
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(RecoveryError::Validation(format!("rbf gamma {gamma} must be positive")));
        }
        let frequency = Normal::new(0.0, (2.0 * gamma).sqrt())
            .map_err(|e| RecoveryError::Validation(format!("rbf gamma {gamma}: {e}")))?;

        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let weights = (0..n_components)
            .map(|_| (0..n_features).map(|_| frequency.sample(&mut rng)).collect())
            .collect();
        let offsets = (0..n_components).map(|_| rng.gen_range(0.0..TAU)).collect();
        Ok(Self { weights, offsets })
    }

    #[must_use]
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        let scale = (2.0 / self.offsets.len() as f64).sqrt();
        self.weights
            .iter()
            .zip(&self.offsets)
            .map(|(w, b)| scale * (b + row.iter().zip(w).map(|(a, c)| a * c).sum::<f64>()).cos())
            .collect()
    }

    #[must_use]
    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    #[must_use]
    pub fn n_components(&self) -> usize {
        self.offsets.len()
    }
}
