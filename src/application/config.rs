//! Training configuration.

use std::path::PathBuf;

use crate::adapters::boosting::BoostingParams;
use crate::adapters::forest::ForestParams;
use crate::adapters::linear::ElasticNetParams;
use crate::domain::LabelNoise;

/// Configuration for one end-to-end training run.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Requested cohort size before per-disease floors
    pub n_total: usize,

    /// Root seed; every stochastic step derives its stream from it
    pub seed: u64,

    /// Minimum records generated per disease
    pub min_per_disease: usize,

    /// Directory the bundle store writes into
    pub model_dir: PathBuf,

    /// Held-out share for the final evaluation
    pub test_fraction: f64,

    /// Folds for isotonic calibration of the tree members
    pub calibration_folds: usize,

    /// Folds for the ROC-AUC diagnostic
    pub cv_folds: usize,

    pub label_noise: LabelNoise,
    pub gradient_boosting: BoostingParams,
    pub extra_trees: ForestParams,
    pub logistic: ElasticNetParams,
    pub cv_boosting: BoostingParams,

    /// Combination weights (gradient boosting, extra trees, logistic)
    pub weights: [f64; 3],
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_total: 60_000,
            seed: 42,
            min_per_disease: 500,
            model_dir: PathBuf::from("models"),
            test_fraction: 0.20,
            calibration_folds: 3,
            cv_folds: 5,
            label_noise: LabelNoise::default(),
            gradient_boosting: BoostingParams::default(),
            extra_trees: ForestParams::extra_trees(),
            logistic: ElasticNetParams::default(),
            cv_boosting: BoostingParams::cv_diagnostic(),
            weights: [0.50, 0.30, 0.20],
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse::<T>().ok()
}

impl TrainingConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - RECOVERY_N_TOTAL
    /// - RECOVERY_SEED
    /// - RECOVERY_MIN_PER_DISEASE
    /// - RECOVERY_MODEL_DIR
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Some(n) = parse_env::<usize>("RECOVERY_N_TOTAL") {
            if n > 0 {
                cfg.n_total = n;
            }
        }
        if let Some(seed) = parse_env::<u64>("RECOVERY_SEED") {
            cfg.seed = seed;
        }
        if let Some(floor) = parse_env::<usize>("RECOVERY_MIN_PER_DISEASE") {
            cfg.min_per_disease = floor;
        }
        if let Ok(dir) = std::env::var("RECOVERY_MODEL_DIR") {
            if !dir.trim().is_empty() {
                cfg.model_dir = PathBuf::from(dir.trim());
            }
        }

        cfg
    }

    /// Small but complete configuration for tests and smoke runs.
    #[must_use]
    pub fn fast() -> Self {
        let mut cfg = Self {
            n_total: 3_000,
            min_per_disease: 150,
            ..Self::default()
        };
        cfg.gradient_boosting.n_estimators = 80;
        cfg.gradient_boosting.learning_rate = 0.1;
        cfg.extra_trees.n_estimators = 40;
        cfg.logistic.max_iter = 500;
        cfg.cv_boosting.n_estimators = 30;
        cfg
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.n_total == 0 && self.min_per_disease == 0 {
            errors.push("cohort would be empty".to_string());
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            errors.push(format!("test_fraction {} outside (0, 1)", self.test_fraction));
        }
        if self.calibration_folds < 2 {
            errors.push("calibration_folds must be at least 2".to_string());
        }
        if self.cv_folds < 2 {
            errors.push("cv_folds must be at least 2".to_string());
        }
        let weight_sum: f64 = self.weights.iter().sum();
        if (weight_sum - 1.0).abs() > 1e-9 || self.weights.iter().any(|w| *w < 0.0) {
            errors.push(format!(
                "ensemble weights {:?} must be non-negative and sum to 1",
                self.weights
            ));
        }
        if let Err(e) = self.gradient_boosting.validate() {
            errors.extend(e.into_iter().map(|m| format!("gradient_boosting: {m}")));
        }
        if let Err(e) = self.cv_boosting.validate() {
            errors.extend(e.into_iter().map(|m| format!("cv_boosting: {m}")));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = TrainingConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.n_total, 60_000);
        assert_eq!(cfg.gradient_boosting.n_estimators, 350);
        assert_eq!(cfg.extra_trees.n_estimators, 300);
        assert!((cfg.weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(TrainingConfig::fast().validate().is_ok());
    }

    #[test]
    fn test_invalid_weights_reported() {
        let cfg = TrainingConfig {
            weights: [0.5, 0.5, 0.5],
            calibration_folds: 1,
            ..TrainingConfig::default()
        };
        let errors = cfg.validate().expect_err("must fail");
        assert_eq!(errors.len(), 2);
    }
}
