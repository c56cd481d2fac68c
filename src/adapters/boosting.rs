//! Binary gradient boosting on log-loss with stochastic subsampling and
//! validation-based early stopping.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::sampling::stratified_split;
use super::sigmoid;
use super::tree::{GrowthLimits, RegressionTree};
use crate::ports::ProbabilisticClassifier;
use crate::RecoveryError;

/// Hyperparameters for [`GradientBoosting`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of training rows drawn (without replacement) per stage
    pub subsample: f64,
    /// Fraction of features examined per split
    pub max_features: f64,
    /// Held-out share used for early stopping
    pub validation_fraction: f64,
    /// Stop after this many stages without improvement; `None` disables early stopping
    pub n_iter_no_change: Option<usize>,
    pub tol: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 350,
            learning_rate: 0.05,
            max_depth: 4,
            min_samples_split: 60,
            min_samples_leaf: 30,
            subsample: 0.75,
            max_features: 0.6,
            validation_fraction: 0.12,
            n_iter_no_change: Some(30),
            tol: 1e-4,
        }
    }
}

impl BoostingParams {
    /// Lighter configuration used only for the cross-validation diagnostic.
    #[must_use]
    pub fn cv_diagnostic() -> Self {
        Self {
            n_estimators: 150,
            learning_rate: 0.08,
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 30,
            subsample: 0.75,
            max_features: 1.0,
            validation_fraction: 0.1,
            n_iter_no_change: None,
            tol: 1e-4,
        }
    }

    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.n_estimators == 0 {
            errors.push("n_estimators must be positive".to_string());
        }
        if !(self.learning_rate > 0.0) {
            errors.push(format!("learning_rate {} must be positive", self.learning_rate));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            errors.push(format!("subsample {} outside (0, 1]", self.subsample));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            errors.push(format!("max_features {} outside (0, 1]", self.max_features));
        }
        if self.n_iter_no_change.is_some()
            && !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0)
        {
            errors.push(format!(
                "validation_fraction {} outside (0, 1)",
                self.validation_fraction
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Fitted boosting model: prior log-odds plus shrunken tree stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
    importances: Vec<f64>,
}

/// Mean binomial deviance / 2 for raw log-odds predictions.
fn log_loss(labels: &[f64], raw: &[f64]) -> f64 {
    let n = labels.len().max(1) as f64;
    labels
        .iter()
        .zip(raw)
        .map(|(y, r)| {
            let softplus = if *r > 0.0 { r + (-r).exp().ln_1p() } else { r.exp().ln_1p() };
            softplus - y * r
        })
        .sum::<f64>()
        / n
}

impl GradientBoosting {
    /// Fit on rows `x` with binary labels `y`.
    ///
    /// # Errors
    /// Returns `EmptyDataset` for no rows, `Validation` for bad parameters or
    /// a single-class target.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &BoostingParams, seed: u64) -> Result<Self, RecoveryError> {
        params
            .validate()
            .map_err(|errors| RecoveryError::Validation(errors.join("; ")))?;
        let n_features = x
            .first()
            .map(Vec::len)
            .ok_or_else(|| RecoveryError::EmptyDataset("no rows for gradient boosting".into()))?;
        let positives = y.iter().filter(|&&v| v == 1).count();
        if positives == 0 || positives == y.len() {
            return Err(RecoveryError::Validation(
                "gradient boosting needs both classes present".into(),
            ));
        }

        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let (train, val) = match params.n_iter_no_change {
            Some(_) => stratified_split(y, 2, params.validation_fraction, &mut rng)?,
            None => ((0..y.len()).collect(), Vec::new()),
        };

        let target: Vec<f64> = y.iter().map(|&v| f64::from(v)).collect();
        let prior = train.iter().map(|&i| target[i]).sum::<f64>() / train.len() as f64;
        let prior = prior.clamp(1e-12, 1.0 - 1e-12);
        let init = (prior / (1.0 - prior)).ln();

        let limits = GrowthLimits {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: ((params.max_features * n_features as f64) as usize).max(1),
        };
        let n_inbag = ((params.subsample * train.len() as f64) as usize).max(1);

        let mut raw = vec![init; y.len()];
        let mut residual = vec![0.0; y.len()];
        let mut hessian = vec![0.0; y.len()];
        let mut importances = vec![0.0; n_features];
        let mut stages = Vec::with_capacity(params.n_estimators);

        let val_target: Vec<f64> = val.iter().map(|&i| target[i]).collect();
        let mut loss_history = vec![f64::INFINITY; params.n_iter_no_change.unwrap_or(0)];

        for stage in 0..params.n_estimators {
            for &i in &train {
                let p = sigmoid(raw[i]);
                residual[i] = target[i] - p;
                hessian[i] = p * (1.0 - p);
            }
            let rows = if n_inbag < train.len() {
                index::sample(&mut rng, train.len(), n_inbag)
                    .into_iter()
                    .map(|k| train[k])
                    .collect()
            } else {
                train.clone()
            };

            let tree = RegressionTree::fit(
                x,
                rows,
                &residual,
                &hessian,
                limits,
                &mut rng,
                &mut importances,
            );
            for &i in train.iter().chain(&val) {
                raw[i] += params.learning_rate * tree.predict(&x[i]);
            }
            stages.push(tree);

            if !loss_history.is_empty() {
                let val_raw: Vec<f64> = val.iter().map(|&i| raw[i]).collect();
                let loss = log_loss(&val_target, &val_raw);
                if loss_history.iter().any(|&h| loss + params.tol < h) {
                    let slot = stage % loss_history.len();
                    loss_history[slot] = loss;
                } else {
                    tracing::debug!(stages = stage + 1, loss, "Early stopping gradient boosting");
                    break;
                }
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            init,
            learning_rate: params.learning_rate,
            stages,
            importances,
        })
    }

    /// Raw log-odds score.
    #[must_use]
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.init
            + self.learning_rate * self.stages.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Split-gain importances normalised to sum to one.
    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

impl ProbabilisticClassifier for GradientBoosting {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision_function(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn noisy_problem(n: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let a: f64 = rng.gen_range(-3.0..3.0);
            let b: f64 = rng.gen_range(-3.0..3.0);
            let noise: f64 = rng.gen_range(-0.5..0.5);
            y.push(u8::from(a + 0.5 * b + noise > 0.0));
            x.push(vec![a, b, rng.gen_range(0.0..1.0)]);
        }
        (x, y)
    }

    fn fast_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 60,
            learning_rate: 0.1,
            min_samples_split: 10,
            min_samples_leaf: 5,
            n_iter_no_change: None,
            max_features: 1.0,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn test_learns_linear_boundary() {
        let (x, y) = noisy_problem(800, 1);
        let model = GradientBoosting::fit(&x, &y, &fast_params(), 42).expect("fit");
        let correct = x
            .iter()
            .zip(&y)
            .filter(|(row, &label)| model.predict(row) == label)
            .count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
        assert_eq!(model.n_stages(), 60);

        let imp = model.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[2]);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = noisy_problem(300, 2);
        let a = GradientBoosting::fit(&x, &y, &fast_params(), 7).expect("fit");
        let b = GradientBoosting::fit(&x, &y, &fast_params(), 7).expect("fit");
        for row in &x {
            assert_eq!(a.predict_proba(row).to_bits(), b.predict_proba(row).to_bits());
        }
    }

    #[test]
    fn test_early_stopping_caps_stages() {
        let (x, y) = noisy_problem(600, 3);
        let params = BoostingParams {
            n_estimators: 2000,
            learning_rate: 0.3,
            n_iter_no_change: Some(5),
            min_samples_split: 10,
            min_samples_leaf: 5,
            ..BoostingParams::default()
        };
        let model = GradientBoosting::fit(&x, &y, &params, 11).expect("fit");
        assert!(model.n_stages() < 2000);
    }

    #[test]
    fn test_single_class_rejected() {
        let x = vec![vec![0.0]; 10];
        let y = vec![1u8; 10];
        assert!(matches!(
            GradientBoosting::fit(&x, &y, &fast_params(), 0),
            Err(RecoveryError::Validation(_))
        ));
    }
}
