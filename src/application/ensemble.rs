//! The persisted ensemble bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::boosting::GradientBoosting;
use crate::adapters::calibration::Calibrated;
use crate::adapters::forest::Forest;
use crate::adapters::linear::ElasticNetLogistic;
use crate::adapters::scaling::RobustScaler;
use crate::domain::features::{feature_fingerprint, fingerprint_of};
use crate::domain::FEATURE_NAMES;
use crate::ports::ProbabilisticClassifier;
use crate::RecoveryError;

/// Ensemble members, in combination-weight order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Member {
    GradientBoosting,
    ExtraTrees,
    Logistic,
}

impl Member {
    pub const ALL: [Member; 3] = [Self::GradientBoosting, Self::ExtraTrees, Self::Logistic];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GradientBoosting => "Gradient Boosting (calibrated)",
            Self::ExtraTrees => "Extra Trees (calibrated)",
            Self::Logistic => "Logistic Regression (elastic net)",
        }
    }
}

/// Three fitted members, the logistic member's scaler, the combination
/// weights and the feature ordering everything was fitted on.
///
/// Replaced as a whole on retrain, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleBundle {
    gbm: Calibrated<GradientBoosting>,
    et: Calibrated<Forest>,
    lr: ElasticNetLogistic,
    scaler: RobustScaler,
    weights: [f64; 3],
    feature_names: Vec<String>,
    fingerprint: String,
    trained_at: DateTime<Utc>,
}

impl EnsembleBundle {
    /// Assemble a bundle for the current feature ordering.
    ///
    /// # Errors
    /// Returns `Validation` if the weights are negative or do not sum to one,
    /// or the scaler width differs from the feature list.
    pub fn new(
        gbm: Calibrated<GradientBoosting>,
        et: Calibrated<Forest>,
        lr: ElasticNetLogistic,
        scaler: RobustScaler,
        weights: [f64; 3],
    ) -> Result<Self, RecoveryError> {
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-9 || weights.iter().any(|w| *w < 0.0) {
            return Err(RecoveryError::Validation(format!(
                "ensemble weights {weights:?} must be non-negative and sum to 1"
            )));
        }
        if scaler.n_features() != FEATURE_NAMES.len() {
            return Err(RecoveryError::Validation(format!(
                "scaler fitted on {} columns, feature list has {}",
                scaler.n_features(),
                FEATURE_NAMES.len()
            )));
        }
        Ok(Self {
            gbm,
            et,
            lr,
            scaler,
            weights,
            feature_names: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
            fingerprint: feature_fingerprint(),
            trained_at: Utc::now(),
        })
    }

    /// Fail fast when this bundle was fitted on a different feature ordering
    /// than the running build produces.
    ///
    /// # Errors
    /// Returns `SchemaMismatch` with both fingerprints.
    pub fn check_schema(&self) -> Result<(), RecoveryError> {
        let expected = feature_fingerprint();
        let recorded = fingerprint_of(&self.feature_names);
        for found in [&self.fingerprint, &recorded] {
            if *found != expected {
                return Err(RecoveryError::SchemaMismatch {
                    expected,
                    found: found.clone(),
                });
            }
        }
        Ok(())
    }

    /// Per-member probabilities for one unscaled row.
    #[must_use]
    pub fn member_probabilities(&self, row: &[f64]) -> [f64; 3] {
        let scaled = self.scaler.transform_row(row);
        [
            self.gbm.predict_proba(row),
            self.et.predict_proba(row),
            self.lr.predict_proba(&scaled),
        ]
    }

    #[must_use]
    pub fn member_probability(&self, member: Member, row: &[f64]) -> f64 {
        match member {
            Member::GradientBoosting => self.gbm.predict_proba(row),
            Member::ExtraTrees => self.et.predict_proba(row),
            Member::Logistic => self.lr.predict_proba(&self.scaler.transform_row(row)),
        }
    }

    /// Gain importances of the first calibration fold's boosting model,
    /// sorted descending.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        let Some(base) = self.gbm.base_learners().next() else {
            return Vec::new();
        };
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(base.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    #[must_use]
    pub fn weights(&self) -> [f64; 3] {
        self.weights
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    #[cfg(test)]
    pub(crate) fn set_feature_names(&mut self, names: Vec<String>) {
        self.fingerprint = fingerprint_of(&names);
        self.feature_names = names;
    }
}

impl ProbabilisticClassifier for EnsembleBundle {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        self.member_probabilities(row)
            .iter()
            .zip(&self.weights)
            .map(|(p, w)| p * w)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}
