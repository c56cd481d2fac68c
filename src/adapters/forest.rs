//! Randomised tree ensembles: extra trees and random forests.
//!
//! Trees are grown in parallel. Each tree owns an RNG seeded from a per-tree
//! seed drawn up front, so results do not depend on thread scheduling.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::sampling::balanced_weights;
use super::tree::{ClassificationTree, GrowthLimits, Splitter};
use crate::ports::ProbabilisticClassifier;
use crate::RecoveryError;

/// Features examined per split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Fraction(f64),
    All,
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            Self::Sqrt => (n_features as f64).sqrt() as usize,
            Self::Fraction(f) => (f * n_features as f64) as usize,
            Self::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    /// Reweight rows inversely to class frequency
    pub balanced_class_weight: bool,
    pub splitter: Splitter,
}

impl ForestParams {
    /// Extremely randomized trees for the deterioration ensemble.
    #[must_use]
    pub fn extra_trees() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 12,
            min_samples_split: 40,
            min_samples_leaf: 15,
            max_features: MaxFeatures::Sqrt,
            bootstrap: false,
            balanced_class_weight: true,
            splitter: Splitter::Random,
        }
    }

    /// Bootstrap random forest for the anemia classifier.
    #[must_use]
    pub fn random_forest() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            balanced_class_weight: false,
            splitter: Splitter::Best,
        }
    }
}

/// Fitted forest averaging leaf class probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    n_classes: usize,
    trees: Vec<ClassificationTree>,
    importances: Vec<f64>,
}

impl Forest {
    /// # Errors
    /// Returns `EmptyDataset` for no rows and `Validation` for an empty
    /// ensemble or a label outside `0..n_classes`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[u8],
        n_classes: usize,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, RecoveryError> {
        let n_features = x
            .first()
            .map(Vec::len)
            .ok_or_else(|| RecoveryError::EmptyDataset("no rows for forest".into()))?;
        if params.n_estimators == 0 {
            return Err(RecoveryError::Validation("forest needs at least one tree".into()));
        }
        if let Some(bad) = y.iter().find(|&&c| usize::from(c) >= n_classes) {
            return Err(RecoveryError::Validation(format!(
                "label {bad} outside 0..{n_classes}"
            )));
        }

        let weights = if params.balanced_class_weight {
            balanced_weights(y, n_classes)
        } else {
            vec![1.0; y.len()]
        };
        let limits = GrowthLimits {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: params.max_features.resolve(n_features),
        };

        let mut seeder = ChaCha20Rng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| seeder.gen()).collect();
        let n = y.len();

        let grown: Vec<(ClassificationTree, Vec<f64>)> = seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut rng = ChaCha20Rng::seed_from_u64(tree_seed);
                let rows = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut importances = vec![0.0; n_features];
                let tree = ClassificationTree::fit(
                    x,
                    rows,
                    y,
                    &weights,
                    n_classes,
                    limits,
                    params.splitter,
                    &mut rng,
                    &mut importances,
                );
                (tree, importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, tree_importances) in grown {
            for (total, v) in importances.iter_mut().zip(tree_importances) {
                *total += v;
            }
            trees.push(tree);
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        tracing::debug!(trees = trees.len(), n_classes, "Forest fitted");
        Ok(Self {
            n_classes,
            trees,
            importances,
        })
    }

    /// Mean leaf probabilities, one entry per class.
    #[must_use]
    pub fn predict_class_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *p += v;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Positive-class probability; meaningful for binary forests only.
impl ProbabilisticClassifier for Forest {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        self.predict_class_proba(row).get(1).copied().unwrap_or(0.0)
    }
}
