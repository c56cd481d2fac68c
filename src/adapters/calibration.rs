//! Isotonic probability calibration with cross-validated base learners.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::sampling::{stratified_kfold, take_labels, take_rows};
use crate::ports::ProbabilisticClassifier;
use crate::RecoveryError;

/// Monotone non-decreasing step function fitted with pool-adjacent-violators.
///
/// Predictions interpolate linearly between block end points and are clipped
/// to the fitted score range. Deserialization rejects empty, ragged or
/// unsorted knots, so a loaded calibrator always has at least one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IsotonicKnots")]
pub struct IsotonicRegression {
    x: Vec<f64>,
    y: Vec<f64>,
}

#[derive(Deserialize)]
struct IsotonicKnots {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl TryFrom<IsotonicKnots> for IsotonicRegression {
    type Error = RecoveryError;

    fn try_from(knots: IsotonicKnots) -> Result<Self, Self::Error> {
        let IsotonicKnots { x, y } = knots;
        if x.is_empty() || x.len() != y.len() {
            return Err(RecoveryError::Validation(format!(
                "isotonic calibrator needs matching non-empty knots, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        if x.windows(2).any(|w| !(w[0] <= w[1])) || y.iter().any(|v| !v.is_finite()) {
            return Err(RecoveryError::Validation(
                "isotonic calibrator knots are unsorted or not finite".into(),
            ));
        }
        Ok(Self { x, y })
    }
}

struct Block {
    sum_y: f64,
    weight: f64,
    x_first: f64,
    x_last: f64,
}

impl Block {
    fn mean(&self) -> f64 {
        self.sum_y / self.weight
    }
}

impl IsotonicRegression {
    /// # Errors
    /// Returns `EmptyDataset` when there is nothing to fit.
    pub fn fit(scores: &[f64], targets: &[f64]) -> Result<Self, RecoveryError> {
        if scores.is_empty() || scores.len() != targets.len() {
            return Err(RecoveryError::EmptyDataset(
                "isotonic calibration needs matching non-empty inputs".into(),
            ));
        }
        let mut pairs: Vec<(f64, f64)> = scores.iter().copied().zip(targets.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut blocks: Vec<Block> = Vec::new();
        for (x, y) in pairs {
            match blocks.last_mut() {
                // Tied scores pool unconditionally.
                Some(last) if last.x_last == x => {
                    last.sum_y += y;
                    last.weight += 1.0;
                }
                _ => blocks.push(Block {
                    sum_y: y,
                    weight: 1.0,
                    x_first: x,
                    x_last: x,
                }),
            }
            while blocks.len() > 1 {
                let n = blocks.len();
                if blocks[n - 2].mean() <= blocks[n - 1].mean() {
                    break;
                }
                if let Some(top) = blocks.pop() {
                    if let Some(prev) = blocks.last_mut() {
                        prev.sum_y += top.sum_y;
                        prev.weight += top.weight;
                        prev.x_last = top.x_last;
                    }
                }
            }
        }

        let mut xs = Vec::with_capacity(blocks.len() * 2);
        let mut ys = Vec::with_capacity(blocks.len() * 2);
        for block in &blocks {
            let level = block.mean();
            xs.push(block.x_first);
            ys.push(level);
            if block.x_last > block.x_first {
                xs.push(block.x_last);
                ys.push(level);
            }
        }
        Ok(Self { x: xs, y: ys })
    }

    #[must_use]
    pub fn predict(&self, score: f64) -> f64 {
        let n = self.x.len();
        debug_assert!(n > 0 && n == self.y.len(), "isotonic calibrator without knots");
        if n == 0 {
            return score.clamp(0.0, 1.0);
        }
        if score <= self.x[0] {
            return self.y[0];
        }
        if score >= self.x[n - 1] {
            return self.y[n - 1];
        }
        let hi = self.x.partition_point(|&v| v < score);
        let lo = hi - 1;
        let span = self.x[hi] - self.x[lo];
        if span <= 0.0 {
            return self.y[hi];
        }
        let frac = (score - self.x[lo]) / span;
        self.y[lo] + frac * (self.y[hi] - self.y[lo])
    }
}

/// A fold's base learner paired with the calibrator fitted on its held-out rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibratedMember<M> {
    pub base: M,
    pub calibrator: IsotonicRegression,
}

/// Average of per-fold isotonic-calibrated base learners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibrated<M> {
    members: Vec<CalibratedMember<M>>,
}

impl<M: ProbabilisticClassifier> Calibrated<M> {
    /// Stratified `folds`-fold calibration. For each fold, `fit_base` trains a
    /// learner on the remaining folds (with a fold-specific seed) and an
    /// isotonic map is fitted to its scores on the held-out fold.
    ///
    /// # Errors
    /// Returns `InsufficientClassSupport` when a class has fewer rows than
    /// folds, and propagates any base-learner failure.
    pub fn fit<F>(
        x: &[Vec<f64>],
        y: &[u8],
        folds: usize,
        seed: u64,
        fit_base: F,
    ) -> Result<Self, RecoveryError>
    where
        F: Fn(&[Vec<f64>], &[u8], u64) -> Result<M, RecoveryError>,
    {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let splits = stratified_kfold(y, 2, folds, &mut rng)?;

        let mut members = Vec::with_capacity(folds);
        for (fold, (train, held_out)) in splits.into_iter().enumerate() {
            let fold_seed: u64 = rng.gen();
            let base = fit_base(&take_rows(x, &train), &take_labels(y, &train), fold_seed)?;
            let scores: Vec<f64> = held_out.iter().map(|&i| base.predict_proba(&x[i])).collect();
            let targets: Vec<f64> = held_out.iter().map(|&i| f64::from(y[i])).collect();
            let calibrator = IsotonicRegression::fit(&scores, &targets)?;
            tracing::debug!(fold, held_out = held_out.len(), "Calibrated fold");
            members.push(CalibratedMember { base, calibrator });
        }
        Ok(Self { members })
    }

    /// Uncalibrated base learners, one per fold.
    pub fn base_learners(&self) -> impl Iterator<Item = &M> {
        self.members.iter().map(|m| &m.base)
    }
}

impl<M: ProbabilisticClassifier> ProbabilisticClassifier for Calibrated<M> {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        let total: f64 = self
            .members
            .iter()
            .map(|m| m.calibrator.predict(m.base.predict_proba(row)))
            .sum();
        (total / self.members.len().max(1) as f64).clamp(0.0, 1.0)
    }
}
