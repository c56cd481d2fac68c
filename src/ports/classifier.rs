//! Classifier port: Trait for binary probability scoring.
//!
//! Every ensemble member and the calibration wrapper expose this contract, so
//! the ensemble combines members without knowing how they were trained.

/// A fitted binary classifier.
///
/// Implementations are immutable after fitting; scoring never mutates state,
/// so a fitted model can be shared across threads.
pub trait ProbabilisticClassifier: Send + Sync {
    /// Probability of the positive (High Risk) class for one row.
    fn predict_proba(&self, row: &[f64]) -> f64;

    /// Probabilities for a batch of rows.
    fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba(r)).collect()
    }

    /// Hard label at the 0.5 threshold.
    fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) >= 0.5)
    }
}
