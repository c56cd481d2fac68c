//! Held-out evaluation and subgroup breakdowns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ensemble::{EnsembleBundle, Member};
use crate::domain::{PatientRecord, DECISION_THRESHOLD};
use crate::ports::ProbabilisticClassifier;
use crate::RecoveryError;

/// Smallest subgroup scored in a breakdown.
pub const MIN_GROUP_SIZE: usize = 50;
/// Fewest positives a subgroup needs to be scored.
pub const MIN_GROUP_POSITIVES: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    #[must_use]
    pub fn from_predictions(labels: &[u8], predicted: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&y, &p) in labels.iter().zip(predicted) {
            match (y, p) {
                (0, 0) => cm.tn += 1,
                (0, _) => cm.fp += 1,
                (_, 0) => cm.fn_ += 1,
                _ => cm.tp += 1,
            }
        }
        cm
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Binary classification metrics at the 0.5 decision threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when only one class is present
    pub roc_auc: Option<f64>,
    pub brier: f64,
    pub confusion: ConfusionMatrix,
}

impl ClassificationMetrics {
    /// # Errors
    /// Returns `EmptyDataset` for no rows or `Validation` for mismatched lengths.
    pub fn from_scores(labels: &[u8], probabilities: &[f64]) -> Result<Self, RecoveryError> {
        if labels.is_empty() {
            return Err(RecoveryError::EmptyDataset("no rows to evaluate".into()));
        }
        if labels.len() != probabilities.len() {
            return Err(RecoveryError::Validation(format!(
                "{} labels but {} scores",
                labels.len(),
                probabilities.len()
            )));
        }
        let predicted: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(p >= DECISION_THRESHOLD))
            .collect();
        let cm = ConfusionMatrix::from_predictions(labels, &predicted);
        let precision = ratio(cm.tp, cm.tp + cm.fp);
        let recall = ratio(cm.tp, cm.tp + cm.fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Ok(Self {
            accuracy: ratio(cm.tp + cm.tn, cm.total()),
            precision,
            recall,
            f1,
            roc_auc: roc_auc(labels, probabilities),
            brier: brier_score(labels, probabilities),
            confusion: cm,
        })
    }
}

/// Rank-based ROC-AUC (Mann-Whitney U) with average ranks for ties.
#[must_use]
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&y| y == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie run i..=j
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            if labels[k] == 1 {
                rank_sum_pos += rank;
            }
        }
        i = j + 1;
    }
    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Mean squared error between probabilities and outcomes.
#[must_use]
pub fn brier_score(labels: &[u8], probabilities: &[f64]) -> f64 {
    let n = labels.len().max(1) as f64;
    labels
        .iter()
        .zip(probabilities)
        .map(|(&y, p)| (p - f64::from(y)).powi(2))
        .sum::<f64>()
        / n
}

/// Held-out report for a trained bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub ensemble: ClassificationMetrics,
    /// Accuracy of each member on its own
    pub member_accuracy: Vec<(Member, f64)>,
    pub n_test: usize,
    pub positive_rate: f64,
}

/// Score the bundle on held-out rows.
///
/// # Errors
/// Returns `EmptyDataset` or `Validation` from metric computation.
pub fn evaluate(bundle: &EnsembleBundle, rows: &[Vec<f64>], labels: &[u8]) -> Result<EvaluationReport, RecoveryError> {
    let probabilities = bundle.predict_proba_batch(rows);
    let ensemble = ClassificationMetrics::from_scores(labels, &probabilities)?;

    let member_accuracy = Member::ALL
        .iter()
        .map(|&member| {
            let correct = rows
                .iter()
                .zip(labels)
                .filter(|(row, &y)| u8::from(bundle.member_probability(member, row) >= DECISION_THRESHOLD) == y)
                .count();
            (member, ratio(correct, labels.len()))
        })
        .collect();

    let report = EvaluationReport {
        ensemble,
        member_accuracy,
        n_test: labels.len(),
        positive_rate: ratio(labels.iter().filter(|&&y| y == 1).count(), labels.len()),
    };
    tracing::info!(
        accuracy = report.ensemble.accuracy,
        precision = report.ensemble.precision,
        recall = report.ensemble.recall,
        f1 = report.ensemble.f1,
        roc_auc = ?report.ensemble.roc_auc,
        brier = report.ensemble.brier,
        "Ensemble evaluated"
    );
    Ok(report)
}

/// Subgroup key for breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Disease,
    Prognosis,
}

impl GroupBy {
    fn key(self, record: &PatientRecord) -> String {
        match self {
            Self::Disease => record.disease.clone(),
            Self::Prognosis => record.prognosis.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupScore {
    pub group: String,
    pub n: usize,
    pub positive_rate: f64,
    pub roc_auc: f64,
    pub accuracy: f64,
}

/// Re-score every subgroup with at least `MIN_GROUP_SIZE` rows and
/// `MIN_GROUP_POSITIVES` positives, in key order. Smaller groups are skipped.
///
/// # Errors
/// Returns `Validation` if records, rows and labels differ in length.
pub fn breakdown(
    bundle: &EnsembleBundle,
    records: &[PatientRecord],
    rows: &[Vec<f64>],
    labels: &[u8],
    group_by: GroupBy,
) -> Result<Vec<GroupScore>, RecoveryError> {
    if records.len() != rows.len() || rows.len() != labels.len() {
        return Err(RecoveryError::Validation(
            "breakdown inputs differ in length".into(),
        ));
    }
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        groups.entry(group_by.key(record)).or_default().push(i);
    }

    let mut scores = Vec::new();
    for (group, idx) in groups {
        let group_labels: Vec<u8> = idx.iter().map(|&i| labels[i]).collect();
        let positives = group_labels.iter().filter(|&&y| y == 1).count();
        if idx.len() < MIN_GROUP_SIZE || positives < MIN_GROUP_POSITIVES {
            tracing::debug!(%group, n = idx.len(), positives, "Skipping small subgroup");
            continue;
        }
        let probabilities: Vec<f64> = idx.iter().map(|&i| bundle.predict_proba(&rows[i])).collect();
        let Some(auc) = roc_auc(&group_labels, &probabilities) else {
            tracing::debug!(%group, "Skipping single-class subgroup");
            continue;
        };
        let correct = probabilities
            .iter()
            .zip(&group_labels)
            .filter(|(&p, &y)| u8::from(p >= DECISION_THRESHOLD) == y)
            .count();
        scores.push(GroupScore {
            n: idx.len(),
            positive_rate: ratio(positives, idx.len()),
            roc_auc: auc,
            accuracy: ratio(correct, idx.len()),
            group,
        });
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
        assert_eq!(roc_auc(&[1, 1], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let y = [0, 1];
        assert_eq!(roc_auc(&y, &[0.5, 0.5]), Some(0.5));
        // one pos above both negatives, one tied with a negative
        let auc = roc_auc(&[0, 0, 1, 1], &[0.2, 0.6, 0.6, 0.9]).expect("auc");
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_from_scores() {
        let y = [1, 1, 0, 0, 1];
        let p = [0.9, 0.4, 0.6, 0.1, 0.7];
        let m = ClassificationMetrics::from_scores(&y, &p).expect("metrics");
        assert_eq!(
            m.confusion,
            ConfusionMatrix {
                tn: 1,
                fp: 1,
                fn_: 1,
                tp: 2
            }
        );
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
        let brier = (0.01 + 0.36 + 0.36 + 0.01 + 0.09) / 5.0;
        assert!((m.brier - brier).abs() < 1e-12);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(ClassificationMetrics::from_scores(&[], &[]).is_err());
    }
}
