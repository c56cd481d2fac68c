//! Stratified partitioning and class reweighting.
//!
//! All shuffling goes through the caller's RNG so that every split is
//! reproducible from the run seed.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::RecoveryError;

/// Row indices grouped by class label.
#[must_use]
pub fn class_indices(labels: &[u8], n_classes: usize) -> Vec<Vec<usize>> {
    let mut groups = vec![Vec::new(); n_classes];
    for (i, &y) in labels.iter().enumerate() {
        if let Some(g) = groups.get_mut(usize::from(y)) {
            g.push(i);
        }
    }
    groups
}

/// Split rows into (train, test) preserving class proportions.
///
/// # Errors
/// Returns `EmptyDataset` if there are no rows, or `InsufficientClassSupport`
/// when a class has fewer than two rows and cannot appear on both sides.
pub fn stratified_split<R: Rng + ?Sized>(
    labels: &[u8],
    n_classes: usize,
    test_fraction: f64,
    rng: &mut R,
) -> Result<(Vec<usize>, Vec<usize>), RecoveryError> {
    if labels.is_empty() {
        return Err(RecoveryError::EmptyDataset("nothing to split".into()));
    }
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(RecoveryError::Validation(format!(
            "test fraction {test_fraction} outside [0, 1)"
        )));
    }

    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for (class, mut rows) in class_indices(labels, n_classes).into_iter().enumerate() {
        if rows.is_empty() {
            continue;
        }
        if rows.len() < 2 {
            return Err(RecoveryError::InsufficientClassSupport {
                class: class as u8,
                count: rows.len(),
                folds: 2,
            });
        }
        rows.shuffle(rng);
        let n_test = ((rows.len() as f64 * test_fraction).round() as usize).clamp(1, rows.len() - 1);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.shuffle(rng);
    test.shuffle(rng);
    Ok((train, test))
}

/// Stratified k-fold partition: `k` pairs of (train, validation) indices.
///
/// # Errors
/// Returns `InsufficientClassSupport` if any of the `n_classes` classes has
/// fewer than `k` rows. This is fatal for the calling fit.
pub fn stratified_kfold<R: Rng + ?Sized>(
    labels: &[u8],
    n_classes: usize,
    k: usize,
    rng: &mut R,
) -> Result<Vec<(Vec<usize>, Vec<usize>)>, RecoveryError> {
    if k < 2 {
        return Err(RecoveryError::Validation(format!("need at least 2 folds, got {k}")));
    }

    let mut fold_of = vec![0usize; labels.len()];
    for (class, mut rows) in class_indices(labels, n_classes).into_iter().enumerate() {
        if rows.len() < k {
            return Err(RecoveryError::InsufficientClassSupport {
                class: class as u8,
                count: rows.len(),
                folds: k,
            });
        }
        rows.shuffle(rng);
        for (j, row) in rows.into_iter().enumerate() {
            fold_of[row] = j % k;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (val, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            (train, val)
        })
        .collect())
}

/// Per-row weights `n / (n_classes * count[class])`.
#[must_use]
pub fn balanced_weights(labels: &[u8], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &y in labels {
        counts[usize::from(y)] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1);
    let n = labels.len() as f64;
    labels
        .iter()
        .map(|&y| n / (present as f64 * counts[usize::from(y)] as f64))
        .collect()
}

/// Gather rows by index.
#[must_use]
pub fn take_rows(rows: &[Vec<f64>], idx: &[usize]) -> Vec<Vec<f64>> {
    idx.iter().map(|&i| rows[i].clone()).collect()
}

/// Gather labels by index.
#[must_use]
pub fn take_labels(labels: &[u8], idx: &[usize]) -> Vec<u8> {
    idx.iter().map(|&i| labels[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn labels() -> Vec<u8> {
        (0..1000).map(|i| u8::from(i % 4 == 0)).collect()
    }

    #[test]
    fn test_split_preserves_balance() {
        let y = labels();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let (train, test) = stratified_split(&y, 2, 0.2, &mut rng).expect("split");
        assert_eq!(train.len() + test.len(), y.len());
        assert_eq!(test.len(), 200);
        let pos = test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(pos, 50);
    }

    #[test]
    fn test_split_is_reproducible() {
        let y = labels();
        let a = stratified_split(&y, 2, 0.2, &mut ChaCha20Rng::seed_from_u64(3)).expect("split");
        let b = stratified_split(&y, 2, 0.2, &mut ChaCha20Rng::seed_from_u64(3)).expect("split");
        assert_eq!(a, b);
    }

    #[test]
    fn test_kfold_partitions_everything() {
        let y = labels();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let folds = stratified_kfold(&y, 2, 5, &mut rng).expect("folds");
        assert_eq!(folds.len(), 5);
        let mut seen = vec![0; y.len()];
        for (train, val) in &folds {
            assert_eq!(train.len() + val.len(), y.len());
            for &i in val {
                seen[i] += 1;
            }
            let pos = val.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(pos, 50);
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_kfold_rejects_rare_class() {
        let mut y = vec![0u8; 100];
        y[0] = 1;
        y[1] = 1;
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let err = stratified_kfold(&y, 2, 3, &mut rng).expect_err("must fail");
        assert!(matches!(
            err,
            RecoveryError::InsufficientClassSupport { class: 1, count: 2, folds: 3 }
        ));
    }

    #[test]
    fn test_balanced_weights() {
        let y = labels();
        let w = balanced_weights(&y, 2);
        let total: f64 = w.iter().sum();
        assert!((total - y.len() as f64).abs() < 1e-9);
        assert!((w[0] - 2.0).abs() < 1e-12); // minority
        assert!((w[1] - 1000.0 / (2.0 * 750.0)).abs() < 1e-12);
    }
}
