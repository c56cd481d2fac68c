use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{candidate_features, midpoint, Arena, GrowthLimits, Node};

/// Regression tree fitted to log-loss gradients.
///
/// Splits maximise squared-error reduction of the residuals. Leaves hold one
/// Newton step: `sum(residual) / sum(hessian)` over the rows that reach them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    arena: Arena<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Grower<'a, R: ?Sized> {
    x: &'a [Vec<f64>],
    residual: &'a [f64],
    hessian: &'a [f64],
    limits: GrowthLimits,
    rng: &'a mut R,
    importances: &'a mut [f64],
    arena: Arena<f64>,
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `rows`.
    ///
    /// Squared-error gains of accepted splits are added to `importances`.
    pub fn fit<R: Rng + ?Sized>(
        x: &[Vec<f64>],
        rows: Vec<usize>,
        residual: &[f64],
        hessian: &[f64],
        limits: GrowthLimits,
        rng: &mut R,
        importances: &mut [f64],
    ) -> Self {
        let mut grower = Grower {
            x,
            residual,
            hessian,
            limits,
            rng,
            importances,
            arena: Arena::new(),
        };
        grower.grow(rows, 0);
        Self {
            arena: grower.arena,
        }
    }

    #[must_use]
    pub fn predict(&self, row: &[f64]) -> f64 {
        *self.arena.leaf(row)
    }

    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.arena.n_leaves()
    }
}

impl<R: Rng + ?Sized> Grower<'_, R> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        if self.limits.may_split(rows.len(), depth) {
            if let Some(split) = self.best_split(&rows) {
                self.importances[split.feature] += split.gain;
                let (left, right): (Vec<usize>, Vec<usize>) = rows
                    .into_iter()
                    .partition(|&i| self.x[i][split.feature] <= split.threshold);
                let left = self.grow(left, depth + 1);
                let right = self.grow(right, depth + 1);
                return self.arena.push(Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                });
            }
        }
        let value = self.leaf_value(&rows);
        self.arena.push(Node::Leaf(value))
    }

    fn leaf_value(&self, rows: &[usize]) -> f64 {
        let num: f64 = rows.iter().map(|&i| self.residual[i]).sum();
        let den: f64 = rows.iter().map(|&i| self.hessian[i]).sum();
        if den.abs() < 1e-150 {
            0.0
        } else {
            num / den
        }
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<Split> {
        let n_features = self.x.first().map_or(0, Vec::len);
        let features = candidate_features(n_features, self.limits.max_features, &mut *self.rng);
        let min_leaf = self.limits.min_samples_leaf.max(1);

        let n = rows.len();
        let total: f64 = rows.iter().map(|&i| self.residual[i]).sum();
        let parent = total * total / n as f64;

        let mut best: Option<Split> = None;
        let mut order = rows.to_vec();
        for feature in features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            let mut left_sum = 0.0;
            for k in 0..n - 1 {
                left_sum += self.residual[order[k]];
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf {
                    continue;
                }
                if n_right < min_leaf {
                    break;
                }
                let lo = self.x[order[k]][feature];
                let hi = self.x[order[k + 1]][feature];
                if hi <= lo {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / n_left as f64
                    + right_sum * right_sum / n_right as f64
                    - parent;
                if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: midpoint(lo, hi),
                        gain,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_step_function_is_recovered() {
        let x: Vec<Vec<f64>> = (0..100).map(|i| vec![f64::from(i), 0.0]).collect();
        let residual: Vec<f64> = (0..100).map(|i| if i < 50 { -1.0 } else { 1.0 }).collect();
        let hessian = vec![1.0; 100];
        let mut importances = vec![0.0; 2];
        let limits = GrowthLimits {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 5,
            max_features: 2,
        };
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let tree = RegressionTree::fit(
            &x,
            (0..100).collect(),
            &residual,
            &hessian,
            limits,
            &mut rng,
            &mut importances,
        );
        assert!((tree.predict(&[10.0, 0.0]) + 1.0).abs() < 1e-12);
        assert!((tree.predict(&[90.0, 0.0]) - 1.0).abs() < 1e-12);
        // constant second column never splits
        assert!(importances[1].abs() < f64::EPSILON);
        assert!(importances[0] > 0.0);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_min_leaf_blocks_split() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let residual = vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, 5.0];
        let hessian = vec![0.25; 10];
        let limits = GrowthLimits {
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 6,
            max_features: 1,
        };
        let mut importances = vec![0.0];
        let tree = RegressionTree::fit(
            &x,
            (0..10).collect(),
            &residual,
            &hessian,
            limits,
            &mut ChaCha20Rng::seed_from_u64(1),
            &mut importances,
        );
        assert_eq!(tree.n_leaves(), 1);
        assert!((tree.predict(&[0.0]) - 6.0 / 2.5).abs() < 1e-12);
    }
}
