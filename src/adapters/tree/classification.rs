use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{candidate_features, midpoint, Arena, GrowthLimits, Node};

/// How thresholds are chosen at each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Splitter {
    /// Exhaustive scan over sorted values
    Best,
    /// One uniform threshold per candidate feature (extremely randomized trees)
    Random,
}

/// Weighted-gini classification tree whose leaves store class probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationTree {
    arena: Arena<Vec<f64>>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Grower<'a, R: ?Sized> {
    x: &'a [Vec<f64>],
    labels: &'a [u8],
    weights: &'a [f64],
    n_classes: usize,
    limits: GrowthLimits,
    splitter: Splitter,
    rng: &'a mut R,
    importances: &'a mut [f64],
    arena: Arena<Vec<f64>>,
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

impl ClassificationTree {
    /// Grow a tree over `rows`. Repeated indices (bootstrap draws) are allowed.
    ///
    /// Weighted impurity decreases of accepted splits are added to `importances`.
    #[allow(clippy::too_many_arguments)]
    pub fn fit<R: Rng + ?Sized>(
        x: &[Vec<f64>],
        rows: Vec<usize>,
        labels: &[u8],
        weights: &[f64],
        n_classes: usize,
        limits: GrowthLimits,
        splitter: Splitter,
        rng: &mut R,
        importances: &mut [f64],
    ) -> Self {
        let mut grower = Grower {
            x,
            labels,
            weights,
            n_classes,
            limits,
            splitter,
            rng,
            importances,
            arena: Arena::new(),
        };
        grower.grow(rows, 0);
        Self {
            arena: grower.arena,
        }
    }

    /// Class probabilities at the leaf reached by `row`.
    #[must_use]
    pub fn predict_proba(&self, row: &[f64]) -> &[f64] {
        self.arena.leaf(row)
    }
}

impl<R: Rng + ?Sized> Grower<'_, R> {
    fn class_weights(&self, rows: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in rows {
            counts[usize::from(self.labels[i])] += self.weights[i];
        }
        counts
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_weights(&rows);
        let total: f64 = counts.iter().sum();
        let impurity = gini(&counts, total);

        if impurity > 0.0 && self.limits.may_split(rows.len(), depth) {
            let split = match self.splitter {
                Splitter::Best => self.best_split(&rows, &counts, total, impurity),
                Splitter::Random => self.random_split(&rows, &counts, total, impurity),
            };
            if let Some(split) = split {
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

        let proba = if total > 0.0 {
            counts.iter().map(|c| c / total).collect()
        } else {
            vec![1.0 / self.n_classes as f64; self.n_classes]
        };
        self.arena.push(Node::Leaf(proba))
    }

    fn decrease(&self, total: f64, impurity: f64, left: &[f64], left_total: f64, parent: &[f64]) -> f64 {
        let right: Vec<f64> = parent.iter().zip(left).map(|(p, l)| p - l).collect();
        let right_total = total - left_total;
        total * impurity - left_total * gini(left, left_total) - right_total * gini(&right, right_total)
    }

    fn best_split(&mut self, rows: &[usize], counts: &[f64], total: f64, impurity: f64) -> Option<Split> {
        let n_features = self.x.first().map_or(0, Vec::len);
        let features = candidate_features(n_features, self.limits.max_features, &mut *self.rng);
        let min_leaf = self.limits.min_samples_leaf.max(1);
        let n = rows.len();

        let mut best: Option<Split> = None;
        let mut order = rows.to_vec();
        let mut left = vec![0.0; self.n_classes];
        for feature in features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            left.iter_mut().for_each(|c| *c = 0.0);
            let mut left_total = 0.0;
            for k in 0..n - 1 {
                let i = order[k];
                left[usize::from(self.labels[i])] += self.weights[i];
                left_total += self.weights[i];
                let n_left = k + 1;
                if n_left < min_leaf {
                    continue;
                }
                if n - n_left < min_leaf {
                    break;
                }
                let lo = self.x[i][feature];
                let hi = self.x[order[k + 1]][feature];
                if hi <= lo {
                    continue;
                }
                let gain = self.decrease(total, impurity, &left, left_total, counts);
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

    fn random_split(&mut self, rows: &[usize], counts: &[f64], total: f64, impurity: f64) -> Option<Split> {
        let n_features = self.x.first().map_or(0, Vec::len);
        let features = candidate_features(n_features, self.limits.max_features, &mut *self.rng);
        let min_leaf = self.limits.min_samples_leaf.max(1);

        let mut best: Option<Split> = None;
        for feature in features {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = self.x[i][feature];
                (lo.min(v), hi.max(v))
            });
            if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
                continue;
            }
            let threshold = self.rng.gen_range(lo..hi);

            let mut left = vec![0.0; self.n_classes];
            let mut left_total = 0.0;
            let mut n_left = 0usize;
            for &i in rows {
                if self.x[i][feature] <= threshold {
                    left[usize::from(self.labels[i])] += self.weights[i];
                    left_total += self.weights[i];
                    n_left += 1;
                }
            }
            if n_left < min_leaf || rows.len() - n_left < min_leaf {
                continue;
            }
            let gain = self.decrease(total, impurity, &left, left_total, counts);
            if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                best = Some(Split {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
        best
    }
}
