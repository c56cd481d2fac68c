//! Penalised logistic models solved with accelerated (proximal) gradient descent.
//!
//! Inputs are expected to be scaled by the caller. Both solvers are fully
//! deterministic: no random initialisation, sequential reductions.

use serde::{Deserialize, Serialize};

use super::sampling::balanced_weights;
use super::sigmoid;
use crate::ports::ProbabilisticClassifier;
use crate::RecoveryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticNetParams {
    /// Inverse regularisation strength
    pub c: f64,
    /// Mix between L1 (1.0) and L2 (0.0)
    pub l1_ratio: f64,
    pub max_iter: usize,
    /// Bound on the proximal gradient mapping at convergence
    pub tol: f64,
    pub balanced_class_weight: bool,
}

impl Default for ElasticNetParams {
    fn default() -> Self {
        Self {
            c: 0.8,
            l1_ratio: 0.5,
            max_iter: 2000,
            tol: 1e-4,
            balanced_class_weight: true,
        }
    }
}

/// Binary logistic regression with an elastic-net penalty on the coefficients.
///
/// Minimises `C * sum(w_i * logloss_i) + (1 - r)/2 * |b|^2 + r * |b|_1`, with
/// the objective divided through by `C * sum(w_i)` before solving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticNetLogistic {
    coef: Vec<f64>,
    intercept: f64,
    n_iter: usize,
}

fn dims(x: &[Vec<f64>], y_len: usize) -> Result<usize, RecoveryError> {
    let d = x
        .first()
        .map(Vec::len)
        .ok_or_else(|| RecoveryError::EmptyDataset("no rows for linear model".into()))?;
    if x.len() != y_len {
        return Err(RecoveryError::Validation(format!(
            "{} rows but {} labels",
            x.len(),
            y_len
        )));
    }
    Ok(d)
}

/// Lipschitz bound of a weighted logistic-type loss: `curvature * trace(X'WX) / W`.
fn lipschitz(x: &[Vec<f64>], weights: &[f64], curvature: f64) -> f64 {
    let w_sum: f64 = weights.iter().sum();
    let trace: f64 = x
        .iter()
        .zip(weights)
        .map(|(row, w)| w * (1.0 + row.iter().map(|v| v * v).sum::<f64>()))
        .sum();
    curvature * trace / w_sum
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    if v > t {
        v - t
    } else if v < -t {
        v + t
    } else {
        0.0
    }
}

impl ElasticNetLogistic {
    /// # Errors
    /// Returns `EmptyDataset` for no rows or `Validation` for inconsistent
    /// shapes or a non-positive `c`.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ElasticNetParams) -> Result<Self, RecoveryError> {
        let d = dims(x, y.len())?;
        if !(params.c > 0.0) || !(0.0..=1.0).contains(&params.l1_ratio) {
            return Err(RecoveryError::Validation(format!(
                "invalid penalty C={} l1_ratio={}",
                params.c, params.l1_ratio
            )));
        }

        let weights = if params.balanced_class_weight {
            balanced_weights(y, 2)
        } else {
            vec![1.0; y.len()]
        };
        let w_sum: f64 = weights.iter().sum();
        let l1 = params.l1_ratio / (params.c * w_sum);
        let l2 = (1.0 - params.l1_ratio) / (params.c * w_sum);
        let step = 1.0 / (lipschitz(x, &weights, 0.25) + l2);

        // Coefficients followed by the intercept.
        let mut beta = vec![0.0; d + 1];
        let mut z = beta.clone();
        let mut grad = vec![0.0; d + 1];
        let mut t = 1.0_f64;
        let mut n_iter = params.max_iter;

        for iter in 0..params.max_iter {
            grad.iter_mut().for_each(|g| *g = 0.0);
            for ((row, &label), w) in x.iter().zip(y).zip(&weights) {
                let score = z[d] + row.iter().zip(&z).map(|(a, b)| a * b).sum::<f64>();
                let r = w * (sigmoid(score) - f64::from(label)) / w_sum;
                for (g, v) in grad.iter_mut().zip(row) {
                    *g += r * v;
                }
                grad[d] += r;
            }
            for j in 0..d {
                grad[j] += l2 * z[j];
            }

            let mut next = vec![0.0; d + 1];
            for j in 0..d {
                next[j] = soft_threshold(z[j] - step * grad[j], step * l1);
            }
            next[d] = z[d] - step * grad[d];

            let mapping = next
                .iter()
                .zip(&z)
                .map(|(a, b)| ((a - b) / step).abs())
                .fold(0.0, f64::max);

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            for j in 0..=d {
                z[j] = next[j] + momentum * (next[j] - beta[j]);
            }
            beta = next;
            t = t_next;

            if mapping < params.tol {
                n_iter = iter + 1;
                break;
            }
        }
        if n_iter == params.max_iter {
            tracing::warn!(max_iter = params.max_iter, "Elastic-net solver hit max_iter without converging");
        }

        let intercept = beta[d];
        beta.truncate(d);
        Ok(Self {
            coef: beta,
            intercept,
            n_iter,
        })
    }

    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coef
    }

    #[must_use]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

impl ProbabilisticClassifier for ElasticNetLogistic {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.intercept + row.iter().zip(&self.coef).map(|(a, b)| a * b).sum::<f64>())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxParams {
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for SoftmaxParams {
    fn default() -> Self {
        Self {
            c: 5.0,
            max_iter: 3000,
            tol: 1e-5,
        }
    }
}

/// Multinomial logistic regression with an L2 penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    /// One row of coefficients per class
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
}

fn softmax_in_place(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        total += *s;
    }
    scores.iter_mut().for_each(|s| *s /= total);
}

impl SoftmaxRegression {
    /// # Errors
    /// Returns `EmptyDataset` for no rows or `Validation` for inconsistent
    /// shapes or labels outside `0..n_classes`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[u8],
        n_classes: usize,
        params: &SoftmaxParams,
    ) -> Result<Self, RecoveryError> {
        let d = dims(x, y.len())?;
        if y.iter().any(|&c| usize::from(c) >= n_classes) {
            return Err(RecoveryError::Validation(format!("label outside 0..{n_classes}")));
        }
        let n = x.len() as f64;
        let l2 = 1.0 / (params.c * n);
        let ones = vec![1.0; x.len()];
        let step = 1.0 / (lipschitz(x, &ones, 0.5) + l2);

        let zeros = || vec![vec![0.0; d + 1]; n_classes];
        let mut theta = zeros();
        let mut z = zeros();
        let mut t = 1.0_f64;
        let mut proba = vec![0.0; n_classes];

        for _ in 0..params.max_iter {
            let mut grad = zeros();
            for (row, &label) in x.iter().zip(y) {
                for (k, p) in proba.iter_mut().enumerate() {
                    *p = z[k][d] + row.iter().zip(&z[k]).map(|(a, b)| a * b).sum::<f64>();
                }
                softmax_in_place(&mut proba);
                for (k, g) in grad.iter_mut().enumerate() {
                    let r = (proba[k] - f64::from(u8::from(usize::from(label) == k))) / n;
                    for (gj, v) in g.iter_mut().zip(row) {
                        *gj += r * v;
                    }
                    g[d] += r;
                }
            }

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            let mut largest = 0.0_f64;
            for k in 0..n_classes {
                for j in 0..=d {
                    let penalty = if j < d { l2 * z[k][j] } else { 0.0 };
                    let g = grad[k][j] + penalty;
                    largest = largest.max(g.abs());
                    let next = z[k][j] - step * g;
                    z[k][j] = next + momentum * (next - theta[k][j]);
                    theta[k][j] = next;
                }
            }
            t = t_next;
            if largest < params.tol {
                break;
            }
        }

        let intercept = theta.iter_mut().map(|row| row.pop().unwrap_or(0.0)).collect();
        Ok(Self {
            coef: theta,
            intercept,
        })
    }

    /// Class probabilities for one scaled row.
    #[must_use]
    pub fn predict_class_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut scores: Vec<f64> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| b + row.iter().zip(w).map(|(a, c)| a * c).sum::<f64>())
            .collect();
        softmax_in_place(&mut scores);
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_elastic_net_separates_and_zeros_noise() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let mut x = Vec::new();
        let mut y = Vec::new();
        for _ in 0..600 {
            let signal: f64 = rng.gen_range(-2.0..2.0);
            let noise: f64 = rng.gen_range(-0.01..0.01);
            y.push(u8::from(signal + rng.gen_range(-0.3..0.3) > 0.5));
            x.push(vec![signal, noise]);
        }
        let model = ElasticNetLogistic::fit(&x, &y, &ElasticNetParams::default()).expect("fit");
        assert!(model.coefficients()[0] > 1.0);
        assert!(model.coefficients()[1].abs() < 1e-6);
        assert!(model.predict_proba(&[2.0, 0.0]) > 0.9);
        assert!(model.predict_proba(&[-2.0, 0.0]) < 0.1);
    }

    #[test]
    fn test_elastic_net_is_deterministic() {
        let x: Vec<Vec<f64>> = (0..100).map(|i| vec![f64::from(i % 10) - 4.5]).collect();
        let y: Vec<u8> = (0..100).map(|i| u8::from(i % 10 > 6)).collect();
        let a = ElasticNetLogistic::fit(&x, &y, &ElasticNetParams::default()).expect("fit");
        let b = ElasticNetLogistic::fit(&x, &y, &ElasticNetParams::default()).expect("fit");
        assert_eq!(a, b);
    }

    #[test]
    fn test_softmax_three_classes() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let mut x = Vec::new();
        let mut y = Vec::new();
        for class in 0..3u8 {
            for _ in 0..100 {
                let c = f64::from(class) * 3.0 - 3.0;
                x.push(vec![c + rng.gen_range(-0.8..0.8), rng.gen_range(-1.0..1.0)]);
                y.push(class);
            }
        }
        let model = SoftmaxRegression::fit(&x, &y, 3, &SoftmaxParams::default()).expect("fit");
        let p = model.predict_class_proba(&[3.0, 0.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(p[2] > 0.8);
        assert!(model.predict_class_proba(&[-3.0, 0.0])[0] > 0.8);
    }
}
