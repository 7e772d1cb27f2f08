//! Linear models: L2-regularised logistic regression and a linear support
//! vector machine with Platt-scaled probabilities.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{sigmoid, Classifier, Standardizer};
use crate::engine::errors::PredictError;

const LOGISTIC_MAX_ITER: usize = 1000;
const LOGISTIC_STEP: f64 = 0.5;
const LOGISTIC_TOLERANCE: f64 = 1e-6;
const SVM_EPOCHS: usize = 50;

/// Weights and bias of `sigmoid(w·x + b)` fitted by gradient descent on the
/// mean log-loss plus `l2 / (2n) * |w|²`.
fn fit_logistic(x: &[Vec<f64>], y: &[f64], l2: f64) -> Result<(Vec<f64>, f64), PredictError> {
    let n = x.len() as f64;
    let width = x.first().map_or(0, Vec::len);
    let mut w = vec![0.0; width];
    let mut b = 0.0;
    for _ in 0..LOGISTIC_MAX_ITER {
        let mut grad_w: Vec<f64> = w.iter().map(|wi| l2 * wi / n).collect();
        let mut grad_b = 0.0;
        for (row, target) in x.iter().zip(y) {
            let z: f64 = row.iter().zip(&w).map(|(a, b)| a * b).sum::<f64>() + b;
            let err = sigmoid(z) - target;
            for (g, v) in grad_w.iter_mut().zip(row) {
                *g += err * v / n;
            }
            grad_b += err / n;
        }
        for (wi, g) in w.iter_mut().zip(&grad_w) {
            *wi -= LOGISTIC_STEP * g;
        }
        b -= LOGISTIC_STEP * grad_b;
        let norm = grad_w.iter().map(|g| g * g).sum::<f64>() + grad_b * grad_b;
        if norm.sqrt() < LOGISTIC_TOLERANCE {
            break;
        }
    }
    if !b.is_finite() || w.iter().any(|v| !v.is_finite()) {
        return Err(PredictError::Numerical("logistic regression diverged".into()));
    }
    Ok((w, b))
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Inverse regularisation strength.
    c: f64,
    scaler: Standardizer,
    weights: Vec<f64>,
    bias: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            scaler: Standardizer::default(),
            weights: Vec::new(),
            bias: 0.0,
        }
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        self.scaler = Standardizer::fit(x);
        let scaled: Vec<Vec<f64>> = x.iter().map(|r| self.scaler.transform(r)).collect();
        let targets: Vec<f64> = y.iter().map(|&l| l as f64).collect();
        let (w, b) = fit_logistic(&scaled, &targets, 1.0 / self.c)?;
        self.weights = w;
        self.bias = b;
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        Ok(x.iter()
            .map(|row| sigmoid(dot(&self.scaler.transform(row), &self.weights) + self.bias))
            .collect())
    }
}

/// Linear SVM trained with Pegasos sub-gradient steps; decision values are
/// mapped to probabilities by a fitted sigmoid.
#[derive(Debug, Clone)]
pub struct SupportVector {
    c: f64,
    seed: u64,
    scaler: Standardizer,
    weights: Vec<f64>,
    bias: f64,
    /// Platt sigmoid over the decision value.
    platt: (f64, f64),
}

impl SupportVector {
    pub fn new(seed: u64) -> Self {
        Self {
            c: 1.0,
            seed,
            scaler: Standardizer::default(),
            weights: Vec::new(),
            bias: 0.0,
            platt: (1.0, 0.0),
        }
    }

    fn decision(&self, scaled: &[f64]) -> f64 {
        dot(scaled, &self.weights) + self.bias
    }
}

impl Classifier for SupportVector {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        self.scaler = Standardizer::fit(x);
        let scaled: Vec<Vec<f64>> = x.iter().map(|r| self.scaler.transform(r)).collect();
        let signs: Vec<f64> = y.iter().map(|&l| if l == 1 { 1.0 } else { -1.0 }).collect();
        let n = scaled.len();
        let lambda = 1.0 / (self.c * n as f64);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..n).collect();
        self.weights = vec![0.0; scaled[0].len()];
        self.bias = 0.0;
        let mut t = 0usize;
        for _ in 0..SVM_EPOCHS {
            order.shuffle(&mut rng);
            for &i in &order {
                t += 1;
                let eta = 1.0 / (lambda * t as f64);
                let margin = signs[i] * self.decision(&scaled[i]);
                // The bias is the weight of a constant 1 feature.
                let decay = 1.0 - eta * lambda;
                for w in self.weights.iter_mut() {
                    *w *= decay;
                }
                self.bias *= decay;
                if margin < 1.0 {
                    for (w, v) in self.weights.iter_mut().zip(&scaled[i]) {
                        *w += eta * signs[i] * v;
                    }
                    self.bias += eta * signs[i];
                }
            }
        }

        // Platt targets with the usual prior correction.
        let positives = y.iter().filter(|l| **l == 1).count() as f64;
        let negatives = n as f64 - positives;
        let hi = (positives + 1.0) / (positives + 2.0);
        let lo = 1.0 / (negatives + 2.0);
        let decisions: Vec<Vec<f64>> = scaled.iter().map(|r| vec![self.decision(r)]).collect();
        let targets: Vec<f64> = y.iter().map(|&l| if l == 1 { hi } else { lo }).collect();
        let (a, b) = fit_logistic(&decisions, &targets, 0.0)?;
        self.platt = (a[0], b);
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        let (a, b) = self.platt;
        Ok(x.iter()
            .map(|row| sigmoid(a * self.decision(&self.scaler.transform(row)) + b))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classification::tests::assert_separates;

    #[test]
    fn logistic_probability_grows_with_signal() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let y: Vec<u8> = (0..20).map(|i| (i % 4 != 0 && i > 8) as u8).collect();
        let mut model = LogisticRegression::default();
        model.fit(&x, &y).unwrap();
        let p = model.predict_proba(&[vec![0.0], vec![19.0]]).unwrap();
        assert!(p[0] < p[1]);
    }

    #[test]
    fn linear_models_separate_blobs() {
        assert_separates(&mut LogisticRegression::default());
        assert_separates(&mut SupportVector::new(42));
    }
}
