use std::f64::consts::PI;

use super::Classifier;
use crate::engine::errors::PredictError;

/// Share of the largest feature variance added to every class variance.
const VAR_SMOOTHING: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
struct ClassStats {
    log_prior: f64,
    mean: Vec<f64>,
    var: Vec<f64>,
}

impl ClassStats {
    fn log_likelihood(&self, row: &[f64]) -> f64 {
        self.log_prior
            + row
                .iter()
                .zip(self.mean.iter().zip(&self.var))
                .map(|(v, (m, s))| -0.5 * (2.0 * PI * s).ln() - (v - m).powi(2) / (2.0 * s))
                .sum::<f64>()
    }
}

/// Gaussian naive Bayes with per-class feature means and variances.
#[derive(Debug, Clone, Default)]
pub struct GaussianNaiveBayes {
    classes: [ClassStats; 2],
}

impl Classifier for GaussianNaiveBayes {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        let width = x[0].len();
        let n = x.len() as f64;

        let mut overall_mean = vec![0.0; width];
        for row in x {
            for (m, v) in overall_mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let max_var = (0..width)
            .map(|j| x.iter().map(|r| (r[j] - overall_mean[j]).powi(2)).sum::<f64>() / n)
            .fold(0.0, f64::max);
        // Keeps variances positive when every feature is constant.
        let epsilon = (VAR_SMOOTHING * max_var).max(f64::MIN_POSITIVE.sqrt());

        for (label, stats) in self.classes.iter_mut().enumerate() {
            let rows: Vec<&Vec<f64>> = x
                .iter()
                .zip(y)
                .filter(|(_, l)| **l as usize == label)
                .map(|(r, _)| r)
                .collect();
            let count = rows.len() as f64;
            let mut mean = vec![0.0; width];
            for row in &rows {
                for (m, v) in mean.iter_mut().zip(row.iter()) {
                    *m += v / count;
                }
            }
            let mut var = vec![epsilon; width];
            for row in &rows {
                for ((s, v), m) in var.iter_mut().zip(row.iter()).zip(&mean) {
                    *s += (v - m).powi(2) / count;
                }
            }
            *stats = ClassStats {
                log_prior: (count / n).ln(),
                mean,
                var,
            };
        }
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        Ok(x.iter()
            .map(|row| {
                let neg = self.classes[0].log_likelihood(row);
                let pos = self.classes[1].log_likelihood(row);
                let top = neg.max(pos);
                let (en, ep) = ((neg - top).exp(), (pos - top).exp());
                ep / (en + ep)
            })
            .collect())
    }
}
