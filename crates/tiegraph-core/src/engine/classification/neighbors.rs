use super::Classifier;
use crate::engine::errors::PredictError;

/// k-nearest-neighbour vote under the Euclidean distance.
///
/// Equidistant neighbours are taken in training order.
#[derive(Debug, Clone)]
pub struct KNeighbors {
    k: usize,
    x: Vec<Vec<f64>>,
    y: Vec<u8>,
}

impl KNeighbors {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            x: Vec::new(),
            y: Vec::new(),
        }
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

impl Classifier for KNeighbors {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        self.x = x.to_vec();
        self.y = y.to_vec();
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        let k = self.k.min(self.x.len());
        if k == 0 {
            return Err(PredictError::Internal("k-neighbours used before fit".into()));
        }
        Ok(x.iter()
            .map(|row| {
                let mut ranked: Vec<(f64, usize)> = self
                    .x
                    .iter()
                    .enumerate()
                    .map(|(i, train)| (squared_distance(row, train), i))
                    .collect();
                ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                let votes = ranked[..k].iter().filter(|(_, i)| self.y[*i] == 1).count();
                votes as f64 / k as f64
            })
            .collect())
    }
}
