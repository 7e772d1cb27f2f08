//! CART regression trees and the ensembles built from them.
//!
//! A tree fitted on 0/1 labels with the squared-error criterion is a Gini
//! classification tree whose leaves hold the positive-class fraction, so one
//! tree type serves the plain tree, the forest and the boosting rounds.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use super::{sigmoid, Classifier};
use crate::engine::errors::PredictError;

const MIN_SAMPLES_SPLIT: usize = 2;
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct GrowParams {
    max_depth: Option<usize>,
    /// Features drawn per split; all features when `None`.
    max_features: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct Split {
    feature: usize,
    threshold: f64,
    sse: f64,
}

fn sse(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        sum_sq - sum * sum / n
    }
}

impl RegressionTree {
    fn fit(
        x: &[Vec<f64>],
        targets: &[f64],
        rows: Vec<usize>,
        params: GrowParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = RegressionTree::default();
        tree.grow(x, targets, rows, 0, params, rng);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        targets: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: GrowParams,
        rng: &mut StdRng,
    ) -> usize {
        let n = rows.len() as f64;
        let sum: f64 = rows.iter().map(|&r| targets[r]).sum();
        let leaf = if rows.is_empty() { 0.0 } else { sum / n };
        let index = self.nodes.len();
        self.nodes.push(TreeNode::Leaf(leaf));

        if rows.len() < MIN_SAMPLES_SPLIT || params.max_depth.is_some_and(|d| depth >= d) {
            return index;
        }
        let sum_sq: f64 = rows.iter().map(|&r| targets[r] * targets[r]).sum();
        let parent = sse(sum, sum_sq, n);
        let Some(best) = best_split(x, targets, &rows, params.max_features, rng) else {
            return index;
        };
        if parent - best.sse <= MIN_GAIN {
            return index;
        }
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| x[r][best.feature] <= best.threshold);
        let left = self.grow(x, targets, left_rows, depth + 1, params, rng);
        let right = self.grow(x, targets, right_rows, depth + 1, params, rng);
        self.nodes[index] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        index
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                TreeNode::Leaf(value) => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

fn best_split(
    x: &[Vec<f64>],
    targets: &[f64],
    rows: &[usize],
    max_features: Option<usize>,
    rng: &mut StdRng,
) -> Option<Split> {
    let width = x[rows[0]].len();
    let features: Vec<usize> = match max_features {
        Some(m) if m < width => sample(rng, width, m).into_vec(),
        _ => (0..width).collect(),
    };
    let total_sum: f64 = rows.iter().map(|&r| targets[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| targets[r] * targets[r]).sum();
    let n = rows.len();

    let mut best: Option<Split> = None;
    let mut order = rows.to_vec();
    for feature in features {
        order.sort_by(|a, b| x[*a][feature].total_cmp(&x[*b][feature]));
        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        for i in 0..n - 1 {
            let t = targets[order[i]];
            left_sum += t;
            left_sq += t * t;
            let (here, next) = (x[order[i]][feature], x[order[i + 1]][feature]);
            if here == next {
                continue;
            }
            let left_n = (i + 1) as f64;
            let right_n = (n - i - 1) as f64;
            let cost = sse(left_sum, left_sq, left_n) + sse(total_sum - left_sum, total_sq - left_sq, right_n);
            if best.as_ref().map_or(true, |b| cost < b.sse) {
                best = Some(Split {
                    feature,
                    threshold: here + (next - here) / 2.0,
                    sse: cost,
                });
            }
        }
    }
    best
}

fn labels_as_targets(y: &[u8]) -> Vec<f64> {
    y.iter().map(|&l| l as f64).collect()
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    max_depth: Option<usize>,
    tree: RegressionTree,
}

impl DecisionTree {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            tree: RegressionTree::default(),
        }
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        let params = GrowParams {
            max_depth: self.max_depth,
            max_features: None,
        };
        // Splits consider every feature, so the generator is never drawn from.
        let mut rng = StdRng::seed_from_u64(0);
        self.tree = RegressionTree::fit(x, &labels_as_targets(y), (0..y.len()).collect(), params, &mut rng);
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        Ok(x.iter().map(|row| self.tree.predict(row)).collect())
    }
}

/// Bagged trees with `sqrt(width)` features drawn per split.
#[derive(Debug, Clone)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: Option<usize>,
    seed: u64,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(n_estimators: usize, max_depth: Option<usize>, seed: u64) -> Self {
        Self {
            n_estimators,
            max_depth,
            seed,
            trees: Vec::new(),
        }
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        let targets = labels_as_targets(y);
        let width = x[0].len();
        let params = GrowParams {
            max_depth: self.max_depth,
            max_features: Some(((width as f64).sqrt().ceil() as usize).max(1)),
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = y.len();
        self.trees = (0..self.n_estimators)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, &targets, bootstrap, params, &mut rng)
            })
            .collect();
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        let count = self.trees.len().max(1) as f64;
        Ok(x.iter()
            .map(|row| self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / count)
            .collect())
    }
}

/// Gradient boosting on the logistic loss with shallow regression trees.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    n_estimators: usize,
    learning_rate: f64,
    max_depth: usize,
    init: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn new(n_estimators: usize, learning_rate: f64, max_depth: usize) -> Self {
        Self {
            n_estimators,
            learning_rate,
            max_depth,
            init: 0.0,
            trees: Vec::new(),
        }
    }

    fn raw(&self, row: &[f64]) -> f64 {
        self.init + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl Classifier for GradientBoosting {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        let n = y.len();
        let prior = y.iter().filter(|l| **l == 1).count() as f64 / n as f64;
        self.init = (prior / (1.0 - prior)).ln();
        self.trees.clear();

        let labels = labels_as_targets(y);
        let mut raw = vec![self.init; n];
        let params = GrowParams {
            max_depth: Some(self.max_depth),
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..self.n_estimators {
            let residuals: Vec<f64> = labels.iter().zip(&raw).map(|(l, f)| l - sigmoid(*f)).collect();
            let tree = RegressionTree::fit(x, &residuals, (0..n).collect(), params, &mut rng);
            for (f, row) in raw.iter_mut().zip(x) {
                *f += self.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);
        }
        if raw.iter().any(|f| !f.is_finite()) {
            return Err(PredictError::Numerical("gradient boosting diverged".into()));
        }
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        Ok(x.iter().map(|row| sigmoid(self.raw(row))).collect())
    }
}
